//! The remote gateway abstraction
//!
//! Every component that talks to the n8n server does so through [`Gateway`],
//! so the server can be swapped for the in-memory fake in
//! [`test_util`](crate::test_util). [`HttpGateway`] is the production
//! adapter over [`N8nClient`].

use std::fs;
use std::path::Path;

use snafu::prelude::*;
use tracing::debug;

use crate::{Result, prelude::*};

/// Operations the sync engine needs from the platform.
///
/// Failure contract: every error carries the raw server diagnostic and is
/// surfaced as-is; no call retries internally. Callers decide whether an
/// error aborts the operation or is counted and skipped.
pub trait Gateway {
    /// Current non-archived workflows, with ids and names stable for the
    /// session.
    fn list_all(&self) -> impl Future<Output = Result<Vec<Workflow>>>;

    /// Platform-native bulk dump of every workflow (archived included) into
    /// `dir`, one `<id>.json` per workflow. Additive-only: a path that
    /// already exists is skipped, never overwritten, which is why callers
    /// must clear the directory (or stage its contents) first.
    /// Returns the number of files written.
    fn export_all(&self, dir: &Path) -> impl Future<Output = Result<usize>>;

    /// Imports one workflow. The platform decides the resulting id: it may
    /// reuse the submitted id when re-importing the same logical record, or
    /// assign a fresh one. Returns the stored record.
    fn import_one(&self, workflow: &Workflow) -> impl Future<Output = Result<Workflow>>;

    /// Deletes one workflow by id.
    fn delete_one(&self, id: &str) -> impl Future<Output = Result<()>>;
}

/// Production gateway over the n8n public REST api.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: N8nClient,
}

impl HttpGateway {
    pub fn new(client: N8nClient) -> Self {
        Self { client }
    }
}

impl Gateway for HttpGateway {
    async fn list_all(&self) -> Result<Vec<Workflow>> {
        self.client.workflows().list().await
    }

    async fn export_all(&self, dir: &Path) -> Result<usize> {
        let workflows = self.client.workflows().include_archived().list().await?;
        let mut written = 0usize;
        for workflow in &workflows {
            ensure!(
                !workflow.id.is_empty(),
                ValidationSnafu {
                    message: format!("server returned workflow '{}' without id", workflow.name),
                }
            );
            let path = dir.join(format!("{}.json", workflow.id));
            if path.exists() {
                // native export semantics: additive only
                debug!("export skipping existing file {}", path.display());
                continue;
            }
            let text = serde_json::to_string_pretty(workflow).context(SerializationSnafu)?;
            fs::write(&path, text).context(ExportIoSnafu { path: path.clone() })?;
            written += 1;
        }
        Ok(written)
    }

    async fn import_one(&self, workflow: &Workflow) -> Result<Workflow> {
        // Update in place when the submitted id is still live; otherwise the
        // server mints a fresh id on create.
        if !workflow.id.is_empty() {
            match self.client.update_workflow(&workflow.id, workflow).await {
                Ok(stored) => return Ok(stored),
                Err(GatewayError::NotFound { .. }) => {
                    debug!("workflow id {} not on server, creating", workflow.id);
                }
                Err(err) => return Err(err),
            }
        }
        self.client.create_workflow(workflow).await
    }

    async fn delete_one(&self, id: &str) -> Result<()> {
        self.client.delete_workflow(id).await.map(|_| ())
    }
}
