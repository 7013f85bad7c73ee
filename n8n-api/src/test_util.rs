//! Test utilities
//!
//! An in-memory [`FakeGateway`] and workflow builders used to test the sync
//! engine without a running server.
//! These are not part of the supported api and are subject to change.
//!
#![doc(hidden)]

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use snafu::prelude::*;

use crate::{Result, prelude::*};

/// In-memory [`Gateway`] backed by a map of workflows.
///
/// Import semantics mirror the platform's: a submitted id that is already
/// stored is updated in place; a submitted id unknown to the store is kept
/// (re-import of the same logical record); an empty id gets a fresh one.
#[derive(Debug, Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

#[derive(Debug, Default)]
struct FakeState {
    workflows: BTreeMap<String, Workflow>,
    next_id: u64,
    fail_export: Option<String>,
    fail_import_ids: BTreeSet<String>,
    import_order: Vec<String>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a fresh id in the store's id sequence.
    pub fn mint_id(&self) -> String {
        let mut state = self.state.lock();
        state.next_id += 1;
        format!("fake{:012}", state.next_id)
    }

    /// Inserts a workflow, assigning a fresh id if the workflow has none.
    /// Returns the stored record.
    pub fn seed(&self, mut workflow: Workflow) -> Workflow {
        if workflow.id.is_empty() {
            workflow.id = self.mint_id();
        }
        let mut state = self.state.lock();
        state
            .workflows
            .insert(workflow.id.clone(), workflow.clone());
        workflow
    }

    /// Makes the next (and all following) `export_all` calls fail with the
    /// given diagnostic.
    pub fn fail_export(&self, message: &str) {
        self.state.lock().fail_export = Some(message.to_string());
    }

    /// Makes `import_one` fail for the workflow stored/submitted under `id`.
    pub fn fail_import(&self, id: &str) {
        self.state.lock().fail_import_ids.insert(id.to_string());
    }

    /// Snapshot of the stored workflows, keyed by id.
    pub fn snapshot(&self) -> BTreeMap<String, Workflow> {
        self.state.lock().workflows.clone()
    }

    /// Stored record by name, if exactly one workflow has that name.
    pub fn find_by_name(&self, name: &str) -> Option<Workflow> {
        let state = self.state.lock();
        let mut found = state.workflows.values().filter(|wf| wf.name == name);
        let first = found.next().cloned();
        found.next().map_or(first, |_| None)
    }

    /// Ids in the order they were imported.
    pub fn import_order(&self) -> Vec<String> {
        self.state.lock().import_order.clone()
    }
}

impl Gateway for FakeGateway {
    async fn list_all(&self) -> Result<Vec<Workflow>> {
        Ok(self
            .state
            .lock()
            .workflows
            .values()
            .filter(|workflow| !workflow.is_archived)
            .cloned()
            .collect())
    }

    async fn export_all(&self, dir: &Path) -> Result<usize> {
        let state = self.state.lock();
        if let Some(message) = state.fail_export.as_ref() {
            return Err(GatewayError::Api {
                code: 500,
                method: "export".to_string(),
                url: "fake:///export".to_string(),
                message: message.clone(),
            });
        }
        let mut written = 0usize;
        for workflow in state.workflows.values() {
            let path = dir.join(format!("{}.json", workflow.id));
            if path.exists() {
                // native export semantics: additive only
                continue;
            }
            let text = serde_json::to_string_pretty(workflow).context(SerializationSnafu)?;
            fs::write(&path, text).context(ExportIoSnafu { path: path.clone() })?;
            written += 1;
        }
        Ok(written)
    }

    async fn import_one(&self, workflow: &Workflow) -> Result<Workflow> {
        let mut state = self.state.lock();
        if state.fail_import_ids.contains(&workflow.id) {
            return Err(GatewayError::Api {
                code: 400,
                method: "import".to_string(),
                url: "fake:///import".to_string(),
                message: format!("import rejected for {}", workflow.name),
            });
        }
        let mut stored = workflow.clone();
        if stored.id.is_empty() {
            state.next_id += 1;
            stored.id = format!("fake{:012}", state.next_id);
        }
        state.workflows.insert(stored.id.clone(), stored.clone());
        state.import_order.push(stored.id.clone());
        Ok(stored)
    }

    async fn delete_one(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state
            .workflows
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| GatewayError::NotFound {
                obj_type: "workflow".to_string(),
                key: id.to_string(),
            })
    }
}

// =============================================================================
// Workflow builders
// =============================================================================

/// Builds a minimal workflow with no nodes.
pub fn workflow(id: &str, name: &str) -> Workflow {
    Workflow {
        id: id.to_string(),
        name: name.to_string(),
        nodes: Vec::new(),
        connections: Value::Object(Map::new()),
        is_archived: false,
        extra: Map::new(),
    }
}

/// Builds a workflow containing a single executeWorkflow node whose
/// reference has the given value and mode.
pub fn workflow_with_reference(id: &str, name: &str, value: &str, mode: TargetMode) -> Workflow {
    let mut built = workflow(id, name);
    built.nodes.push(reference_node("Call Sub", value, mode));
    built
}

/// Builds an executeWorkflow node carrying a reference.
pub fn reference_node(node_name: &str, value: &str, mode: TargetMode) -> Node {
    let reference = WorkflowReference {
        is_resource_locator: true,
        value: value.to_string(),
        mode,
        cached_result_name: None,
        cached_result_url: None,
        extra: Map::new(),
    };
    Node {
        id: format!("node-{}", node_name.to_ascii_lowercase().replace(' ', "-")),
        name: node_name.to_string(),
        kind: EXECUTE_WORKFLOW_NODE.to_string(),
        parameters: NodeParameters::Reference {
            reference,
            rest: Map::new(),
        },
        extra: Map::new(),
    }
}

/// Builds an executeWorkflowTrigger node declaring the given inputs.
pub fn trigger_node(inputs: &[(&str, &str)]) -> Node {
    let values: Vec<Value> = inputs
        .iter()
        .map(|(name, kind)| json!({"name": name, "type": kind}))
        .collect();
    Node {
        id: "node-trigger".to_string(),
        name: "When Executed by Another Workflow".to_string(),
        kind: EXECUTE_WORKFLOW_TRIGGER_NODE.to_string(),
        parameters: NodeParameters::Opaque(json!({"workflowInputs": {"values": values}})),
        extra: Map::new(),
    }
}
