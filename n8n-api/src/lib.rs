/*
 * n8n rust api client
 * github.com/stevelr/n8n-tools
 *
 * SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
 * SPDX-License-Identifier: Apache-2.0
 */
//! # n8n Rust API Client
//!
//! An ergonomic client for the n8n workflow-automation server's public REST
//! API, plus the [`Gateway`](gateway::Gateway) abstraction used by the
//! `n8nback` sync tool.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use n8n_api::prelude::*;
//! # async fn example() -> Result<(), GatewayError> {
//!
//! // Initialize the client from N8N_URL / N8N_API_KEY.
//! let client = N8nClient::with_config(ClientConfig::default())?;
//!
//! // List workflows (cursor pagination handled internally)
//! let workflows = client.workflows().list().await?;
//! for workflow in &workflows {
//!     println!("{} {}", workflow.id, workflow.name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Notes on API Design
//!
//! - Workflow documents are passed through with full fidelity: fields this
//!   crate does not model are preserved in `extra` maps and re-serialized
//!   unchanged.
//! - Sub-workflow invocation parameters are parsed into a typed
//!   [`WorkflowReference`](workflows::WorkflowReference) while every other
//!   node's parameters stay opaque.
//! - A single HTTP pipeline handles auth, logging, and error mapping. There
//!   are no internal retries: the server calls made by the sync tool are
//!   coarse-grained and a failure should reach the operator undisguised.
//!
#![allow(clippy::missing_errors_doc)] // pedantic
#![allow(clippy::missing_const_for_fn)] //  nursery function
#![allow(clippy::must_use_candidate)] // pedantic
#![warn(clippy::default_trait_access)]
#![warn(clippy::doc_markdown)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::implicit_clone)]
#![warn(clippy::literal_string_with_formatting_args)]
#![warn(clippy::match_same_arms)]
#![warn(clippy::redundant_clone)]
#![warn(clippy::ref_option)]
#![warn(clippy::redundant_closure)]
#![warn(clippy::uninlined_format_args)]
#![warn(clippy::unnecessary_wraps)]
#![warn(clippy::unused_async)]

pub mod client;
pub mod error;
pub mod gateway;
mod http_client;
pub mod validation;
pub mod workflows;

pub mod test_util;

/// Result type alias using `GatewayError` as the default error.
pub type Result<T, E = crate::error::GatewayError> = std::result::Result<T, E>;

/// Prelude module - import (nearly) all the things with `use n8n_api::prelude::*;`
pub mod prelude {
    pub use super::{N8N_API_BASE_PATH, N8N_LOCAL_URL};
    pub use crate::error::*;
    pub use crate::{
        client::{ClientConfig, N8nClient},
        gateway::{Gateway, HttpGateway},
        validation::{looks_like_display_name, looks_like_workflow_id},
        workflows::{
            EXECUTE_WORKFLOW_NODE, EXECUTE_WORKFLOW_TRIGGER_NODE, Node, NodeParameters,
            TOOL_WORKFLOW_NODE, TargetMode, TriggerInput, Workflow, WorkflowReference,
            workflow_url_path,
        },
    };
}

// ============================================================================
// CONSTANTS
// ============================================================================

/// API endpoint for a locally running n8n instance
pub const N8N_LOCAL_URL: &str = "http://127.0.0.1:5678";

/// Path prefix for all public REST api requests
pub const N8N_API_BASE_PATH: &str = "/api/v1";

pub(crate) mod config {
    /// Environment variable for default endpoint URL
    pub const N8N_URL_ENV: &str = "N8N_URL";

    /// Environment variable for the api key
    pub const N8N_API_KEY_ENV: &str = "N8N_API_KEY";

    /// API key header
    pub const N8N_API_KEY_HEADER: &str = "X-N8N-API-KEY";

    /// Default pagination limit (API spec: 100, max 250)
    pub const DEFAULT_PAGINATION_LIMIT: u32 = 100;

    /// Maximum pagination limit accepted by the server
    pub const MAX_PAGINATION_LIMIT: u32 = 250;

    /// Default request timeout in seconds
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
}
