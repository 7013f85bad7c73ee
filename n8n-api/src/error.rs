//! Errors returned by `N8nClient` and `Gateway` implementations
//!
use snafu::prelude::*;

/// Errors returned by the n8n-api crate.
///
/// There is deliberately no retry machinery behind these: a gateway call is a
/// coarse-grained remote operation, and masking its failures would hide
/// platform-side problems from the operator. Every variant carries the raw
/// diagnostic text so callers can decide whether to abort or continue.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum GatewayError {
    // Http connection or timeout error
    #[snafu(display("HTTP error {method} url:{url}"))]
    Http {
        method: String,
        url: String,
        source: reqwest::Error,
    },

    /// The n8n server responded with an error status.
    /// This usually means the request was invalid, or there was an internal server error.
    #[snafu(display("api server reported error ({code}) {method} {url}: {message}"))]
    Api {
        code: u16,
        method: String,
        url: String,
        message: String,
    },

    /// Authorization error: missing or rejected api key.
    #[snafu(display("authentication failed: {message}"))]
    Auth { message: String },

    /// Expected item was not found. Returned for workflow get/update/delete by id.
    #[snafu(display("{obj_type} {key} not found"))]
    NotFound { obj_type: String, key: String },

    /// Deserialization error. This means we didn't deserialize a server response correctly.
    /// If you see this error, please report it as a bug.
    #[snafu(display("deserialization at {path}: {source}"))]
    Deserialization {
        path: String,
        source: serde_json::Error,
    },

    /// Serialization error. Unlikely to occur. If you see this error, please report it as a bug.
    #[snafu(display("serialization: {source}"))]
    Serialization { source: serde_json::Error },

    /// Validation error: an internal parameter validation check failed.
    #[snafu(display("validation error: {message}"))]
    Validation { message: String },

    /// Filesystem failure while the gateway was writing an export.
    #[snafu(display("export i/o error on {}: {source}", path.display()))]
    ExportIo {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// Some other error occurred
    #[snafu(display("{message}"))]
    Other { message: String },
}
