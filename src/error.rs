use axum::http::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Errors that reach the caller of a common-games request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// `players` was missing, empty, or held no identifiers.
    #[error("Invalid query parameter")]
    InvalidInput,

    /// Strict policy only: at least one account could not be fetched.
    #[error("Could not fetch owned games for: {}", .failed.join(", "))]
    IncompleteFetch { failed: Vec<String> },
}

impl DispatchError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::InvalidInput => StatusCode::BAD_REQUEST,
            DispatchError::IncompleteFetch { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Why one account contributed nothing. Never surfaced as an HTTP error
/// under the lenient policy.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("upstream request failed: {0:#}")]
    Upstream(anyhow::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("no extractable games")]
    NoExtractableData,

    #[error("fetch task failed: {0}")]
    InternalTaskFailure(String),
}
