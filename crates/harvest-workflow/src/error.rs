//! Error types for workflow execution.

use thiserror::Error;

/// Errors that can occur while running an external workflow.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkflowError {
    /// Transport-level failure talking to the execution service.
    #[error("Network error: {0}")]
    Http(String),

    /// The execution service answered with an error response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The execution reached a failed or cancelled terminal state.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// The execution did not finish in time.
    #[error("Timeout waiting for execution {0}")]
    Timeout(String),

    /// The response could not be interpreted.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Workflow or execution not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Service misconfiguration (missing token, bad URL, ...).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for workflow operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;
