//! Error types for the HTTP workflow adapter.

use harvest_workflow::WorkflowError;
use thiserror::Error;

/// Result type for HTTP adapter operations.
pub type HttpResult<T> = Result<T, HttpError>;

/// Errors that can occur when talking to a workflow-execution service.
#[derive(Debug, Error)]
pub enum HttpError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// Workflow or execution not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Execution ended as failed or cancelled.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Timeout waiting for an execution to finish.
    #[error("Timeout waiting for execution: {0}")]
    Timeout(String),

    /// Bad adapter configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<HttpError> for WorkflowError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Http(err) => WorkflowError::Http(err.to_string()),
            HttpError::Json(err) => WorkflowError::InvalidResponse(err.to_string()),
            HttpError::ApiError { status, message } => WorkflowError::Api { status, message },
            HttpError::NotFound(what) => WorkflowError::NotFound(what),
            HttpError::ExecutionFailed(msg) => WorkflowError::ExecutionFailed(msg),
            HttpError::Timeout(id) => WorkflowError::Timeout(id),
            HttpError::Configuration(msg) => WorkflowError::Configuration(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = HttpError::ApiError {
            status: 503,
            message: "Service unavailable".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("Service unavailable"));
    }

    #[test]
    fn test_api_error_to_workflow() {
        let err: WorkflowError = HttpError::ApiError {
            status: 429,
            message: "quota".into(),
        }
        .into();
        assert!(matches!(err, WorkflowError::Api { status: 429, .. }));
    }

    #[test]
    fn test_timeout_to_workflow() {
        let err: WorkflowError = HttpError::Timeout("exec-9".into()).into();
        assert!(matches!(err, WorkflowError::Timeout(id) if id == "exec-9"));
    }

    #[test]
    fn test_failed_to_workflow() {
        let err: WorkflowError = HttpError::ExecutionFailed("bad query".into()).into();
        assert!(matches!(err, WorkflowError::ExecutionFailed(msg) if msg == "bad query"));
    }

    #[test]
    fn test_json_to_workflow() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: WorkflowError = HttpError::Json(json_err).into();
        assert!(matches!(err, WorkflowError::InvalidResponse(_)));
    }
}
