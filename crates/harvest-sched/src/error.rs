//! Error handling for the collection orchestrator.

use thiserror::Error;

/// Result type for orchestrator operations.
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors that can occur during orchestrator operations.
#[derive(Error, Debug)]
pub enum SchedError {
    /// Collection not found in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Week not found in the store.
    #[error("Week not found: {0}")]
    WeekNotFound(String),

    /// The collection is not in a state that allows the requested operation.
    #[error("Invalid collection state: expected {expected}, found {found}")]
    InvalidCollectionState { expected: String, found: String },

    /// A backfill request was rejected before anything was stored.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Workflow execution error.
    #[error("Workflow error: {0}")]
    WorkflowError(#[from] harvest_workflow::WorkflowError),

    /// SQLite database error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A stored value could not be decoded.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal orchestrator error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for SchedError {
    fn from(e: rusqlite::Error) -> Self {
        SchedError::DatabaseError(e.to_string())
    }
}

impl From<serde_yaml_ng::Error> for SchedError {
    fn from(e: serde_yaml_ng::Error) -> Self {
        SchedError::ConfigError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchedError::CollectionNotFound("hc_0123456789ab".to_string());
        assert_eq!(err.to_string(), "Collection not found: hc_0123456789ab");

        let err = SchedError::InvalidCollectionState {
            expected: "paused".to_string(),
            found: "completed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid collection state: expected paused, found completed"
        );
    }

    #[test]
    fn test_workflow_error_converts() {
        let err: SchedError =
            harvest_workflow::WorkflowError::Timeout("exec-9".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Workflow error: Timeout waiting for execution exec-9"
        );
    }
}
