//! Execution request and handle types.

use serde::{Deserialize, Serialize};

use crate::params::DateWindow;

/// One result row returned by a workflow execution.
pub type Row = serde_json::Value;

/// Reference to a saved workflow on the execution service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowRef(pub String);

/// Reference to the analytics instance a workflow runs against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceRef(pub String);

macro_rules! string_ref {
    ($name:ident) => {
        impl $name {
            /// Create a new reference.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_ref!(WorkflowRef);
string_ref!(InstanceRef);

/// Identifier assigned by the execution service to one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

string_ref!(ExecutionId);

/// Everything needed to run a workflow once for one date window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub workflow_ref: WorkflowRef,
    pub instance_ref: InstanceRef,
    pub user_id: String,
    /// Parameters after date placeholders were substituted.
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub window: DateWindow,
}

/// Handle to a finished execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionHandle {
    pub execution_id: ExecutionId,
    /// Row count reported by the service, if any.
    pub row_count: Option<u64>,
}

impl ExecutionHandle {
    /// Create a handle without a reported row count.
    pub fn new(execution_id: impl Into<ExecutionId>) -> Self {
        Self {
            execution_id: execution_id.into(),
            row_count: None,
        }
    }

    /// Attach the row count reported by the service.
    #[must_use]
    pub fn with_row_count(mut self, rows: u64) -> Self {
        self.row_count = Some(rows);
        self
    }
}
