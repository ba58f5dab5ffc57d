//! The workflow execution service trait.

use async_trait::async_trait;

use crate::error::WorkflowResult;
use crate::execution::{ExecutionHandle, ExecutionRequest, Row};

/// A remote service that runs saved analytics workflows.
///
/// The scheduler treats every call as opaque, possibly slow and possibly
/// failing. Implementations MUST return only once the execution has reached
/// a terminal state: an `Ok` handle means the run succeeded.
///
/// # Contract
///
/// - `execute()` runs the workflow for the request's date window and
///   returns a handle for the finished execution.
/// - `fetch_rows()` is optional. The default returns `Ok(None)`, meaning
///   this service cannot hand rows back; callers fall back to the row count
///   on the handle.
#[async_trait]
pub trait WorkflowService: Send + Sync {
    /// Get the name of this service.
    fn name(&self) -> &str;

    /// Execute a workflow and wait for it to finish.
    async fn execute(&self, request: &ExecutionRequest) -> WorkflowResult<ExecutionHandle>;

    /// Retrieve the result rows of a finished execution.
    async fn fetch_rows(&self, handle: &ExecutionHandle) -> WorkflowResult<Option<Vec<Row>>> {
        let _ = handle;
        Ok(None)
    }
}
