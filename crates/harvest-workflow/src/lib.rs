//! Harvest workflow-execution abstraction
//!
//! Harvest collects historical analytics data by running a saved workflow
//! once per calendar week. This crate describes the boundary to the service
//! that actually runs those workflows:
//!
//! - The [`WorkflowService`] trait for executing a workflow and fetching rows
//! - [`ExecutionRequest`] / [`ExecutionHandle`] describing one run
//! - [`ParameterTemplate`] for substituting a [`DateWindow`] into the
//!   workflow's parameters
//!
//! # Implementing a Service
//!
//! ```ignore
//! use async_trait::async_trait;
//! use harvest_workflow::{
//!     ExecutionHandle, ExecutionRequest, WorkflowResult, WorkflowService,
//! };
//!
//! struct LocalRunner;
//!
//! #[async_trait]
//! impl WorkflowService for LocalRunner {
//!     fn name(&self) -> &str {
//!         "local"
//!     }
//!
//!     async fn execute(&self, request: &ExecutionRequest) -> WorkflowResult<ExecutionHandle> {
//!         Ok(ExecutionHandle::new(format!("local-{}", request.window.start)))
//!     }
//! }
//! ```

pub mod error;
pub mod execution;
pub mod params;
pub mod service;

pub use error::{WorkflowError, WorkflowResult};
pub use execution::{
    ExecutionHandle, ExecutionId, ExecutionRequest, InstanceRef, Row, WorkflowRef,
};
pub use params::{DateWindow, ParameterTemplate};
pub use service::WorkflowService;
