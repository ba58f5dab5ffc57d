//! Harvest adapter for remote workflow-execution services
//!
//! Runs saved workflows through a REST service that exposes:
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | `POST` | `/workflows/{workflow_ref}/executions` | start an execution for a time window |
//! | `GET` | `/executions/{execution_id}` | status: `PENDING`, `RUNNING`, `SUCCEEDED`, `FAILED`, `CANCELLED` |
//! | `GET` | `/executions/{execution_id}/rows` | result rows |
//!
//! # Authentication
//!
//! A bearer token is taken from [`HttpWorkflowConfig::token`], or from the
//! `HARVEST_WORKFLOW_TOKEN` environment variable when unset:
//!
//! ```bash
//! export HARVEST_WORKFLOW_TOKEN="your-token"
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use harvest_adapter_http::{HttpWorkflowConfig, HttpWorkflowService};
//!
//! let service = HttpWorkflowService::new(
//!     HttpWorkflowConfig::new("https://workflows.example.com/api/v1"),
//! )?;
//! let orchestrator = Orchestrator::new(config, store, Arc::new(service))?;
//! ```

mod api;
mod error;
mod service;

pub use api::{ExecutionState, WorkflowApiClient};
pub use error::{HttpError, HttpResult};
pub use service::{HttpWorkflowConfig, HttpWorkflowService, TOKEN_ENV};
