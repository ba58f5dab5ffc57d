//! Execution of a single week.

use std::sync::Arc;

use chrono::Utc;
use harvest_workflow::{ExecutionRequest, Row, WorkflowService};
use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::collection::Collection;
use crate::error::SchedResult;
use crate::persistence::StateStore;
use crate::week::{Week, WeekUpdate};

/// SHA-256 over the rows' compact JSON, one row per line, as lowercase hex.
///
/// `serde_json` maps keep keys sorted, so equal rows hash equally across
/// re-runs.
pub fn checksum_rows(rows: &[Row]) -> String {
    let mut hasher = Sha256::new();
    for row in rows {
        hasher.update(row.to_string().as_bytes());
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();
    let mut output = String::with_capacity(digest.len() * 2);
    for byte in digest {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

/// Runs one week's workflow and records the outcome on the week row.
#[derive(Clone)]
pub struct WeekExecutor {
    store: Arc<dyn StateStore>,
    workflow: Arc<dyn WorkflowService>,
}

impl WeekExecutor {
    pub fn new(store: Arc<dyn StateStore>, workflow: Arc<dyn WorkflowService>) -> Self {
        Self { store, workflow }
    }

    /// Execute `week` of `collection`. Returns whether the week completed.
    ///
    /// Every failure, including store errors, is logged and reported through
    /// the return value and the persisted week state; nothing propagates.
    #[instrument(skip_all, fields(collection = %collection.public_id, week = %week.week_start_date))]
    pub async fn execute_week(&self, collection: &Collection, week: &Week) -> bool {
        if let Err(e) = self
            .store
            .update_week(&week.id, &WeekUpdate::running(Utc::now()))
            .await
        {
            tracing::error!(error = %e, "could not mark week running");
            return false;
        }

        match self.run(collection, week).await {
            Ok(update) => match self.store.update_week(&week.id, &update).await {
                Ok(()) => {
                    tracing::info!(rows = update.row_count.unwrap_or(0), "week completed");
                    true
                }
                Err(e) => {
                    tracing::error!(error = %e, "could not record completed week");
                    self.record_failure(week, format!("failed to record result: {e}"))
                        .await;
                    false
                }
            },
            Err(message) => {
                tracing::warn!(error = %message, "week failed");
                self.record_failure(week, message).await;
                false
            }
        }
    }

    async fn run(&self, collection: &Collection, week: &Week) -> Result<WeekUpdate, String> {
        let window = week.window();
        let request = ExecutionRequest {
            workflow_ref: collection.workflow_ref.clone(),
            instance_ref: collection.instance_ref.clone(),
            user_id: collection.user_id.clone(),
            parameters: collection.parameters.render(&window),
            window,
        };

        let handle = self
            .workflow
            .execute(&request)
            .await
            .map_err(|e| e.to_string())?;

        let rows = self
            .workflow
            .fetch_rows(&handle)
            .await
            .map_err(|e| format!("failed to fetch rows for {}: {e}", handle.execution_id))?;

        let (row_count, checksum) = match rows {
            Some(rows) => (rows.len() as u64, Some(checksum_rows(&rows))),
            None => (handle.row_count.unwrap_or(0), None),
        };

        Ok(WeekUpdate::completed(
            handle.execution_id.to_string(),
            row_count,
            checksum,
        ))
    }

    async fn record_failure(&self, week: &Week, message: String) {
        let result: SchedResult<()> = self
            .store
            .update_week(&week.id, &WeekUpdate::failed(message))
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "could not mark week failed");
        }
    }
}
