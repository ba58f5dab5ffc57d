//! Recovery sweeps for failed and abandoned collections.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::collection::{CollectionFilter, CollectionStatus, CollectionUpdate};
use crate::config::OrchestratorConfig;
use crate::error::SchedResult;
use crate::persistence::StateStore;

/// `now - window`, clamped to the Unix epoch.
fn since(now: DateTime<Utc>, window: chrono::Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window)
        .map_or(DateTime::UNIX_EPOCH, |at| at.max(DateTime::UNIX_EPOCH))
}

/// Re-queues recently failed collections and fails abandoned ones.
///
/// Both sweeps take `now` explicitly; the orchestrator passes the wall clock.
#[derive(Clone)]
pub struct RecoverySweeps {
    store: Arc<dyn StateStore>,
    max_retries: u32,
    retry_window: chrono::Duration,
    abandoned_after: chrono::Duration,
}

impl RecoverySweeps {
    pub fn new(store: Arc<dyn StateStore>, config: &OrchestratorConfig) -> Self {
        Self {
            store,
            max_retries: config.max_retries,
            retry_window: config.retry_window(),
            abandoned_after: config.abandoned_after(),
        }
    }

    /// Move collections that failed within the retry window, and still have
    /// retry budget, back to `pending`. Returns how many were re-queued.
    pub async fn retry_failed(&self, now: DateTime<Utc>) -> SchedResult<usize> {
        let candidates = self
            .store
            .list_collections(
                &CollectionFilter::new()
                    .with_statuses(&[CollectionStatus::Failed])
                    .updated_after(since(now, self.retry_window)),
            )
            .await?;

        let mut requeued = 0;
        for collection in candidates {
            if collection.retry_count >= self.max_retries {
                continue;
            }
            let attempt = collection.retry_count + 1;
            let affected = self
                .store
                .update_collection(
                    &collection.id,
                    &CollectionUpdate::new()
                        .status(CollectionStatus::Pending)
                        .retry_count(attempt)
                        .clear_error()
                        .when_status_in(&[CollectionStatus::Failed]),
                )
                .await?;
            if affected == 1 {
                tracing::info!(
                    collection = %collection.public_id,
                    attempt,
                    max = self.max_retries,
                    previous_error = collection.error_message.as_deref().unwrap_or(""),
                    "re-queued failed collection"
                );
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    /// Fail `running` collections whose last update is older than the
    /// abandonment threshold. Returns how many were failed.
    pub async fn reap_abandoned(&self, now: DateTime<Utc>) -> SchedResult<usize> {
        let stale = self
            .store
            .list_collections(
                &CollectionFilter::new()
                    .with_statuses(&[CollectionStatus::Running])
                    .updated_before(since(now, self.abandoned_after)),
            )
            .await?;

        let mut reaped = 0;
        for collection in stale {
            let message = format!(
                "abandoned: no progress since {}",
                collection.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            let affected = self
                .store
                .update_collection(
                    &collection.id,
                    &CollectionUpdate::new()
                        .status(CollectionStatus::Failed)
                        .error(message)
                        .when_status_in(&[CollectionStatus::Running]),
                )
                .await?;
            if affected == 1 {
                tracing::warn!(
                    collection = %collection.public_id,
                    last_update = %collection.updated_at,
                    "marked abandoned collection failed"
                );
                reaped += 1;
            }
        }
        Ok(reaped)
    }
}
