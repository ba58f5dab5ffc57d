//! Driving one claimed collection to a terminal or halted state.

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use crate::claim::ClaimGuard;
use crate::collection::{Collection, CollectionId, CollectionStatus, CollectionUpdate};
use crate::error::SchedResult;
use crate::executor::WeekExecutor;
use crate::limits::ConcurrencyLimits;
use crate::persistence::StateStore;
use crate::rate_limit::RateLimiter;
use crate::week::WeekStatus;

/// How a runner finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every week completed.
    Completed { weeks: u32 },
    /// The collection was marked failed.
    Failed { reason: String },
    /// Stopped between weeks because the collection was paused or cancelled.
    Halted(CollectionStatus),
    /// The collection vanished from the store.
    Missing,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed { weeks } => write!(f, "completed ({weeks} weeks)"),
            RunOutcome::Failed { reason } => write!(f, "failed: {reason}"),
            RunOutcome::Halted(status) => write!(f, "halted ({status})"),
            RunOutcome::Missing => write!(f, "missing"),
        }
    }
}

/// Processes the pending and failed weeks of one collection, oldest first.
#[derive(Clone)]
pub struct CollectionRunner {
    store: Arc<dyn StateStore>,
    executor: WeekExecutor,
    rate_limiter: Arc<RateLimiter>,
    limits: ConcurrencyLimits,
    failure_threshold: u32,
}

impl CollectionRunner {
    pub fn new(
        store: Arc<dyn StateStore>,
        executor: WeekExecutor,
        rate_limiter: Arc<RateLimiter>,
        limits: ConcurrencyLimits,
        failure_threshold: u32,
    ) -> Self {
        Self {
            store,
            executor,
            rate_limiter,
            limits,
            failure_threshold,
        }
    }

    /// Run a claimed collection. The claim is released on return.
    #[instrument(skip_all, fields(collection = %claim.collection_id()))]
    pub async fn run(&self, claim: ClaimGuard) -> RunOutcome {
        let id = *claim.collection_id();

        let outcome = match self.drive(&id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "runner aborted");
                let reason = format!("runner error: {e}");
                self.finish_failed(&id, &reason).await;
                RunOutcome::Failed { reason }
            }
        };

        tracing::info!(%outcome, "runner finished");
        drop(claim);
        outcome
    }

    async fn drive(&self, id: &CollectionId) -> SchedResult<RunOutcome> {
        let Some(collection) = self.store.get_collection(id).await? else {
            return Ok(RunOutcome::Missing);
        };

        self.store
            .update_collection(
                id,
                &CollectionUpdate::new()
                    .started_at(Utc::now())
                    .when_status_in(&[CollectionStatus::Running]),
            )
            .await?;

        // Weeks left running by a process that died mid-execution.
        let orphaned = self
            .store
            .reset_weeks(id, &[WeekStatus::Running], WeekStatus::Pending)
            .await?;
        if orphaned > 0 {
            tracing::warn!(orphaned, "reset orphaned running weeks");
        }

        let already_done = self.store.list_weeks(id, &[WeekStatus::Completed]).await?.len();
        let mut weeks_completed = collection
            .weeks_completed
            .max(u32::try_from(already_done).unwrap_or(u32::MAX));

        let weeks = self.store.list_weeks(id, &WeekStatus::RUNNABLE).await?;
        if weeks.is_empty() {
            return self.finish_completed(&collection, weeks_completed).await;
        }

        tracing::info!(
            remaining = weeks.len(),
            weeks_completed,
            target = collection.target_weeks,
            "starting collection run"
        );

        let mut failures = 0u32;
        let mut last_error = String::new();
        for week in &weeks {
            match self.store.get_collection(id).await? {
                None => return Ok(RunOutcome::Missing),
                Some(current) if current.status.halts_runner() => {
                    tracing::info!(status = %current.status, "stopping between weeks");
                    return Ok(RunOutcome::Halted(current.status));
                }
                Some(_) => {}
            }

            self.rate_limiter.acquire().await;
            let permit = self.limits.acquire_week().await?;
            let succeeded = self.executor.execute_week(&collection, week).await;
            drop(permit);

            if succeeded {
                weeks_completed += 1;
            } else {
                failures += 1;
                last_error = format!("week {} failed", week.week_start_date);
            }

            self.store
                .update_collection(id, &CollectionUpdate::new().weeks_completed(weeks_completed))
                .await?;

            if failures >= self.failure_threshold {
                let reason = format!(
                    "{failures} weeks failed in this run (threshold {}); last: {last_error}",
                    self.failure_threshold
                );
                self.finish_failed(id, &reason).await;
                return Ok(RunOutcome::Failed { reason });
            }
        }

        let unfinished = self
            .store
            .list_weeks(id, &[WeekStatus::Pending, WeekStatus::Running, WeekStatus::Failed])
            .await?
            .len();
        if unfinished == 0 {
            return self.finish_completed(&collection, weeks_completed).await;
        }

        if let Some(current) = self.store.get_collection(id).await? {
            if current.status.halts_runner() {
                return Ok(RunOutcome::Halted(current.status));
            }
        }

        let reason = format!(
            "{unfinished} of {} weeks did not complete",
            collection.target_weeks
        );
        self.finish_failed(id, &reason).await;
        Ok(RunOutcome::Failed { reason })
    }

    async fn finish_completed(
        &self,
        collection: &Collection,
        weeks_completed: u32,
    ) -> SchedResult<RunOutcome> {
        let weeks = weeks_completed.max(collection.target_weeks);
        let affected = self
            .store
            .update_collection(
                &collection.id,
                &CollectionUpdate::new()
                    .status(CollectionStatus::Completed)
                    .weeks_completed(weeks)
                    .clear_error()
                    .completed_at(Utc::now())
                    .when_status_in(&[CollectionStatus::Running]),
            )
            .await?;

        if affected == 1 {
            return Ok(RunOutcome::Completed { weeks });
        }

        // Paused or cancelled while the last week ran.
        match self.store.get_collection(&collection.id).await? {
            Some(current) => Ok(RunOutcome::Halted(current.status)),
            None => Ok(RunOutcome::Missing),
        }
    }

    /// Mark the collection failed unless it was paused or cancelled meanwhile.
    async fn finish_failed(&self, id: &CollectionId, reason: &str) {
        let update = CollectionUpdate::new()
            .status(CollectionStatus::Failed)
            .error(reason)
            .when_status_in(&[CollectionStatus::Running]);
        if let Err(e) = self.store.update_collection(id, &update).await {
            tracing::error!(error = %e, "could not mark collection failed");
        }
    }
}
