//! The orchestrator loop and the abandoned-collection sweep loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use harvest_workflow::WorkflowService;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::claim::{ClaimCoordinator, ClaimGuard};
use crate::collection::{CollectionFilter, CollectionStatus};
use crate::config::OrchestratorConfig;
use crate::error::SchedResult;
use crate::executor::WeekExecutor;
use crate::limits::ConcurrencyLimits;
use crate::persistence::StateStore;
use crate::rate_limit::RateLimiter;
use crate::runner::CollectionRunner;
use crate::sweeps::RecoverySweeps;

/// What one orchestrator iteration did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationReport {
    /// Collections returned by the poll.
    pub polled: usize,
    /// Runners launched after a successful claim.
    pub launched: usize,
    /// Failed collections re-queued by the retry sweep.
    pub requeued: usize,
}

/// Polls the store, claims collections and runs them under the
/// concurrency limits.
///
/// Construct one per process and share it behind an `Arc`:
///
/// ```ignore
/// let orchestrator = Arc::new(Orchestrator::new(config, store, workflow)?);
/// orchestrator.start();
/// tokio::signal::ctrl_c().await?;
/// orchestrator.stop().await;
/// ```
pub struct Orchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn StateStore>,
    claims: ClaimCoordinator,
    limits: ConcurrencyLimits,
    runner: CollectionRunner,
    sweeps: RecoverySweeps,
    running: AtomicBool,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl Orchestrator {
    /// Wire up an orchestrator from its collaborators.
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn StateStore>,
        workflow: Arc<dyn WorkflowService>,
    ) -> SchedResult<Self> {
        config.validate()?;

        let limits = ConcurrencyLimits::new(
            config.max_concurrent_collections,
            config.max_concurrent_weeks,
        );
        let runner = CollectionRunner::new(
            store.clone(),
            WeekExecutor::new(store.clone(), workflow),
            Arc::new(RateLimiter::new(config.min_call_spacing())),
            limits.clone(),
            config.failure_threshold,
        );

        Ok(Self {
            claims: ClaimCoordinator::new(store.clone()),
            sweeps: RecoverySweeps::new(store.clone(), &config),
            store,
            limits,
            runner,
            config,
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn claims(&self) -> &ClaimCoordinator {
        &self.claims
    }

    pub fn limits(&self) -> &ConcurrencyLimits {
        &self.limits
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the orchestrator loop and the abandoned sweep in the background.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("orchestrator already started");
            return;
        }

        tracing::info!(
            interval_secs = self.config.check_interval_secs,
            max_collections = self.config.max_concurrent_collections,
            max_weeks = self.config.max_concurrent_weeks,
            "orchestrator started"
        );

        let this = self.clone();
        self.tasks.spawn(async move { this.poll_loop().await });

        let this = self.clone();
        self.tasks.spawn(async move { this.abandoned_loop().await });
    }

    /// Stop polling and wait for every in-flight runner to finish.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        self.tasks.close();
        tracing::info!(in_flight = self.claims.local_claims(), "orchestrator stopping");
        self.tasks.wait().await;
        tracing::info!("orchestrator stopped");
    }

    async fn poll_loop(&self) {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.config.check_interval()) => {}
            }
            if !self.is_running() {
                break;
            }

            match self.run_iteration().await {
                Ok(report) if report != IterationReport::default() => {
                    tracing::debug!(?report, "orchestrator iteration");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "orchestrator iteration failed"),
            }
        }
    }

    async fn abandoned_loop(&self) {
        let mut ticker = tokio::time::interval(self.config.abandoned_sweep_interval());
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.sweeps.reap_abandoned(Utc::now()).await {
                Ok(0) => {}
                Ok(reaped) => tracing::warn!(reaped, "abandoned sweep failed stale collections"),
                Err(e) => tracing::error!(error = %e, "abandoned sweep failed"),
            }
        }
    }

    /// One poll: claim eligible collections, launch runners, then run the
    /// retry sweep.
    pub async fn run_iteration(&self) -> SchedResult<IterationReport> {
        let candidates = self
            .store
            .list_collections(
                &CollectionFilter::new()
                    .with_statuses(&CollectionStatus::ACTIVE)
                    .with_limit(self.config.poll_batch_size),
            )
            .await?;

        let mut report = IterationReport {
            polled: candidates.len(),
            ..Default::default()
        };

        for collection in &candidates {
            if self.claims.is_claimed_locally(&collection.id) {
                continue;
            }
            match self.claims.try_claim(&collection.id).await {
                Ok(Some(claim)) => {
                    tracing::info!(collection = %collection.public_id, "launching runner");
                    self.spawn_runner(claim);
                    report.launched += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(collection = %collection.public_id, error = %e, "claim failed");
                }
            }
        }

        match self.sweeps.retry_failed(Utc::now()).await {
            Ok(requeued) => report.requeued = requeued,
            Err(e) => tracing::error!(error = %e, "retry sweep failed"),
        }

        Ok(report)
    }

    fn spawn_runner(&self, claim: ClaimGuard) {
        let runner = self.runner.clone();
        let limits = self.limits.clone();
        self.tasks.spawn(async move {
            let _slot = match limits.acquire_collection().await {
                Ok(slot) => slot,
                Err(e) => {
                    tracing::error!(collection = %claim.collection_id(), error = %e, "no runner slot");
                    return;
                }
            };
            runner.run(claim).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{CollectionId, CollectionUpdate};
    use crate::persistence::SqliteStore;
    use crate::service::{BackfillRequest, CollectionService};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use harvest_workflow::{ExecutionHandle, ExecutionRequest, WorkflowResult};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingWorkflow {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WorkflowService for CountingWorkflow {
        fn name(&self) -> &str {
            "counting"
        }

        async fn execute(&self, _request: &ExecutionRequest) -> WorkflowResult<ExecutionHandle> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ExecutionHandle::new(format!("exec-{call}")).with_row_count(3))
        }
    }

    struct Setup {
        store: Arc<dyn StateStore>,
        service: CollectionService,
        workflow: Arc<CountingWorkflow>,
        orchestrator: Arc<Orchestrator>,
    }

    fn setup(config: OrchestratorConfig) -> Setup {
        let store: Arc<dyn StateStore> = Arc::new(SqliteStore::in_memory().unwrap());
        let workflow = Arc::new(CountingWorkflow::default());
        let orchestrator =
            Arc::new(Orchestrator::new(config, store.clone(), workflow.clone()).unwrap());
        Setup {
            service: CollectionService::new(store.clone()),
            store,
            workflow,
            orchestrator,
        }
    }

    async fn backfill(service: &CollectionService, weeks: u32) -> CollectionId {
        let end = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        service
            .start_backfill(BackfillRequest::new("wf-1", "inst-1", "user-1", end).with_weeks(weeks))
            .await
            .unwrap()
            .id
    }

    async fn status(store: &Arc<dyn StateStore>, id: &CollectionId) -> CollectionStatus {
        store.get_collection(id).await.unwrap().unwrap().status
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = OrchestratorConfig {
            max_concurrent_weeks: 0,
            ..Default::default()
        };
        let store: Arc<dyn StateStore> = Arc::new(SqliteStore::in_memory().unwrap());
        let result = Orchestrator::new(config, store, Arc::new(CountingWorkflow::default()));
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_iteration_launches_and_stop_waits() {
        let s = setup(OrchestratorConfig::default());
        let a = backfill(&s.service, 2).await;
        let b = backfill(&s.service, 3).await;

        let report = s.orchestrator.run_iteration().await.unwrap();
        assert_eq!(report.polled, 2);
        assert_eq!(report.launched, 2);
        assert_eq!(status(&s.store, &a).await, CollectionStatus::Running);

        // Already claimed here, so a second poll launches nothing.
        let again = s.orchestrator.run_iteration().await.unwrap();
        assert_eq!(again.launched, 0);

        s.orchestrator.stop().await;

        assert_eq!(status(&s.store, &a).await, CollectionStatus::Completed);
        assert_eq!(status(&s.store, &b).await, CollectionStatus::Completed);
        assert_eq!(s.workflow.calls.load(Ordering::SeqCst), 5);
        assert_eq!(s.orchestrator.claims().local_claims(), 0);
        assert_eq!(s.orchestrator.limits().available_collections(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_batch_size_limits_claims() {
        let s = setup(OrchestratorConfig {
            poll_batch_size: 1,
            ..Default::default()
        });
        let first = backfill(&s.service, 1).await;
        let second = backfill(&s.service, 1).await;

        let report = s.orchestrator.run_iteration().await.unwrap();
        assert_eq!(report.launched, 1);
        s.orchestrator.stop().await;

        assert_eq!(status(&s.store, &first).await, CollectionStatus::Completed);
        assert_eq!(status(&s.store, &second).await, CollectionStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_iteration_runs_retry_sweep() {
        let s = setup(OrchestratorConfig::default());
        let id = backfill(&s.service, 1).await;
        s.store
            .update_collection(
                &id,
                &CollectionUpdate::new()
                    .status(CollectionStatus::Failed)
                    .error("1 of 1 weeks did not complete"),
            )
            .await
            .unwrap();

        let report = s.orchestrator.run_iteration().await.unwrap();
        assert_eq!(report.polled, 0);
        assert_eq!(report.requeued, 1);

        let stored = s.store.get_collection(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, CollectionStatus::Pending);
        assert_eq!(stored.retry_count, 1);
        s.orchestrator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_collections_are_not_polled() {
        let s = setup(OrchestratorConfig::default());
        let id = backfill(&s.service, 1).await;
        s.service.pause(&id.to_string()).await.unwrap();

        let report = s.orchestrator.run_iteration().await.unwrap();
        assert_eq!(report.polled, 0);
        s.orchestrator.stop().await;
        assert_eq!(status(&s.store, &id).await, CollectionStatus::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_loop_picks_up_work() {
        let s = setup(OrchestratorConfig::default());
        s.orchestrator.start();
        assert!(s.orchestrator.is_running());

        let id = backfill(&s.service, 2).await;
        tokio::time::sleep(Duration::from_secs(31)).await;
        s.orchestrator.stop().await;

        assert!(!s.orchestrator.is_running());
        assert_eq!(status(&s.store, &id).await, CollectionStatus::Completed);
    }
}
