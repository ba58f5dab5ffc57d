//! Caller-facing operations: starting backfills, pause/resume/cancel and
//! progress reads.
//!
//! These are plain store writes. Runners notice them between weeks; nothing
//! here calls into a running orchestrator.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use harvest_workflow::{InstanceRef, ParameterTemplate, WorkflowRef};
use serde::Serialize;

use crate::collection::{
    Collection, CollectionFilter, CollectionId, CollectionStatus, CollectionType, CollectionUpdate,
    MAX_TARGET_WEEKS, PublicId,
};
use crate::error::{SchedError, SchedResult};
use crate::persistence::StateStore;
use crate::week::{Week, WeekStatus, plan_weeks};

/// A request to collect historical data for a workflow.
#[derive(Debug, Clone)]
pub struct BackfillRequest {
    pub workflow_ref: WorkflowRef,
    pub instance_ref: InstanceRef,
    pub user_id: String,
    /// Defaults to the collection type's default when unset.
    pub target_weeks: Option<u32>,
    /// Last day covered by the newest week.
    pub end_date: NaiveDate,
    pub collection_type: CollectionType,
    pub parameters: ParameterTemplate,
}

impl BackfillRequest {
    pub fn new(
        workflow_ref: impl Into<WorkflowRef>,
        instance_ref: impl Into<InstanceRef>,
        user_id: impl Into<String>,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            workflow_ref: workflow_ref.into(),
            instance_ref: instance_ref.into(),
            user_id: user_id.into(),
            target_weeks: None,
            end_date,
            collection_type: CollectionType::Backfill,
            parameters: ParameterTemplate::default(),
        }
    }

    #[must_use]
    pub fn with_weeks(mut self, weeks: u32) -> Self {
        self.target_weeks = Some(weeks);
        self
    }

    #[must_use]
    pub fn with_type(mut self, collection_type: CollectionType) -> Self {
        self.collection_type = collection_type;
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: ParameterTemplate) -> Self {
        self.parameters = parameters;
        self
    }

    fn validate(&self) -> SchedResult<u32> {
        let weeks = self
            .target_weeks
            .unwrap_or_else(|| self.collection_type.default_weeks());
        if weeks == 0 || weeks > MAX_TARGET_WEEKS {
            return Err(SchedError::InvalidRequest(format!(
                "target_weeks must be between 1 and {MAX_TARGET_WEEKS}, got {weeks}"
            )));
        }
        if self.user_id.trim().is_empty() {
            return Err(SchedError::InvalidRequest("user_id is required".into()));
        }
        if self.workflow_ref.as_str().trim().is_empty() {
            return Err(SchedError::InvalidRequest("workflow_ref is required".into()));
        }
        if self.instance_ref.as_str().trim().is_empty() {
            return Err(SchedError::InvalidRequest("instance_ref is required".into()));
        }
        if self.end_date > Utc::now().date_naive() {
            return Err(SchedError::InvalidRequest(format!(
                "end_date {} is in the future",
                self.end_date
            )));
        }
        Ok(weeks)
    }
}

/// Per-week detail of a progress report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekProgress {
    pub week_start_date: NaiveDate,
    pub week_end_date: NaiveDate,
    pub status: WeekStatus,
    pub execution_date: Option<DateTime<Utc>>,
    pub row_count: Option<u64>,
    pub data_checksum: Option<String>,
    pub error_message: Option<String>,
}

impl From<Week> for WeekProgress {
    fn from(week: Week) -> Self {
        Self {
            week_start_date: week.week_start_date,
            week_end_date: week.week_end_date,
            status: week.status,
            execution_date: week.execution_date,
            row_count: week.row_count,
            data_checksum: week.data_checksum,
            error_message: week.error_message,
        }
    }
}

/// Number of weeks in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WeekCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Snapshot of a collection's progress.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionProgress {
    pub public_id: PublicId,
    pub status: CollectionStatus,
    pub collection_type: CollectionType,
    pub progress_percentage: u8,
    pub weeks_completed: u32,
    pub target_weeks: u32,
    pub retry_count: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub counts: WeekCounts,
    pub weeks: Vec<WeekProgress>,
}

/// Store-backed operations used by the API layer and the CLI.
#[derive(Clone)]
pub struct CollectionService {
    store: Arc<dyn StateStore>,
}

impl CollectionService {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Create a collection and all of its weeks.
    pub async fn start_backfill(&self, request: BackfillRequest) -> SchedResult<Collection> {
        let target_weeks = request.validate()?;
        let windows = plan_weeks(request.end_date, target_weeks);
        let start_date = windows
            .first()
            .map(|w| w.start)
            .ok_or_else(|| SchedError::Internal("week planning produced no weeks".into()))?;

        let collection = Collection::new(
            request.user_id,
            request.workflow_ref,
            request.instance_ref,
            request.collection_type,
            target_weeks,
            start_date,
            request.end_date,
            request.parameters,
        );
        let weeks: Vec<Week> = windows
            .into_iter()
            .map(|window| Week::new(collection.id, window))
            .collect();

        self.store.insert_collection(&collection, &weeks).await?;
        tracing::info!(
            collection = %collection.public_id,
            weeks = target_weeks,
            start = %collection.start_date,
            end = %collection.end_date,
            "backfill created"
        );
        Ok(collection)
    }

    /// Look up a collection by public id (`hc_…`) or internal UUID.
    pub async fn resolve(&self, key: &str) -> SchedResult<Collection> {
        let found = if PublicId::looks_like(key) {
            self.store.find_collection_by_public_id(key).await?
        } else {
            match CollectionId::parse(key) {
                Ok(id) => self.store.get_collection(&id).await?,
                Err(_) => None,
            }
        };
        found.ok_or_else(|| SchedError::CollectionNotFound(key.to_string()))
    }

    /// Ask the runner to stop after its current week.
    pub async fn pause(&self, key: &str) -> SchedResult<Collection> {
        self.transition(
            key,
            &[CollectionStatus::Pending, CollectionStatus::Running],
            CollectionStatus::Paused,
        )
        .await
    }

    /// Make a paused collection eligible for the orchestrator again.
    pub async fn resume(&self, key: &str) -> SchedResult<Collection> {
        self.transition(key, &[CollectionStatus::Paused], CollectionStatus::Pending)
            .await
    }

    /// Cancel a collection for good.
    pub async fn cancel(&self, key: &str) -> SchedResult<Collection> {
        self.transition(
            key,
            &[
                CollectionStatus::Pending,
                CollectionStatus::Running,
                CollectionStatus::Paused,
                CollectionStatus::Failed,
            ],
            CollectionStatus::Cancelled,
        )
        .await
    }

    /// Manually re-queue a failed collection with a fresh retry budget.
    pub async fn reset(&self, key: &str) -> SchedResult<Collection> {
        let collection = self.resolve(key).await?;
        let affected = self
            .store
            .update_collection(
                &collection.id,
                &CollectionUpdate::new()
                    .status(CollectionStatus::Pending)
                    .retry_count(0)
                    .clear_error()
                    .when_status_in(&[CollectionStatus::Failed]),
            )
            .await?;
        if affected == 0 {
            return Err(self.state_error(&collection.id, "failed").await);
        }

        let weeks = self
            .store
            .reset_weeks(&collection.id, &[WeekStatus::Failed], WeekStatus::Pending)
            .await?;
        tracing::info!(collection = %collection.public_id, weeks, "collection reset");
        self.reload(&collection.id).await
    }

    /// Read the collection and every week's state.
    pub async fn progress(&self, key: &str) -> SchedResult<CollectionProgress> {
        let collection = self.resolve(key).await?;
        let weeks = self.store.list_weeks(&collection.id, &[]).await?;

        let mut counts = WeekCounts::default();
        for week in &weeks {
            match week.status {
                WeekStatus::Pending => counts.pending += 1,
                WeekStatus::Running => counts.running += 1,
                WeekStatus::Completed => counts.completed += 1,
                WeekStatus::Failed => counts.failed += 1,
            }
        }

        Ok(CollectionProgress {
            public_id: collection.public_id,
            status: collection.status,
            collection_type: collection.collection_type,
            progress_percentage: collection.progress_percentage,
            weeks_completed: collection.weeks_completed,
            target_weeks: collection.target_weeks,
            retry_count: collection.retry_count,
            start_date: collection.start_date,
            end_date: collection.end_date,
            error_message: collection.error_message,
            updated_at: collection.updated_at,
            counts,
            weeks: weeks.into_iter().map(WeekProgress::from).collect(),
        })
    }

    /// List collections, oldest first.
    pub async fn list(&self, filter: &CollectionFilter) -> SchedResult<Vec<Collection>> {
        self.store.list_collections(filter).await
    }

    async fn transition(
        &self,
        key: &str,
        from: &[CollectionStatus],
        to: CollectionStatus,
    ) -> SchedResult<Collection> {
        let collection = self.resolve(key).await?;
        let affected = self
            .store
            .transition_collection_status(&collection.id, from, to)
            .await?;
        if affected == 0 {
            let expected = from
                .iter()
                .map(CollectionStatus::name)
                .collect::<Vec<_>>()
                .join(" or ");
            return Err(self.state_error(&collection.id, &expected).await);
        }
        tracing::info!(collection = %collection.public_id, status = %to, "collection status changed");
        self.reload(&collection.id).await
    }

    async fn reload(&self, id: &CollectionId) -> SchedResult<Collection> {
        self.store
            .get_collection(id)
            .await?
            .ok_or_else(|| SchedError::CollectionNotFound(id.to_string()))
    }

    async fn state_error(&self, id: &CollectionId, expected: &str) -> SchedError {
        match self.reload(id).await {
            Ok(current) => SchedError::InvalidCollectionState {
                expected: expected.to_string(),
                found: current.status.name().to_string(),
            },
            Err(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SqliteStore;

    fn service() -> CollectionService {
        CollectionService::new(Arc::new(SqliteStore::in_memory().unwrap()))
    }

    fn request(weeks: u32) -> BackfillRequest {
        BackfillRequest::new(
            "wf-1",
            "inst-1",
            "user-1",
            NaiveDate::from_ymd_opt(2024, 12, 29).unwrap(),
        )
        .with_weeks(weeks)
    }

    #[tokio::test]
    async fn test_start_backfill_creates_weeks() {
        let service = service();
        let collection = service.start_backfill(request(52)).await.unwrap();

        assert_eq!(collection.status, CollectionStatus::Pending);
        assert_eq!(collection.target_weeks, 52);
        assert_eq!(
            collection.start_date,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );

        let progress = service.progress(collection.public_id.as_str()).await.unwrap();
        assert_eq!(progress.weeks.len(), 52);
        assert_eq!(progress.counts.pending, 52);
        assert_eq!(progress.progress_percentage, 0);
        assert_eq!(progress.weeks[0].week_start_date, collection.start_date);
        assert_eq!(progress.weeks[51].week_end_date, collection.end_date);
    }

    #[tokio::test]
    async fn test_weekly_update_defaults_to_one_week() {
        let service = service();
        let mut req = request(1).with_type(CollectionType::WeeklyUpdate);
        req.target_weeks = None;
        let collection = service.start_backfill(req).await.unwrap();
        assert_eq!(collection.target_weeks, 1);
    }

    #[tokio::test]
    async fn test_start_backfill_rejects_bad_requests() {
        let service = service();
        assert!(matches!(
            service.start_backfill(request(0)).await,
            Err(SchedError::InvalidRequest(_))
        ));
        assert!(matches!(
            service.start_backfill(request(53)).await,
            Err(SchedError::InvalidRequest(_))
        ));

        let future = BackfillRequest::new(
            "wf-1",
            "inst-1",
            "user-1",
            Utc::now().date_naive() + chrono::Duration::days(7),
        );
        assert!(matches!(
            service.start_backfill(future).await,
            Err(SchedError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_pause_resume_cancel() {
        let service = service();
        let collection = service.start_backfill(request(4)).await.unwrap();
        let key = collection.public_id.as_str();

        assert_eq!(service.pause(key).await.unwrap().status, CollectionStatus::Paused);
        assert_eq!(service.resume(key).await.unwrap().status, CollectionStatus::Pending);
        assert_eq!(service.cancel(key).await.unwrap().status, CollectionStatus::Cancelled);

        let err = service.resume(key).await.unwrap_err();
        assert!(matches!(
            err,
            SchedError::InvalidCollectionState { ref found, .. } if found == "cancelled"
        ));
    }

    #[tokio::test]
    async fn test_resolve_by_uuid_and_unknown() {
        let service = service();
        let collection = service.start_backfill(request(1)).await.unwrap();

        let by_uuid = service.resolve(&collection.id.to_string()).await.unwrap();
        assert_eq!(by_uuid.public_id, collection.public_id);

        assert!(matches!(
            service.resolve("hc_000000000000").await,
            Err(SchedError::CollectionNotFound(_))
        ));
        assert!(matches!(
            service.resolve("not-an-id").await,
            Err(SchedError::CollectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_only_from_failed() {
        let store: Arc<dyn StateStore> = Arc::new(SqliteStore::in_memory().unwrap());
        let service = CollectionService::new(store.clone());
        let collection = service.start_backfill(request(2)).await.unwrap();
        let key = collection.public_id.as_str();

        assert!(service.reset(key).await.is_err());

        let weeks = store.list_weeks(&collection.id, &[]).await.unwrap();
        store
            .update_week(&weeks[0].id, &crate::week::WeekUpdate::failed("boom"))
            .await
            .unwrap();
        store
            .update_collection(
                &collection.id,
                &CollectionUpdate::new()
                    .status(CollectionStatus::Failed)
                    .retry_count(3)
                    .error("gave up"),
            )
            .await
            .unwrap();

        let reset = service.reset(key).await.unwrap();
        assert_eq!(reset.status, CollectionStatus::Pending);
        assert_eq!(reset.retry_count, 0);
        assert!(reset.error_message.is_none());

        let progress = service.progress(key).await.unwrap();
        assert_eq!(progress.counts.failed, 0);
        assert_eq!(progress.counts.pending, 2);
    }
}
