//! Persistence layer for collection and week state.

mod sqlite_store;

pub use sqlite_store::SqliteStore;

use async_trait::async_trait;

use crate::collection::{Collection, CollectionFilter, CollectionId, CollectionStatus, CollectionUpdate};
use crate::error::SchedResult;
use crate::week::{Week, WeekId, WeekStatus, WeekUpdate};

/// Trait for persistent state storage.
///
/// The store is the single source of truth shared by every runner and every
/// orchestrator process. The only cross-process synchronisation primitive is
/// [`StateStore::transition_collection_status`], which MUST be a single
/// atomic conditional write.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Insert a new collection together with all of its weeks.
    async fn insert_collection(&self, collection: &Collection, weeks: &[Week]) -> SchedResult<()>;

    /// Load a collection by internal id.
    async fn get_collection(&self, id: &CollectionId) -> SchedResult<Option<Collection>>;

    /// Load a collection by public id.
    async fn find_collection_by_public_id(&self, public_id: &str) -> SchedResult<Option<Collection>>;

    /// List collections matching a filter, oldest first.
    async fn list_collections(&self, filter: &CollectionFilter) -> SchedResult<Vec<Collection>>;

    /// Set `to` only if the current status is in `from`.
    ///
    /// Returns the number of affected rows (0 or 1).
    async fn transition_collection_status(
        &self,
        id: &CollectionId,
        from: &[CollectionStatus],
        to: CollectionStatus,
    ) -> SchedResult<usize>;

    /// Apply a partial update. Returns the number of affected rows, which is
    /// 0 when the update's status guard did not match.
    async fn update_collection(&self, id: &CollectionId, update: &CollectionUpdate) -> SchedResult<usize>;

    /// List a collection's weeks, ordered by `week_start_date` ascending.
    /// An empty status slice means all weeks.
    async fn list_weeks(&self, collection_id: &CollectionId, statuses: &[WeekStatus]) -> SchedResult<Vec<Week>>;

    /// Update a week's status and the fields that go with it.
    async fn update_week(&self, id: &WeekId, update: &WeekUpdate) -> SchedResult<()>;

    /// Move every week of a collection in one of `from` to `to`.
    async fn reset_weeks(
        &self,
        collection_id: &CollectionId,
        from: &[WeekStatus],
        to: WeekStatus,
    ) -> SchedResult<usize>;
}
