//! Collection types: one backfill job spanning up to 52 weekly runs.
//!
//! ```text
//!   pending ──→ running ──→ completed
//!      ↑  ↑        │ │
//!      │  │        │ ├──→ failed ──→ pending   (retry sweep / reset)
//!      │  │        │ │
//!      │  └─ paused ←┘ └──→ cancelled
//!      │       (resume)
//! ```
//!
//! `completed` and `cancelled` are terminal. Only the claim moves a
//! collection to `running`, and it only accepts `pending` or `paused`.

use chrono::{DateTime, NaiveDate, Utc};
use harvest_workflow::{DateWindow, InstanceRef, ParameterTemplate, WorkflowRef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of weeks a single collection may span.
pub const MAX_TARGET_WEEKS: u32 = 52;

/// Internal durable identifier of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionId(pub Uuid);

impl CollectionId {
    /// Create a new random collection ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a collection ID from a string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for CollectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CollectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Short identifier shown to users, e.g. `hc_3f2a9c01b7de`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicId(pub String);

impl PublicId {
    const PREFIX: &'static str = "hc_";

    /// Generate a fresh public ID.
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self(format!("{}{}", Self::PREFIX, &simple[..12]))
    }

    /// Whether a string looks like a public ID rather than a UUID.
    pub fn looks_like(s: &str) -> bool {
        s.starts_with(Self::PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PublicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl CollectionStatus {
    /// States the claim may move to `running`.
    pub const CLAIMABLE: [CollectionStatus; 2] = [CollectionStatus::Pending, CollectionStatus::Paused];

    /// States the orchestrator loop polls for.
    pub const ACTIVE: [CollectionStatus; 2] = [CollectionStatus::Pending, CollectionStatus::Running];

    /// Stored name of this status.
    pub fn name(&self) -> &'static str {
        match self {
            CollectionStatus::Pending => "pending",
            CollectionStatus::Running => "running",
            CollectionStatus::Paused => "paused",
            CollectionStatus::Completed => "completed",
            CollectionStatus::Failed => "failed",
            CollectionStatus::Cancelled => "cancelled",
        }
    }

    /// Parse a stored status name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CollectionStatus::Pending),
            "running" => Some(CollectionStatus::Running),
            "paused" => Some(CollectionStatus::Paused),
            "completed" => Some(CollectionStatus::Completed),
            "failed" => Some(CollectionStatus::Failed),
            "cancelled" => Some(CollectionStatus::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CollectionStatus::Completed | CollectionStatus::Cancelled)
    }

    /// Whether a runner should stop before its next week.
    ///
    /// Anything but `running` means the runner no longer owns the collection;
    /// a resumed or re-queued collection is claimable again.
    pub fn halts_runner(&self) -> bool {
        *self != CollectionStatus::Running
    }
}

impl std::fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    /// Bulk historical collection.
    #[default]
    Backfill,
    /// Incremental collection of the most recent week(s).
    WeeklyUpdate,
}

impl CollectionType {
    pub fn name(&self) -> &'static str {
        match self {
            CollectionType::Backfill => "backfill",
            CollectionType::WeeklyUpdate => "weekly_update",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "backfill" => Some(CollectionType::Backfill),
            "weekly_update" => Some(CollectionType::WeeklyUpdate),
            _ => None,
        }
    }

    /// Number of weeks used when a request does not specify one.
    pub fn default_weeks(&self) -> u32 {
        match self {
            CollectionType::Backfill => MAX_TARGET_WEEKS,
            CollectionType::WeeklyUpdate => 1,
        }
    }
}

impl std::fmt::Display for CollectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Percentage of `target_weeks` that is done, rounded down and capped at 100.
pub fn progress_percentage(weeks_completed: u32, target_weeks: u32) -> u8 {
    if target_weeks == 0 {
        return 0;
    }
    let done = u64::from(weeks_completed.min(target_weeks));
    // Bounded by 100 after the min above.
    (done * 100 / u64::from(target_weeks)) as u8
}

/// A backfill job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub public_id: PublicId,
    pub user_id: String,
    pub workflow_ref: WorkflowRef,
    pub instance_ref: InstanceRef,
    pub collection_type: CollectionType,
    pub target_weeks: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: CollectionStatus,
    pub progress_percentage: u8,
    pub weeks_completed: u32,
    /// Number of automatic retries already spent.
    pub retry_count: u32,
    /// Workflow parameters with date placeholders.
    pub parameters: ParameterTemplate,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Collection {
    /// Create a pending collection covering `start_date..=end_date`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: impl Into<String>,
        workflow_ref: WorkflowRef,
        instance_ref: InstanceRef,
        collection_type: CollectionType,
        target_weeks: u32,
        start_date: NaiveDate,
        end_date: NaiveDate,
        parameters: ParameterTemplate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CollectionId::new(),
            public_id: PublicId::generate(),
            user_id: user_id.into(),
            workflow_ref,
            instance_ref,
            collection_type,
            target_weeks,
            start_date,
            end_date,
            status: CollectionStatus::Pending,
            progress_percentage: 0,
            weeks_completed: 0,
            retry_count: 0,
            parameters,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// The full date range of the collection.
    pub fn window(&self) -> Option<DateWindow> {
        DateWindow::new(self.start_date, self.end_date)
    }
}

/// Filter for listing collections. Results are always ordered by
/// `created_at` ascending.
#[derive(Debug, Clone, Default)]
pub struct CollectionFilter {
    pub statuses: Option<Vec<CollectionStatus>>,
    pub user_id: Option<String>,
    pub updated_before: Option<DateTime<Utc>>,
    pub updated_after: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl CollectionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only collections in one of these states.
    #[must_use]
    pub fn with_statuses(mut self, statuses: &[CollectionStatus]) -> Self {
        self.statuses = Some(statuses.to_vec());
        self
    }

    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Only collections last updated strictly before `at`.
    #[must_use]
    pub fn updated_before(mut self, at: DateTime<Utc>) -> Self {
        self.updated_before = Some(at);
        self
    }

    /// Only collections last updated at or after `at`.
    #[must_use]
    pub fn updated_after(mut self, at: DateTime<Utc>) -> Self {
        self.updated_after = Some(at);
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A partial update of a collection's mutable fields.
///
/// `updated_at` is always refreshed. `weeks_completed` only ever grows and
/// the store derives `progress_percentage` from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionUpdate {
    pub status: Option<CollectionStatus>,
    pub weeks_completed: Option<u32>,
    pub retry_count: Option<u32>,
    /// `Some(None)` clears the message.
    pub error_message: Option<Option<String>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Apply only when the current status is one of these.
    pub only_if_status_in: Option<Vec<CollectionStatus>>,
}

impl CollectionUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn status(mut self, status: CollectionStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn weeks_completed(mut self, weeks: u32) -> Self {
        self.weeks_completed = Some(weeks);
        self
    }

    #[must_use]
    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }

    #[must_use]
    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(Some(message.into()));
        self
    }

    #[must_use]
    pub fn clear_error(mut self) -> Self {
        self.error_message = Some(None);
        self
    }

    #[must_use]
    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    #[must_use]
    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    /// Guard the update on the current status.
    #[must_use]
    pub fn when_status_in(mut self, statuses: &[CollectionStatus]) -> Self {
        self.only_if_status_in = Some(statuses.to_vec());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_names() {
        for status in [
            CollectionStatus::Pending,
            CollectionStatus::Running,
            CollectionStatus::Paused,
            CollectionStatus::Completed,
            CollectionStatus::Failed,
            CollectionStatus::Cancelled,
        ] {
            assert_eq!(CollectionStatus::parse(status.name()), Some(status));
        }
        assert_eq!(CollectionStatus::parse("Running"), None);
    }

    #[test]
    fn test_status_predicates() {
        assert!(CollectionStatus::Completed.is_terminal());
        assert!(CollectionStatus::Cancelled.is_terminal());
        assert!(!CollectionStatus::Failed.is_terminal());
        assert!(CollectionStatus::Paused.halts_runner());
        assert!(CollectionStatus::Cancelled.halts_runner());
        assert!(CollectionStatus::Pending.halts_runner());
        assert!(CollectionStatus::Failed.halts_runner());
        assert!(!CollectionStatus::Running.halts_runner());
    }

    #[test]
    fn test_progress_percentage_floors() {
        assert_eq!(progress_percentage(0, 4), 0);
        assert_eq!(progress_percentage(1, 3), 33);
        assert_eq!(progress_percentage(2, 3), 66);
        assert_eq!(progress_percentage(51, 52), 98);
        assert_eq!(progress_percentage(52, 52), 100);
        assert_eq!(progress_percentage(9, 4), 100);
        assert_eq!(progress_percentage(1, 0), 0);
    }

    #[test]
    fn test_public_id_shape() {
        let id = PublicId::generate();
        assert!(PublicId::looks_like(id.as_str()));
        assert_eq!(id.as_str().len(), 15);
        assert!(id.as_str()[3..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_collection_type_defaults() {
        assert_eq!(CollectionType::default(), CollectionType::Backfill);
        assert_eq!(CollectionType::Backfill.default_weeks(), 52);
        assert_eq!(CollectionType::WeeklyUpdate.default_weeks(), 1);
        assert_eq!(
            CollectionType::parse("weekly_update"),
            Some(CollectionType::WeeklyUpdate)
        );
    }
}
