//! Week types and week planning.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use harvest_workflow::DateWindow;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collection::CollectionId;

/// Unique identifier for a week row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeekId(pub Uuid);

impl WeekId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for WeekId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WeekId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a single week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl WeekStatus {
    /// Weeks a runner still has to execute.
    pub const RUNNABLE: [WeekStatus; 2] = [WeekStatus::Pending, WeekStatus::Failed];

    pub fn name(&self) -> &'static str {
        match self {
            WeekStatus::Pending => "pending",
            WeekStatus::Running => "running",
            WeekStatus::Completed => "completed",
            WeekStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WeekStatus::Pending),
            "running" => Some(WeekStatus::Running),
            "completed" => Some(WeekStatus::Completed),
            "failed" => Some(WeekStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for WeekStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One calendar week inside a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Week {
    pub id: WeekId,
    pub collection_id: CollectionId,
    pub week_start_date: NaiveDate,
    pub week_end_date: NaiveDate,
    pub status: WeekStatus,
    pub execution_date: Option<DateTime<Utc>>,
    /// Execution id assigned by the workflow service.
    pub execution_ref: Option<String>,
    pub row_count: Option<u64>,
    pub data_checksum: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Week {
    /// Create a pending week for the given window.
    pub fn new(collection_id: CollectionId, window: DateWindow) -> Self {
        let now = Utc::now();
        Self {
            id: WeekId::new(),
            collection_id,
            week_start_date: window.start,
            week_end_date: window.end,
            status: WeekStatus::Pending,
            execution_date: None,
            execution_ref: None,
            row_count: None,
            data_checksum: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn window(&self) -> DateWindow {
        DateWindow {
            start: self.week_start_date,
            end: self.week_end_date,
        }
    }
}

/// Fields written together with a week status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekUpdate {
    pub status: WeekStatus,
    pub execution_date: Option<DateTime<Utc>>,
    pub execution_ref: Option<String>,
    pub row_count: Option<u64>,
    pub data_checksum: Option<String>,
    /// `Some(None)` clears the message.
    pub error_message: Option<Option<String>>,
}

impl WeekUpdate {
    /// Mark a week as started now; clears any previous error.
    pub fn running(at: DateTime<Utc>) -> Self {
        Self {
            status: WeekStatus::Running,
            execution_date: Some(at),
            execution_ref: None,
            row_count: None,
            data_checksum: None,
            error_message: Some(None),
        }
    }

    pub fn completed(execution_ref: String, row_count: u64, checksum: Option<String>) -> Self {
        Self {
            status: WeekStatus::Completed,
            execution_date: None,
            execution_ref: Some(execution_ref),
            row_count: Some(row_count),
            data_checksum: checksum,
            error_message: Some(None),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: WeekStatus::Failed,
            execution_date: None,
            execution_ref: None,
            row_count: None,
            data_checksum: None,
            error_message: Some(Some(message.into())),
        }
    }
}

/// Split the `count` weeks ending on `end_date` into contiguous 7-day
/// windows, oldest first.
///
/// Window `i` counted back from the end covers
/// `end_date - 7(i+1) + 1 ..= end_date - 7i`.
pub fn plan_weeks(end_date: NaiveDate, count: u32) -> Vec<DateWindow> {
    let mut windows: Vec<DateWindow> = (0..i64::from(count))
        .map(|i| DateWindow {
            start: end_date - Duration::days(7 * (i + 1) - 1),
            end: end_date - Duration::days(7 * i),
        })
        .collect();
    windows.reverse();
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_plan_weeks_ascending() {
        let windows = plan_weeks(day(2024, 1, 28), 4);
        assert_eq!(windows.len(), 4);
        assert_eq!(windows[0].start, day(2024, 1, 1));
        assert_eq!(windows[0].end, day(2024, 1, 7));
        assert_eq!(windows[3].start, day(2024, 1, 22));
        assert_eq!(windows[3].end, day(2024, 1, 28));
    }

    #[test]
    fn test_plan_weeks_zero() {
        assert!(plan_weeks(day(2024, 1, 28), 0).is_empty());
    }

    #[test]
    fn test_week_update_constructors() {
        let update = WeekUpdate::failed("boom");
        assert_eq!(update.status, WeekStatus::Failed);
        assert_eq!(update.error_message, Some(Some("boom".to_string())));

        let update = WeekUpdate::completed("exec-1".into(), 12, Some("ab".into()));
        assert_eq!(update.row_count, Some(12));
        assert_eq!(update.error_message, Some(None));
    }

    proptest! {
        #[test]
        fn prop_weeks_are_contiguous(offset in 0i64..3650, count in 1u32..=52) {
            let end = day(2015, 1, 1) + Duration::days(offset);
            let windows = plan_weeks(end, count);

            prop_assert_eq!(windows.len(), count as usize);
            prop_assert_eq!(windows.last().unwrap().end, end);
            for w in &windows {
                prop_assert_eq!(w.days(), 7);
            }
            for pair in windows.windows(2) {
                prop_assert_eq!(pair[0].end + Duration::days(1), pair[1].start);
            }
        }
    }
}
