//! SQLite-based persistence for production use.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use harvest_workflow::{InstanceRef, ParameterTemplate, WorkflowRef};
use rusqlite::{Connection, ToSql};

use crate::collection::{
    Collection, CollectionFilter, CollectionId, CollectionStatus, CollectionType, CollectionUpdate,
    PublicId,
};
use crate::error::{SchedError, SchedResult};
use crate::persistence::StateStore;
use crate::week::{Week, WeekId, WeekStatus, WeekUpdate};

const COLLECTION_COLUMNS: &str = "id, public_id, user_id, workflow_ref, instance_ref, \
     collection_type, target_weeks, start_date, end_date, status, progress_percentage, \
     weeks_completed, retry_count, parameters, error_message, created_at, updated_at, \
     started_at, completed_at";

const WEEK_COLUMNS: &str = "id, collection_id, week_start_date, week_end_date, status, \
     execution_date, execution_ref, row_count, data_checksum, error_message, created_at, \
     updated_at";

/// SQLite-based state store.
///
/// Provides persistent storage with ACID guarantees. Every conditional
/// status change is a single `UPDATE ... WHERE status IN (...)` statement,
/// so several orchestrator processes may share one database file.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a SQLite store at the given path.
    pub fn open(path: impl AsRef<Path>) -> SchedResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, "opened state database");
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema_sync()?;
        Ok(store)
    }

    /// Create a new in-memory SQLite store.
    pub fn in_memory() -> SchedResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema_sync()?;
        Ok(store)
    }

    fn lock(&self) -> SchedResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SchedError::DatabaseError(e.to_string()))
    }

    fn init_schema_sync(&self) -> SchedResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                id TEXT PRIMARY KEY,
                public_id TEXT NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                workflow_ref TEXT NOT NULL,
                instance_ref TEXT NOT NULL,
                collection_type TEXT NOT NULL,
                target_weeks INTEGER NOT NULL CHECK (target_weeks > 0),
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                status TEXT NOT NULL,
                progress_percentage INTEGER NOT NULL DEFAULT 0,
                weeks_completed INTEGER NOT NULL DEFAULT 0,
                retry_count INTEGER NOT NULL DEFAULT 0,
                parameters TEXT NOT NULL,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_collections_status ON collections(status);
            CREATE INDEX IF NOT EXISTS idx_collections_created_at ON collections(created_at);
            CREATE INDEX IF NOT EXISTS idx_collections_user ON collections(user_id);

            CREATE TABLE IF NOT EXISTS weeks (
                id TEXT PRIMARY KEY,
                collection_id TEXT NOT NULL,
                week_start_date TEXT NOT NULL,
                week_end_date TEXT NOT NULL,
                status TEXT NOT NULL,
                execution_date TEXT,
                execution_ref TEXT,
                row_count INTEGER,
                data_checksum TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (collection_id, week_start_date),
                FOREIGN KEY (collection_id) REFERENCES collections(id)
            );

            CREATE INDEX IF NOT EXISTS idx_weeks_collection ON weeks(collection_id, week_start_date);
            "#,
        )?;
        Ok(())
    }
}

fn fmt_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn fmt_date(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

fn parse_ts(s: &str) -> SchedResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SchedError::CorruptRecord(format!("timestamp '{s}': {e}")))
}

fn parse_opt_ts(s: Option<String>) -> SchedResult<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}

fn parse_date(s: &str) -> SchedResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| SchedError::CorruptRecord(format!("date '{s}': {e}")))
}

fn parse_uuid(s: &str) -> SchedResult<uuid::Uuid> {
    uuid::Uuid::parse_str(s).map_err(|e| SchedError::CorruptRecord(format!("id '{s}': {e}")))
}

fn to_u32(v: i64, field: &str) -> SchedResult<u32> {
    u32::try_from(v).map_err(|_| SchedError::CorruptRecord(format!("{field} out of range: {v}")))
}

/// Append `column IN (?n, ...)` for the given names and push their params.
fn push_in_clause(
    sql: &mut String,
    params: &mut Vec<Box<dyn ToSql>>,
    column: &str,
    names: impl IntoIterator<Item = &'static str>,
) {
    let placeholders: Vec<String> = names
        .into_iter()
        .map(|name| {
            params.push(Box::new(name));
            format!("?{}", params.len())
        })
        .collect();
    sql.push_str(&format!("{column} IN ({})", placeholders.join(", ")));
}

fn collection_from_row(row: &rusqlite::Row<'_>) -> SchedResult<Collection> {
    let id: String = row.get(0)?;
    let collection_type: String = row.get(5)?;
    let status: String = row.get(9)?;
    let parameters: String = row.get(13)?;
    let created_at: String = row.get(15)?;
    let updated_at: String = row.get(16)?;
    let start_date: String = row.get(7)?;
    let end_date: String = row.get(8)?;
    let progress: i64 = row.get(10)?;

    Ok(Collection {
        id: CollectionId(parse_uuid(&id)?),
        public_id: PublicId(row.get(1)?),
        user_id: row.get(2)?,
        workflow_ref: WorkflowRef(row.get(3)?),
        instance_ref: InstanceRef(row.get(4)?),
        collection_type: CollectionType::parse(&collection_type).ok_or_else(|| {
            SchedError::CorruptRecord(format!("collection type '{collection_type}'"))
        })?,
        target_weeks: to_u32(row.get(6)?, "target_weeks")?,
        start_date: parse_date(&start_date)?,
        end_date: parse_date(&end_date)?,
        status: CollectionStatus::parse(&status)
            .ok_or_else(|| SchedError::CorruptRecord(format!("collection status '{status}'")))?,
        progress_percentage: u8::try_from(progress.clamp(0, 100)).unwrap_or(100),
        weeks_completed: to_u32(row.get(11)?, "weeks_completed")?,
        retry_count: to_u32(row.get(12)?, "retry_count")?,
        parameters: serde_json::from_str::<ParameterTemplate>(&parameters)?,
        error_message: row.get(14)?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
        started_at: parse_opt_ts(row.get(17)?)?,
        completed_at: parse_opt_ts(row.get(18)?)?,
    })
}

fn week_from_row(row: &rusqlite::Row<'_>) -> SchedResult<Week> {
    let id: String = row.get(0)?;
    let collection_id: String = row.get(1)?;
    let start: String = row.get(2)?;
    let end: String = row.get(3)?;
    let status: String = row.get(4)?;
    let row_count: Option<i64> = row.get(7)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;

    Ok(Week {
        id: WeekId(parse_uuid(&id)?),
        collection_id: CollectionId(parse_uuid(&collection_id)?),
        week_start_date: parse_date(&start)?,
        week_end_date: parse_date(&end)?,
        status: WeekStatus::parse(&status)
            .ok_or_else(|| SchedError::CorruptRecord(format!("week status '{status}'")))?,
        execution_date: parse_opt_ts(row.get(5)?)?,
        execution_ref: row.get(6)?,
        row_count: row_count.map(|n| u64::try_from(n).unwrap_or(0)),
        data_checksum: row.get(8)?,
        error_message: row.get(9)?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn insert_collection(&self, collection: &Collection, weeks: &[Week]) -> SchedResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let parameters = serde_json::to_string(&collection.parameters)?;

        tx.execute(
            &format!(
                "INSERT INTO collections ({COLLECTION_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
            ),
            rusqlite::params![
                collection.id.to_string(),
                collection.public_id.as_str(),
                collection.user_id,
                collection.workflow_ref.as_str(),
                collection.instance_ref.as_str(),
                collection.collection_type.name(),
                i64::from(collection.target_weeks),
                fmt_date(collection.start_date),
                fmt_date(collection.end_date),
                collection.status.name(),
                i64::from(collection.progress_percentage),
                i64::from(collection.weeks_completed),
                i64::from(collection.retry_count),
                parameters,
                collection.error_message,
                fmt_ts(collection.created_at),
                fmt_ts(collection.updated_at),
                collection.started_at.map(fmt_ts),
                collection.completed_at.map(fmt_ts),
            ],
        )?;

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO weeks ({WEEK_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ))?;
            for week in weeks {
                stmt.execute(rusqlite::params![
                    week.id.to_string(),
                    week.collection_id.to_string(),
                    fmt_date(week.week_start_date),
                    fmt_date(week.week_end_date),
                    week.status.name(),
                    week.execution_date.map(fmt_ts),
                    week.execution_ref,
                    week.row_count.map(|n| i64::try_from(n).unwrap_or(i64::MAX)),
                    week.data_checksum,
                    week.error_message,
                    fmt_ts(week.created_at),
                    fmt_ts(week.updated_at),
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    async fn get_collection(&self, id: &CollectionId) -> SchedResult<Option<Collection>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = ?1"))?;
        let mut rows = stmt.query(rusqlite::params![id.to_string()])?;

        match rows.next()? {
            Some(row) => Ok(Some(collection_from_row(row)?)),
            None => Ok(None),
        }
    }

    async fn find_collection_by_public_id(&self, public_id: &str) -> SchedResult<Option<Collection>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections WHERE public_id = ?1"
        ))?;
        let mut rows = stmt.query(rusqlite::params![public_id])?;

        match rows.next()? {
            Some(row) => Ok(Some(collection_from_row(row)?)),
            None => Ok(None),
        }
    }

    async fn list_collections(&self, filter: &CollectionFilter) -> SchedResult<Vec<Collection>> {
        let conn = self.lock()?;

        let mut sql = format!("SELECT {COLLECTION_COLUMNS} FROM collections WHERE 1=1");
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(ref statuses) = filter.statuses {
            sql.push_str(" AND ");
            push_in_clause(&mut sql, &mut params, "status", statuses.iter().map(|s| s.name()));
        }

        if let Some(ref user_id) = filter.user_id {
            params.push(Box::new(user_id.clone()));
            sql.push_str(&format!(" AND user_id = ?{}", params.len()));
        }

        if let Some(before) = filter.updated_before {
            params.push(Box::new(fmt_ts(before)));
            sql.push_str(&format!(" AND updated_at < ?{}", params.len()));
        }

        if let Some(after) = filter.updated_after {
            params.push(Box::new(fmt_ts(after)));
            sql.push_str(&format!(" AND updated_at >= ?{}", params.len()));
        }

        sql.push_str(" ORDER BY created_at ASC, rowid ASC");

        if let Some(limit) = filter.limit {
            params.push(Box::new(i64::try_from(limit).unwrap_or(i64::MAX)));
            sql.push_str(&format!(" LIMIT ?{}", params.len()));
        }

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn ToSql> = params.iter().map(|b| b.as_ref()).collect();
        let mut rows = stmt.query(params_refs.as_slice())?;

        let mut collections = Vec::new();
        while let Some(row) = rows.next()? {
            collections.push(collection_from_row(row)?);
        }
        Ok(collections)
    }

    async fn transition_collection_status(
        &self,
        id: &CollectionId,
        from: &[CollectionStatus],
        to: CollectionStatus,
    ) -> SchedResult<usize> {
        if from.is_empty() {
            return Ok(0);
        }

        let conn = self.lock()?;
        let mut params: Vec<Box<dyn ToSql>> = vec![
            Box::new(to.name()),
            Box::new(fmt_ts(Utc::now())),
            Box::new(id.to_string()),
        ];
        let mut sql =
            String::from("UPDATE collections SET status = ?1, updated_at = ?2 WHERE id = ?3 AND ");
        push_in_clause(&mut sql, &mut params, "status", from.iter().map(|s| s.name()));

        let params_refs: Vec<&dyn ToSql> = params.iter().map(|b| b.as_ref()).collect();
        Ok(conn.execute(&sql, params_refs.as_slice())?)
    }

    async fn update_collection(&self, id: &CollectionId, update: &CollectionUpdate) -> SchedResult<usize> {
        let conn = self.lock()?;

        let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(fmt_ts(Utc::now()))];
        let mut sets = vec![String::from("updated_at = ?1")];

        if let Some(status) = update.status {
            params.push(Box::new(status.name()));
            sets.push(format!("status = ?{}", params.len()));
        }
        if let Some(weeks) = update.weeks_completed {
            params.push(Box::new(i64::from(weeks)));
            let n = params.len();
            sets.push(format!("weeks_completed = MAX(weeks_completed, ?{n})"));
            // Mirrors `progress_percentage`, evaluated in the same statement.
            sets.push(format!(
                "progress_percentage = MIN(100, MIN(MAX(weeks_completed, ?{n}), target_weeks) * 100 / target_weeks)"
            ));
        }
        if let Some(retry_count) = update.retry_count {
            params.push(Box::new(i64::from(retry_count)));
            sets.push(format!("retry_count = ?{}", params.len()));
        }
        if let Some(ref message) = update.error_message {
            params.push(Box::new(message.clone()));
            sets.push(format!("error_message = ?{}", params.len()));
        }
        if let Some(at) = update.started_at {
            params.push(Box::new(fmt_ts(at)));
            sets.push(format!("started_at = ?{}", params.len()));
        }
        if let Some(at) = update.completed_at {
            params.push(Box::new(fmt_ts(at)));
            sets.push(format!("completed_at = ?{}", params.len()));
        }

        params.push(Box::new(id.to_string()));
        let mut sql = format!(
            "UPDATE collections SET {} WHERE id = ?{}",
            sets.join(", "),
            params.len()
        );

        if let Some(ref guard) = update.only_if_status_in {
            if guard.is_empty() {
                return Ok(0);
            }
            sql.push_str(" AND ");
            push_in_clause(&mut sql, &mut params, "status", guard.iter().map(|s| s.name()));
        }

        let params_refs: Vec<&dyn ToSql> = params.iter().map(|b| b.as_ref()).collect();
        Ok(conn.execute(&sql, params_refs.as_slice())?)
    }

    async fn list_weeks(&self, collection_id: &CollectionId, statuses: &[WeekStatus]) -> SchedResult<Vec<Week>> {
        let conn = self.lock()?;

        let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(collection_id.to_string())];
        let mut sql = format!("SELECT {WEEK_COLUMNS} FROM weeks WHERE collection_id = ?1");
        if !statuses.is_empty() {
            sql.push_str(" AND ");
            push_in_clause(&mut sql, &mut params, "status", statuses.iter().map(|s| s.name()));
        }
        sql.push_str(" ORDER BY week_start_date ASC");

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn ToSql> = params.iter().map(|b| b.as_ref()).collect();
        let mut rows = stmt.query(params_refs.as_slice())?;

        let mut weeks = Vec::new();
        while let Some(row) = rows.next()? {
            weeks.push(week_from_row(row)?);
        }
        Ok(weeks)
    }

    async fn update_week(&self, id: &WeekId, update: &WeekUpdate) -> SchedResult<()> {
        let conn = self.lock()?;

        let mut params: Vec<Box<dyn ToSql>> = vec![
            Box::new(update.status.name()),
            Box::new(fmt_ts(Utc::now())),
            Box::new(update.execution_date.map(fmt_ts)),
            Box::new(update.execution_ref.clone()),
            Box::new(
                update
                    .row_count
                    .map(|n| i64::try_from(n).unwrap_or(i64::MAX)),
            ),
            Box::new(update.data_checksum.clone()),
        ];
        let mut sql = String::from(
            "UPDATE weeks SET status = ?1, updated_at = ?2, \
             execution_date = COALESCE(?3, execution_date), execution_ref = ?4, \
             row_count = ?5, data_checksum = ?6",
        );
        if let Some(ref message) = update.error_message {
            params.push(Box::new(message.clone()));
            sql.push_str(&format!(", error_message = ?{}", params.len()));
        }
        params.push(Box::new(id.to_string()));
        sql.push_str(&format!(" WHERE id = ?{}", params.len()));

        let params_refs: Vec<&dyn ToSql> = params.iter().map(|b| b.as_ref()).collect();
        let updated = conn.execute(&sql, params_refs.as_slice())?;
        if updated == 0 {
            return Err(SchedError::WeekNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn reset_weeks(
        &self,
        collection_id: &CollectionId,
        from: &[WeekStatus],
        to: WeekStatus,
    ) -> SchedResult<usize> {
        if from.is_empty() {
            return Ok(0);
        }

        let conn = self.lock()?;
        let mut params: Vec<Box<dyn ToSql>> = vec![
            Box::new(to.name()),
            Box::new(fmt_ts(Utc::now())),
            Box::new(collection_id.to_string()),
        ];
        let mut sql = String::from(
            "UPDATE weeks SET status = ?1, updated_at = ?2 WHERE collection_id = ?3 AND ",
        );
        push_in_clause(&mut sql, &mut params, "status", from.iter().map(|s| s.name()));

        let params_refs: Vec<&dyn ToSql> = params.iter().map(|b| b.as_ref()).collect();
        Ok(conn.execute(&sql, params_refs.as_slice())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::progress_percentage;
    use crate::week::plan_weeks;
    use chrono::Duration as ChronoDuration;

    fn sample(target_weeks: u32) -> (Collection, Vec<Week>) {
        let end = NaiveDate::from_ymd_opt(2024, 1, 28).unwrap();
        let windows = plan_weeks(end, target_weeks);
        let collection = Collection::new(
            "user-1",
            WorkflowRef::new("wf-1"),
            InstanceRef::new("inst-1"),
            CollectionType::Backfill,
            target_weeks,
            windows[0].start,
            end,
            ParameterTemplate::from_value(serde_json::json!({ "from": "{{start_date}}" })),
        );
        let weeks = windows
            .into_iter()
            .map(|w| Week::new(collection.id, w))
            .collect();
        (collection, weeks)
    }

    #[tokio::test]
    async fn test_sqlite_store_basic() {
        let store = SqliteStore::in_memory().unwrap();
        let (collection, weeks) = sample(4);
        store.insert_collection(&collection, &weeks).await.unwrap();

        let loaded = store.get_collection(&collection.id).await.unwrap().unwrap();
        assert_eq!(loaded.public_id, collection.public_id);
        assert_eq!(loaded.status, CollectionStatus::Pending);
        assert_eq!(loaded.parameters, collection.parameters);
        assert_eq!(loaded.start_date, collection.start_date);

        let by_public = store
            .find_collection_by_public_id(collection.public_id.as_str())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_public.id, collection.id);

        let stored_weeks = store.list_weeks(&collection.id, &[]).await.unwrap();
        assert_eq!(stored_weeks.len(), 4);
        assert!(
            stored_weeks
                .windows(2)
                .all(|w| w[0].week_start_date < w[1].week_start_date)
        );
    }

    #[tokio::test]
    async fn test_conditional_transition() {
        let store = SqliteStore::in_memory().unwrap();
        let (collection, weeks) = sample(2);
        store.insert_collection(&collection, &weeks).await.unwrap();

        let claimed = store
            .transition_collection_status(
                &collection.id,
                &CollectionStatus::CLAIMABLE,
                CollectionStatus::Running,
            )
            .await
            .unwrap();
        assert_eq!(claimed, 1);

        let again = store
            .transition_collection_status(
                &collection.id,
                &CollectionStatus::CLAIMABLE,
                CollectionStatus::Running,
            )
            .await
            .unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn test_weeks_completed_never_decreases() {
        let store = SqliteStore::in_memory().unwrap();
        let (collection, weeks) = sample(3);
        store.insert_collection(&collection, &weeks).await.unwrap();

        store
            .update_collection(&collection.id, &CollectionUpdate::new().weeks_completed(2))
            .await
            .unwrap();
        store
            .update_collection(&collection.id, &CollectionUpdate::new().weeks_completed(1))
            .await
            .unwrap();

        let loaded = store.get_collection(&collection.id).await.unwrap().unwrap();
        assert_eq!(loaded.weeks_completed, 2);
        assert_eq!(loaded.progress_percentage, progress_percentage(2, 3));
    }

    #[tokio::test]
    async fn test_stored_progress_matches_formula() {
        for target in [1, 3, 7, 52] {
            let store = SqliteStore::in_memory().unwrap();
            let (collection, weeks) = sample(target);
            store.insert_collection(&collection, &weeks).await.unwrap();

            for done in 0..=target + 1 {
                store
                    .update_collection(&collection.id, &CollectionUpdate::new().weeks_completed(done))
                    .await
                    .unwrap();
                let loaded = store.get_collection(&collection.id).await.unwrap().unwrap();
                assert_eq!(
                    loaded.progress_percentage,
                    progress_percentage(loaded.weeks_completed, target),
                    "{done} of {target} weeks"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_guarded_update_skips_mismatch() {
        let store = SqliteStore::in_memory().unwrap();
        let (collection, weeks) = sample(1);
        store.insert_collection(&collection, &weeks).await.unwrap();

        let affected = store
            .update_collection(
                &collection.id,
                &CollectionUpdate::new()
                    .status(CollectionStatus::Completed)
                    .when_status_in(&[CollectionStatus::Running]),
            )
            .await
            .unwrap();
        assert_eq!(affected, 0);

        let loaded = store.get_collection(&collection.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, CollectionStatus::Pending);
    }

    #[tokio::test]
    async fn test_list_collections_filters() {
        let store = SqliteStore::in_memory().unwrap();
        let (first, first_weeks) = sample(1);
        let (mut second, second_weeks) = sample(1);
        second.user_id = "user-2".into();
        second.status = CollectionStatus::Failed;
        second.created_at = first.created_at + ChronoDuration::seconds(1);
        store.insert_collection(&first, &first_weeks).await.unwrap();
        store.insert_collection(&second, &second_weeks).await.unwrap();

        let all = store
            .list_collections(&CollectionFilter::new())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);

        let failed = store
            .list_collections(&CollectionFilter::new().with_statuses(&[CollectionStatus::Failed]))
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, second.id);

        let mine = store
            .list_collections(&CollectionFilter::new().with_user("user-1"))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);

        let future = Utc::now() + ChronoDuration::hours(1);
        let stale = store
            .list_collections(&CollectionFilter::new().updated_after(future))
            .await
            .unwrap();
        assert!(stale.is_empty());

        let limited = store
            .list_collections(&CollectionFilter::new().with_limit(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_update_week_and_reset() {
        let store = SqliteStore::in_memory().unwrap();
        let (collection, weeks) = sample(2);
        store.insert_collection(&collection, &weeks).await.unwrap();

        store
            .update_week(&weeks[0].id, &WeekUpdate::running(Utc::now()))
            .await
            .unwrap();
        store
            .update_week(
                &weeks[1].id,
                &WeekUpdate::completed("exec-2".into(), 7, Some("abc".into())),
            )
            .await
            .unwrap();

        let running = store
            .list_weeks(&collection.id, &[WeekStatus::Running])
            .await
            .unwrap();
        assert_eq!(running.len(), 1);
        assert!(running[0].execution_date.is_some());

        let reset = store
            .reset_weeks(&collection.id, &[WeekStatus::Running], WeekStatus::Pending)
            .await
            .unwrap();
        assert_eq!(reset, 1);

        let done = store
            .list_weeks(&collection.id, &[WeekStatus::Completed])
            .await
            .unwrap();
        assert_eq!(done[0].row_count, Some(7));
        assert_eq!(done[0].data_checksum.as_deref(), Some("abc"));

        let missing = store
            .update_week(&WeekId::new(), &WeekUpdate::failed("x"))
            .await;
        assert!(matches!(missing, Err(SchedError::WeekNotFound(_))));
    }

    #[tokio::test]
    async fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.db");
        let (collection, weeks) = sample(2);

        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_collection(&collection, &weeks).await.unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        let loaded = reopened.get_collection(&collection.id).await.unwrap();
        assert!(loaded.is_some());
    }
}
