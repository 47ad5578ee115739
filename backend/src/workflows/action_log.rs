// Action Log - Append-only record of workflow rule firings

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use solarops_shared::{ActionType, WorkflowActionLog};
use sqlx::{FromRow, PgPool};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Corrupt action log row {id}: {message}")]
    CorruptRow { id: Uuid, message: String },
    #[error("Action log unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Default and maximum page sizes for audit queries
pub const DEFAULT_LOG_LIMIT: usize = 50;
pub const MAX_LOG_LIMIT: usize = 500;

/// A firing about to be recorded
#[derive(Debug, Clone)]
pub struct NewActionLog {
    pub job_id: Uuid,
    pub rule_key: String,
    pub action_type: ActionType,
    pub created_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct ActionLogFilter {
    pub job_id: Option<Uuid>,
    pub rule_key: Option<String>,
    pub limit: Option<usize>,
}

impl ActionLogFilter {
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT)
    }

    fn matches(&self, entry: &WorkflowActionLog) -> bool {
        self.job_id.map_or(true, |id| entry.job_id == id)
            && self.rule_key.as_deref().map_or(true, |key| entry.rule_key == key)
    }
}

/// Storage contract for the action log. Rows are inserted, never updated or deleted.
#[async_trait]
pub trait ActionLogStore: Send + Sync {
    /// Most recent row for `(job_id, rule_key)` created strictly after `after`
    async fn latest_after(
        &self,
        job_id: Uuid,
        rule_key: &str,
        after: DateTime<Utc>,
    ) -> StoreResult<Option<WorkflowActionLog>>;

    /// Rows matching the filter, most recent first
    async fn recent(&self, filter: &ActionLogFilter) -> StoreResult<Vec<WorkflowActionLog>>;

    async fn append(&self, entry: NewActionLog) -> StoreResult<WorkflowActionLog>;
}

#[derive(Debug, FromRow)]
struct ActionLogRow {
    id: Uuid,
    job_id: Uuid,
    rule_key: String,
    action_type: String,
    created_at: DateTime<Utc>,
    metadata: serde_json::Value,
}

impl TryFrom<ActionLogRow> for WorkflowActionLog {
    type Error = StoreError;

    fn try_from(row: ActionLogRow) -> Result<Self, Self::Error> {
        let action_type = row.action_type.parse().map_err(|e: solarops_shared::UnknownActionType| {
            StoreError::CorruptRow {
                id: row.id,
                message: e.to_string(),
            }
        })?;

        Ok(WorkflowActionLog {
            id: row.id,
            job_id: row.job_id,
            rule_key: row.rule_key,
            action_type,
            created_at: row.created_at,
            metadata: row.metadata,
        })
    }
}

#[derive(Clone)]
pub struct PgActionLogStore {
    db_pool: PgPool,
}

impl PgActionLogStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ActionLogStore for PgActionLogStore {
    async fn latest_after(
        &self,
        job_id: Uuid,
        rule_key: &str,
        after: DateTime<Utc>,
    ) -> StoreResult<Option<WorkflowActionLog>> {
        let row = sqlx::query_as::<_, ActionLogRow>(
            r#"
            SELECT id, job_id, rule_key, action_type, created_at, metadata
            FROM workflow_action_logs
            WHERE job_id = $1 AND rule_key = $2 AND created_at > $3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(job_id)
        .bind(rule_key)
        .bind(after)
        .fetch_optional(&self.db_pool)
        .await?;

        row.map(WorkflowActionLog::try_from).transpose()
    }

    async fn recent(&self, filter: &ActionLogFilter) -> StoreResult<Vec<WorkflowActionLog>> {
        // NULL parameters disable the corresponding filter
        let rows = sqlx::query_as::<_, ActionLogRow>(
            r#"
            SELECT id, job_id, rule_key, action_type, created_at, metadata
            FROM workflow_action_logs
            WHERE ($1::uuid IS NULL OR job_id = $1)
              AND ($2::text IS NULL OR rule_key = $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(filter.job_id)
        .bind(filter.rule_key.as_deref())
        .bind(filter.effective_limit() as i64)
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter().map(WorkflowActionLog::try_from).collect()
    }

    async fn append(&self, entry: NewActionLog) -> StoreResult<WorkflowActionLog> {
        let row = sqlx::query_as::<_, ActionLogRow>(
            r#"
            INSERT INTO workflow_action_logs (id, job_id, rule_key, action_type, created_at, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, job_id, rule_key, action_type, created_at, metadata
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.job_id)
        .bind(&entry.rule_key)
        .bind(entry.action_type.as_str())
        .bind(entry.created_at)
        .bind(&entry.metadata)
        .fetch_one(&self.db_pool)
        .await?;

        row.try_into()
    }
}

/// Process-local store, used by tests and single-node dry runs
#[derive(Clone, Default)]
pub struct InMemoryActionLogStore {
    rows: Arc<Mutex<Vec<WorkflowActionLog>>>,
}

impl InMemoryActionLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Vec<WorkflowActionLog>>> {
        self.rows
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory action log poisoned".to_string()))
    }
}

#[async_trait]
impl ActionLogStore for InMemoryActionLogStore {
    async fn latest_after(
        &self,
        job_id: Uuid,
        rule_key: &str,
        after: DateTime<Utc>,
    ) -> StoreResult<Option<WorkflowActionLog>> {
        let rows = self.lock()?;
        Ok(rows
            .iter()
            .filter(|r| r.job_id == job_id && r.rule_key == rule_key && r.created_at > after)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn recent(&self, filter: &ActionLogFilter) -> StoreResult<Vec<WorkflowActionLog>> {
        let rows = self.lock()?;
        let mut matching: Vec<WorkflowActionLog> =
            rows.iter().filter(|r| filter.matches(r)).cloned().collect();
        // Later inserts win ties on created_at
        matching.reverse();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(filter.effective_limit());
        Ok(matching)
    }

    async fn append(&self, entry: NewActionLog) -> StoreResult<WorkflowActionLog> {
        let row = WorkflowActionLog {
            id: Uuid::new_v4(),
            job_id: entry.job_id,
            rule_key: entry.rule_key,
            action_type: entry.action_type,
            created_at: entry.created_at,
            metadata: entry.metadata,
        };
        self.lock()?.push(row.clone());
        Ok(row)
    }
}
