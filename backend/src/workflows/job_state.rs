// Job State - Read-only view of the job data that rule conditions inspect

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Job {0} not found")]
    JobNotFound(Uuid),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Invalid job data: {0}")]
    InvalidData(String),
}

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Sold,
    Permitting,
    Scheduled,
    Installing,
    Installed,
    Inspection,
    Completed,
    OnHold,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sold => "SOLD",
            Self::Permitting => "PERMITTING",
            Self::Scheduled => "SCHEDULED",
            Self::Installing => "INSTALLING",
            Self::Installed => "INSTALLED",
            Self::Inspection => "INSPECTION",
            Self::Completed => "COMPLETED",
            Self::OnHold => "ON_HOLD",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Terminal jobs are never picked up by a bulk run
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl FromStr for JobStatus {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SOLD" => Ok(Self::Sold),
            "PERMITTING" => Ok(Self::Permitting),
            "SCHEDULED" => Ok(Self::Scheduled),
            "INSTALLING" => Ok(Self::Installing),
            "INSTALLED" => Ok(Self::Installed),
            "INSPECTION" => Ok(Self::Inspection),
            "COMPLETED" => Ok(Self::Completed),
            "ON_HOLD" => Ok(Self::OnHold),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(StateError::InvalidData(format!("unknown job status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl IncidentSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl FromStr for IncidentSeverity {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(StateError::InvalidData(format!("unknown incident severity '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: Uuid,
    pub job_number: String,
    pub customer_id: Uuid,
    pub status: JobStatus,
    pub status_changed_at: DateTime<Utc>,
    /// Project id in the external task provider, if the job is linked
    pub external_project_id: Option<String>,
    pub installed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct QcInspection {
    pub id: Uuid,
    pub job_id: Uuid,
    pub passed: bool,
    pub score: Option<i32>,
    pub failed_items: i32,
    pub inspected_at: DateTime<Utc>,
    pub reinspection_scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SafetyIncident {
    pub id: Uuid,
    pub job_id: Uuid,
    pub severity: IncidentSeverity,
    pub description: String,
    pub reported_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct MaterialOrder {
    pub id: Uuid,
    pub job_id: Uuid,
    pub item: String,
    pub quantity: i32,
    pub backordered: bool,
    pub expected_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub job_id: Uuid,
    pub invoice_number: String,
    pub amount_due: Decimal,
    pub amount_paid: Decimal,
    pub due_date: NaiveDate,
}

impl Invoice {
    pub fn balance(&self) -> Decimal {
        self.amount_due - self.amount_paid
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct WarrantyClaim {
    pub id: Uuid,
    pub job_id: Uuid,
    pub summary: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Read-only access to current job state. The engine never writes through this.
#[async_trait]
pub trait JobStateReader: Send + Sync {
    async fn job(&self, job_id: Uuid) -> StateResult<JobRecord>;

    /// Inspections for the job, most recent first
    async fn qc_inspections(&self, job_id: Uuid) -> StateResult<Vec<QcInspection>>;

    async fn safety_incidents(&self, job_id: Uuid) -> StateResult<Vec<SafetyIncident>>;

    async fn material_orders(&self, job_id: Uuid) -> StateResult<Vec<MaterialOrder>>;

    async fn invoices(&self, job_id: Uuid) -> StateResult<Vec<Invoice>>;

    async fn warranty_claims(&self, job_id: Uuid) -> StateResult<Vec<WarrantyClaim>>;

    /// Non-terminal jobs, oldest first, at most `limit`
    async fn active_job_ids(&self, limit: usize) -> StateResult<Vec<Uuid>>;
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    job_number: String,
    customer_id: Uuid,
    status: String,
    status_changed_at: DateTime<Utc>,
    external_project_id: Option<String>,
    installed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = StateError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(JobRecord {
            id: row.id,
            job_number: row.job_number,
            customer_id: row.customer_id,
            status: row.status.parse()?,
            status_changed_at: row.status_changed_at,
            external_project_id: row.external_project_id,
            installed_at: row.installed_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SafetyIncidentRow {
    id: Uuid,
    job_id: Uuid,
    severity: String,
    description: String,
    reported_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

/// Postgres-backed reader over the operations tables
#[derive(Clone)]
pub struct PgJobStateReader {
    db_pool: PgPool,
}

impl PgJobStateReader {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl JobStateReader for PgJobStateReader {
    async fn job(&self, job_id: Uuid) -> StateResult<JobRecord> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, job_number, customer_id, status, status_changed_at,
                   external_project_id, installed_at, created_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.db_pool)
        .await?;

        row.ok_or(StateError::JobNotFound(job_id))?.try_into()
    }

    async fn qc_inspections(&self, job_id: Uuid) -> StateResult<Vec<QcInspection>> {
        let rows = sqlx::query_as::<_, QcInspection>(
            r#"
            SELECT id, job_id, passed, score, failed_items, inspected_at, reinspection_scheduled_at
            FROM qc_inspections
            WHERE job_id = $1
            ORDER BY inspected_at DESC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows)
    }

    async fn safety_incidents(&self, job_id: Uuid) -> StateResult<Vec<SafetyIncident>> {
        let rows = sqlx::query_as::<_, SafetyIncidentRow>(
            r#"
            SELECT id, job_id, severity, description, reported_at, resolved_at
            FROM safety_incidents
            WHERE job_id = $1
            ORDER BY reported_at DESC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(SafetyIncident {
                    id: row.id,
                    job_id: row.job_id,
                    severity: row.severity.parse()?,
                    description: row.description,
                    reported_at: row.reported_at,
                    resolved_at: row.resolved_at,
                })
            })
            .collect()
    }

    async fn material_orders(&self, job_id: Uuid) -> StateResult<Vec<MaterialOrder>> {
        let rows = sqlx::query_as::<_, MaterialOrder>(
            r#"
            SELECT id, job_id, item, quantity, backordered, expected_at, delivered_at
            FROM material_orders
            WHERE job_id = $1
            ORDER BY expected_at ASC NULLS LAST
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows)
    }

    async fn invoices(&self, job_id: Uuid) -> StateResult<Vec<Invoice>> {
        let rows = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, job_id, invoice_number, amount_due, amount_paid, due_date
            FROM invoices
            WHERE job_id = $1
            ORDER BY due_date ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows)
    }

    async fn warranty_claims(&self, job_id: Uuid) -> StateResult<Vec<WarrantyClaim>> {
        let rows = sqlx::query_as::<_, WarrantyClaim>(
            r#"
            SELECT id, job_id, summary, opened_at, closed_at
            FROM warranty_claims
            WHERE job_id = $1
            ORDER BY opened_at ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows)
    }

    async fn active_job_ids(&self, limit: usize) -> StateResult<Vec<Uuid>> {
        let terminal: Vec<String> = [JobStatus::Completed, JobStatus::Cancelled]
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
            FROM jobs
            WHERE status <> ALL($1)
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(terminal)
        .bind(limit as i64)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(ids)
    }
}
