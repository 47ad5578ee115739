// Job Scheduler - Cron trigger for the daily workflow automation run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::workflows::WorkflowEngine;

pub const WORKFLOW_AUTOMATION_JOB: &str = "workflow_automation";

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Feature flag; when off the scheduled trigger does nothing
    pub workflow_automation_enabled: bool,
    /// Six-field cron expression (seconds first)
    pub workflow_cron: String,
    /// Maximum jobs visited per scheduled run
    pub workflow_run_limit: usize,
    /// In-memory execution history kept for inspection
    pub execution_log_capacity: usize,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            // Daily at 06:00 UTC
            workflow_automation_enabled: true,
            workflow_cron: "0 0 6 * * *".to_string(),
            workflow_run_limit: 500,
            execution_log_capacity: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionLog {
    pub id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobRunStatus,
    pub items_processed: usize,
    pub actions_fired: usize,
    pub errors: Vec<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum JobRunStatus {
    Completed,
    PartialFailure,
    Failed,
    Skipped,
}

/// One scheduled workflow pass. Never returns an error: failures end up in the log entry.
pub async fn run_workflow_automation(
    engine: &WorkflowEngine,
    config: &JobConfig,
    cancel: &CancellationToken,
) -> JobExecutionLog {
    let started_at = Utc::now();
    let mut log = JobExecutionLog {
        id: Uuid::new_v4(),
        job_name: WORKFLOW_AUTOMATION_JOB.to_string(),
        started_at,
        completed_at: None,
        status: JobRunStatus::Skipped,
        items_processed: 0,
        actions_fired: 0,
        errors: Vec::new(),
        duration_ms: None,
    };

    if !config.workflow_automation_enabled {
        info!("Workflow automation is disabled, skipping scheduled run");
        return log;
    }

    info!("Running workflow automation job");

    match engine
        .run_all_with_cancel(config.workflow_run_limit, cancel)
        .await
    {
        Ok(summary) => {
            log.items_processed = summary.processed;
            log.actions_fired = summary.actions;
            if summary.failed > 0 {
                log.errors.push(format!("{} job(s) failed", summary.failed));
                log.status = JobRunStatus::PartialFailure;
            } else {
                log.status = JobRunStatus::Completed;
            }
            info!(
                "Workflow automation completed: {} jobs processed, {} actions fired",
                summary.processed, summary.actions
            );
        }
        Err(e) => {
            error!("Workflow automation failed: {}", e);
            log.errors.push(e.to_string());
            log.status = JobRunStatus::Failed;
        }
    }

    let completed_at = Utc::now();
    log.completed_at = Some(completed_at);
    log.duration_ms = Some((completed_at - started_at).num_milliseconds());
    log
}

async fn push_log(logs: &RwLock<VecDeque<JobExecutionLog>>, log: JobExecutionLog, capacity: usize) {
    let mut logs = logs.write().await;
    logs.push_back(log);
    while logs.len() > capacity {
        logs.pop_front();
    }
}

pub struct JobScheduler {
    scheduler: TokioScheduler,
    engine: Arc<WorkflowEngine>,
    config: JobConfig,
    execution_logs: Arc<RwLock<VecDeque<JobExecutionLog>>>,
    cancel: CancellationToken,
}

impl JobScheduler {
    pub async fn new(engine: Arc<WorkflowEngine>, config: JobConfig) -> JobResult<Self> {
        let scheduler = TokioScheduler::new().await?;

        Ok(Self {
            scheduler,
            engine,
            config,
            execution_logs: Arc::new(RwLock::new(VecDeque::new())),
            cancel: CancellationToken::new(),
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        info!("Starting background job scheduler");

        if self.config.workflow_automation_enabled {
            self.schedule_workflow_automation().await?;
        } else {
            info!("Workflow automation is disabled, not scheduling it");
        }

        self.scheduler.start().await?;

        info!("Background job scheduler started successfully");
        Ok(())
    }

    /// Stops the cron loop and cancels any bulk run in progress between jobs
    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down background job scheduler");
        self.cancel.cancel();
        self.scheduler.shutdown().await?;
        Ok(())
    }

    async fn schedule_workflow_automation(&self) -> JobResult<()> {
        let cron_expr = self.config.workflow_cron.clone();

        let engine = self.engine.clone();
        let config = self.config.clone();
        let logs = self.execution_logs.clone();
        let cancel = self.cancel.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let engine = engine.clone();
            let config = config.clone();
            let logs = logs.clone();
            let cancel = cancel.clone();

            Box::pin(async move {
                let log = run_workflow_automation(&engine, &config, &cancel).await;
                push_log(&logs, log, config.execution_log_capacity).await;
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled workflow automation with cron '{}'", cron_expr);

        Ok(())
    }

    pub async fn get_execution_logs(&self) -> Vec<JobExecutionLog> {
        self.execution_logs.read().await.iter().cloned().collect()
    }

    pub async fn run_job_now(&self, job_name: &str) -> JobResult<JobExecutionLog> {
        match job_name {
            WORKFLOW_AUTOMATION_JOB => {
                let log = run_workflow_automation(&self.engine, &self.config, &self.cancel).await;
                push_log(&self.execution_logs, log.clone(), self.config.execution_log_capacity).await;
                Ok(log)
            }
            _ => Err(JobError::ConfigError(format!("Unknown job: {}", job_name))),
        }
    }
}
