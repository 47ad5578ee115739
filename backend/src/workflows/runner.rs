// Workflow Runners - Per-job rule passes and bulk passes over a job population

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solarops_shared::WorkflowActionLog;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::evaluator::RuleEvaluator;
use super::job_state::JobStateReader;
use super::rules::RuleRegistry;
use super::{WorkflowError, WorkflowResult};

/// Chooses which jobs a bulk run visits
#[async_trait]
pub trait JobSelector: Send + Sync {
    async fn select(&self, limit: usize) -> WorkflowResult<Vec<Uuid>>;
}

/// Every non-terminal job, oldest first
pub struct ActiveJobs {
    jobs: Arc<dyn JobStateReader>,
}

impl ActiveJobs {
    pub fn new(jobs: Arc<dyn JobStateReader>) -> Self {
        Self { jobs }
    }
}

#[async_trait]
impl JobSelector for ActiveJobs {
    async fn select(&self, limit: usize) -> WorkflowResult<Vec<Uuid>> {
        self.jobs
            .active_job_ids(limit)
            .await
            .map_err(WorkflowError::State)
    }
}

/// Explicit list of job ids, visited in the given order
pub struct JobList(pub Vec<Uuid>);

#[async_trait]
impl JobSelector for JobList {
    async fn select(&self, limit: usize) -> WorkflowResult<Vec<Uuid>> {
        Ok(self.0.iter().copied().take(limit).collect())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkRunSummary {
    pub processed: usize,
    pub actions: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct JobRunner {
    registry: Arc<RuleRegistry>,
    evaluator: RuleEvaluator,
}

impl JobRunner {
    pub fn new(registry: Arc<RuleRegistry>, evaluator: RuleEvaluator) -> Self {
        Self { registry, evaluator }
    }

    pub async fn run_for_job(&self, job_id: Uuid) -> WorkflowResult<Vec<WorkflowActionLog>> {
        self.run_for_job_at(job_id, Utc::now()).await
    }

    /// Evaluate every rule for the job in registration order.
    ///
    /// A rule whose condition fails is logged and skipped. Action log failures
    /// abort the pass and are returned to the caller.
    pub async fn run_for_job_at(
        &self,
        job_id: Uuid,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Vec<WorkflowActionLog>> {
        let mut actions = Vec::new();

        for rule in self.registry.rules() {
            match self.evaluator.evaluate_at(rule, job_id, now).await {
                Ok(Some(action)) => actions.push(action),
                Ok(None) => {}
                Err(e) if e.is_rule_scoped() => {
                    warn!("Skipping rule '{}' for job {}: {}", rule.key, job_id, e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(actions)
    }
}

#[derive(Clone)]
pub struct BulkRunner {
    job_runner: JobRunner,
}

impl BulkRunner {
    pub fn new(job_runner: JobRunner) -> Self {
        Self { job_runner }
    }

    pub async fn run_for_population(
        &self,
        selector: &dyn JobSelector,
        limit: usize,
    ) -> WorkflowResult<BulkRunSummary> {
        self.run_for_population_with_cancel(selector, limit, &CancellationToken::new())
            .await
    }

    /// Run every selected job sequentially. A failing job is counted and skipped;
    /// only a failed selection aborts the run. Cancellation is checked between jobs.
    pub async fn run_for_population_with_cancel(
        &self,
        selector: &dyn JobSelector,
        limit: usize,
        cancel: &CancellationToken,
    ) -> WorkflowResult<BulkRunSummary> {
        let started = Instant::now();
        let job_ids = selector.select(limit).await?;
        let mut summary = BulkRunSummary::default();

        info!("Workflow bulk run starting: {} job(s) selected (limit {})", job_ids.len(), limit);

        for job_id in job_ids {
            if cancel.is_cancelled() {
                warn!("Workflow bulk run cancelled after {} job(s)", summary.processed);
                break;
            }

            summary.processed += 1;
            match self.job_runner.run_for_job(job_id).await {
                Ok(actions) => summary.actions += actions.len(),
                Err(e) => {
                    summary.failed += 1;
                    error!("Workflow run failed for job {}: {}", job_id, e);
                }
            }
        }

        info!(
            "Workflow bulk run finished in {}ms: {} processed, {} action(s), {} failed",
            started.elapsed().as_millis(),
            summary.processed,
            summary.actions,
            summary.failed
        );

        Ok(summary)
    }
}
