// Workflow Engine - Wires the registry, evaluator and runners behind one handle

use solarops_shared::{RuleDescriptor, WorkflowActionLog};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::action_log::{ActionLogFilter, ActionLogStore};
use super::dispatcher::ExternalEffectDispatcher;
use super::evaluator::RuleEvaluator;
use super::job_state::{JobStateReader, StateError};
use super::rules::RuleRegistry;
use super::runner::{ActiveJobs, BulkRunSummary, BulkRunner, JobRunner};
use super::{WorkflowError, WorkflowResult};

pub struct WorkflowEngine {
    registry: Arc<RuleRegistry>,
    jobs: Arc<dyn JobStateReader>,
    log_store: Arc<dyn ActionLogStore>,
    job_runner: JobRunner,
    bulk_runner: BulkRunner,
}

impl WorkflowEngine {
    pub fn new(
        registry: RuleRegistry,
        jobs: Arc<dyn JobStateReader>,
        log_store: Arc<dyn ActionLogStore>,
        dispatcher: Arc<dyn ExternalEffectDispatcher>,
    ) -> Self {
        let registry = Arc::new(registry);
        let evaluator = RuleEvaluator::new(jobs.clone(), log_store.clone(), dispatcher);
        let job_runner = JobRunner::new(registry.clone(), evaluator);
        let bulk_runner = BulkRunner::new(job_runner.clone());

        Self {
            registry,
            jobs,
            log_store,
            job_runner,
            bulk_runner,
        }
    }

    pub fn list_rules(&self) -> Vec<RuleDescriptor> {
        self.registry.list_all()
    }

    pub async fn recent_logs(&self, filter: &ActionLogFilter) -> WorkflowResult<Vec<WorkflowActionLog>> {
        Ok(self.log_store.recent(filter).await?)
    }

    /// Manual single-job run. Unknown jobs are reported instead of silently yielding nothing.
    pub async fn run_for_job(&self, job_id: Uuid) -> WorkflowResult<Vec<WorkflowActionLog>> {
        match self.jobs.job(job_id).await {
            Ok(_) => {}
            Err(StateError::JobNotFound(id)) => return Err(WorkflowError::JobNotFound(id)),
            Err(e) => return Err(WorkflowError::State(e)),
        }

        self.job_runner.run_for_job(job_id).await
    }

    pub async fn run_all(&self, limit: usize) -> WorkflowResult<BulkRunSummary> {
        self.run_all_with_cancel(limit, &CancellationToken::new()).await
    }

    pub async fn run_all_with_cancel(
        &self,
        limit: usize,
        cancel: &CancellationToken,
    ) -> WorkflowResult<BulkRunSummary> {
        let selector = ActiveJobs::new(self.jobs.clone());
        self.bulk_runner
            .run_for_population_with_cancel(&selector, limit, cancel)
            .await
    }
}
