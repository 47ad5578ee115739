// Workflow Automation Engine
//
// Condition -> action rules evaluated per job, deduplicated by a per-rule cooldown,
// run for single jobs or in bulk, with every firing appended to the action log.
//
// Overlapping runs are not mutually exclusive: two runs that read the log before
// either appends can both fire the same rule for the same job inside its cooldown.

pub mod action_log;
pub mod catalog;
pub mod dispatcher;
pub mod engine;
pub mod evaluator;
pub mod job_state;
pub mod rules;
pub mod runner;

use thiserror::Error;
use uuid::Uuid;

pub use action_log::{ActionLogFilter, ActionLogStore, InMemoryActionLogStore, PgActionLogStore};
pub use dispatcher::{CustomerMessage, ExternalEffectDispatcher, ProviderDispatcher};
pub use engine::WorkflowEngine;
pub use evaluator::RuleEvaluator;
pub use job_state::{JobStateReader, PgJobStateReader};
pub use rules::{Effect, RuleCondition, RuleContext, RuleMatch, RuleRegistry, WorkflowRule};
pub use runner::{ActiveJobs, BulkRunSummary, BulkRunner, JobList, JobRunner, JobSelector};

use action_log::StoreError;
use job_state::StateError;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Rule '{rule_key}' failed for job {job_id}: {source}")]
    Condition {
        rule_key: String,
        job_id: Uuid,
        #[source]
        source: StateError,
    },
    #[error("Action log error: {0}")]
    Store(#[from] StoreError),
    #[error("Job state unavailable: {0}")]
    State(#[source] StateError),
    #[error("Job {0} not found")]
    JobNotFound(Uuid),
}

impl WorkflowError {
    /// Errors confined to a single rule; the rest of the job pass continues
    pub fn is_rule_scoped(&self) -> bool {
        matches!(self, Self::Condition { .. })
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
