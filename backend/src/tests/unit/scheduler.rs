// Unit tests for the scheduled workflow trigger

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::jobs::scheduler::{run_workflow_automation, WORKFLOW_AUTOMATION_JOB};
use crate::jobs::{JobConfig, JobError, JobRunStatus, JobScheduler};
use crate::tests::fixtures::JobFixture;
use crate::tests::helpers::{
    init_test_logging, test_rule, AlwaysFires, FailingForJobStore, FakeJobState, RecordingDispatcher,
};
use crate::workflows::action_log::{ActionLogStore, InMemoryActionLogStore};
use crate::workflows::{RuleRegistry, WorkflowEngine};

fn engine(state: Arc<FakeJobState>, store: Arc<dyn ActionLogStore>) -> WorkflowEngine {
    let registry = RuleRegistry::from_rules(vec![test_rule("daily_check", 1, AlwaysFires::new())]).unwrap();
    WorkflowEngine::new(registry, state, store, Arc::new(RecordingDispatcher::new()))
}

#[cfg(test)]
mod scheduled_run_tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_flag_skips_without_logging() {
        let state = Arc::new(FakeJobState::new());
        state.add_job(JobFixture::new().build());
        let store = InMemoryActionLogStore::new();
        let engine = engine(state, Arc::new(store.clone()));
        let config = JobConfig {
            workflow_automation_enabled: false,
            ..JobConfig::default()
        };

        let log = run_workflow_automation(&engine, &config, &CancellationToken::new()).await;

        assert_eq!(log.status, JobRunStatus::Skipped);
        assert_eq!(log.items_processed, 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_enabled_run_processes_active_jobs() {
        init_test_logging();
        let state = Arc::new(FakeJobState::new());
        state.add_job(JobFixture::new().build());
        state.add_job(JobFixture::new().build());
        let store = InMemoryActionLogStore::new();
        let engine = engine(state, Arc::new(store.clone()));

        let log = run_workflow_automation(&engine, &JobConfig::default(), &CancellationToken::new()).await;

        assert_eq!(log.status, JobRunStatus::Completed);
        assert_eq!(log.job_name, WORKFLOW_AUTOMATION_JOB);
        assert_eq!(log.items_processed, 2);
        assert_eq!(log.actions_fired, 2);
        assert!(log.completed_at.is_some());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_job_marks_partial_failure() {
        let state = Arc::new(FakeJobState::new());
        let healthy = JobFixture::new().build();
        let broken = JobFixture::new().build();
        let broken_id = broken.id;
        state.add_job(healthy);
        state.add_job(broken);
        let store = FailingForJobStore {
            inner: InMemoryActionLogStore::new(),
            job_id: broken_id,
        };
        let engine = engine(state, Arc::new(store));

        let log = run_workflow_automation(&engine, &JobConfig::default(), &CancellationToken::new()).await;

        assert_eq!(log.status, JobRunStatus::PartialFailure);
        assert_eq!(log.items_processed, 2);
        assert_eq!(log.actions_fired, 1);
        assert_eq!(log.errors.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_manual_trigger_records_history() {
        let state = Arc::new(FakeJobState::new());
        state.add_job(JobFixture::new().build());
        let engine = Arc::new(engine(state, Arc::new(InMemoryActionLogStore::new())));
        let scheduler = JobScheduler::new(engine, JobConfig::default()).await.unwrap();

        let log = scheduler.run_job_now(WORKFLOW_AUTOMATION_JOB).await.unwrap();
        assert_eq!(log.actions_fired, 1);
        assert_eq!(scheduler.get_execution_logs().await.len(), 1);

        let err = scheduler.run_job_now("nightly_backup").await.unwrap_err();
        assert!(matches!(err, JobError::ConfigError(_)));
    }
}
