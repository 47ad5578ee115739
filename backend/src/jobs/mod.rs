// Background Jobs Service
//
// Scheduled background jobs, run by tokio-cron-scheduler.

pub mod scheduler;

pub use scheduler::{JobConfig, JobError, JobExecutionLog, JobResult, JobRunStatus, JobScheduler};
