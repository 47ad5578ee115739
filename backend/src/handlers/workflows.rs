//! Workflow Automation Handlers
//!
//! Rule introspection, action log queries and on-demand workflow runs.

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use solarops_shared::{RuleDescriptor, RunAllRequest, RunAllResponse, RunJobResponse, WorkflowActionLog};
use std::sync::Arc;
use uuid::Uuid;

use crate::workflows::action_log::{ActionLogFilter, MAX_LOG_LIMIT};
use crate::{ApiError, ApiResult, AppState};

// ==================== Structs ====================

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub job_id: Option<Uuid>,
    pub rule_key: Option<String>,
    pub limit: Option<usize>,
}

// ==================== Routes ====================

pub fn workflow_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rules", get(list_rules))
        .route("/logs", get(list_logs))
        .route("/jobs/:job_id/run", post(run_job))
        .route("/run-all", post(run_all))
}

// ==================== Handlers ====================

async fn list_rules(State(state): State<Arc<AppState>>) -> Json<Vec<RuleDescriptor>> {
    Json(state.workflows.list_rules())
}

async fn list_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<Vec<WorkflowActionLog>>> {
    if query.limit == Some(0) {
        return Err(ApiError::validation_single("limit", "limit must be at least 1"));
    }

    let filter = ActionLogFilter {
        job_id: query.job_id,
        rule_key: query.rule_key.filter(|k| !k.is_empty()),
        limit: query.limit.map(|l| l.min(MAX_LOG_LIMIT)),
    };

    let logs = state.workflows.recent_logs(&filter).await?;
    Ok(Json(logs))
}

async fn run_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<RunJobResponse>> {
    let actions = state.workflows.run_for_job(job_id).await?;
    Ok(Json(RunJobResponse { job_id, actions }))
}

async fn run_all(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RunAllRequest>>,
) -> ApiResult<Json<RunAllResponse>> {
    let limit = body
        .and_then(|Json(req)| req.limit)
        .unwrap_or(state.workflow_run_limit);
    if limit == 0 {
        return Err(ApiError::validation_single("limit", "limit must be at least 1"));
    }

    let summary = state.workflows.run_all(limit).await?;
    Ok(Json(RunAllResponse {
        processed: summary.processed,
        actions: summary.actions,
        failed: summary.failed,
    }))
}
