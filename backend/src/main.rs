use axum::{
    http::Method,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod database;
mod error;
mod handlers;
mod jobs;
mod services;
mod workflows;

pub use error::{ApiError, ApiResult, AppError};

#[cfg(test)]
mod tests;

use services::EmailService;
use workflows::catalog::default_registry;
use workflows::dispatcher::{SmsClient, TaskProviderClient};
use workflows::{PgActionLogStore, PgJobStateReader, ProviderDispatcher, WorkflowEngine};

pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub workflows: Arc<WorkflowEngine>,
    /// Default job cap for on-demand bulk runs
    pub workflow_run_limit: usize,
}

pub fn build_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "SolarOps Workflow API v0.1.0" }))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1/workflows", handlers::workflow_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(app_state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url).await?;

    database::migrate(&db_pool).await?;

    let tasks = match &config.task_provider {
        Some(provider) => Some(TaskProviderClient::new(provider)?),
        None => {
            tracing::warn!("TASK_PROVIDER_URL not set, external tasks and notes will fail");
            None
        }
    };

    let email = if config.smtp.is_configured() {
        match EmailService::new(&config.smtp) {
            Ok(service) => Some(service),
            Err(e) => {
                tracing::warn!("Email service unavailable: {}", e);
                None
            }
        }
    } else {
        tracing::warn!("SMTP not configured, customer emails will not be sent");
        None
    };

    let sms = config
        .sms
        .clone()
        .filter(|sms| sms.is_configured())
        .map(SmsClient::new);

    let dispatcher = ProviderDispatcher::new(db_pool.clone(), tasks, email, sms);
    let registry = default_registry(&config.disabled_rules)?;
    tracing::info!("Loaded {} workflow rules", registry.len());

    let engine = Arc::new(WorkflowEngine::new(
        registry,
        Arc::new(PgJobStateReader::new(db_pool.clone())),
        Arc::new(PgActionLogStore::new(db_pool.clone())),
        Arc::new(dispatcher),
    ));

    let mut scheduler = jobs::JobScheduler::new(engine.clone(), config.jobs.clone()).await?;
    scheduler.start().await?;

    let app_state = Arc::new(AppState {
        db_pool,
        workflows: engine,
        workflow_run_limit: config.jobs.workflow_run_limit,
    });

    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Server running on {}", config.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    scheduler.shutdown().await?;

    Ok(())
}
