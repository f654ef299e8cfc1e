/// Server setup and initialization
///
/// Wires together storage, registry, engine, SLA monitor, and HTTP routes.
/// Provides the main application factory function for creating the Axum app.

use crate::{
    api::{
        records::RecordAppState,
        workflows::WorkflowAppState,
        {create_record_routes, create_workflow_routes},
    },
    clock::{Clock, SystemClock},
    config::Config,
    notify::{NoopNotifier, Notifier, WebhookNotifier},
    record::store::RecordStore,
    runtime::{actions::ActionExecutor, engine::TransitionEngine, sla::SlaMonitor},
    workflow::{registry::WorkflowRegistry, storage::WorkflowStorage},
};
use anyhow::Result;
use axum::{routing::get, Router};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Create the main Axum application with all routes
///
/// Initializes the database, loads the workflow registry, starts the SLA
/// monitor in the background, and wires the HTTP routes.
pub async fn create_app(config: Config) -> Result<Router> {
    tracing::info!("📁 Ensuring data directory exists: {}", config.database.data_dir);
    std::fs::create_dir_all(&config.database.data_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create data directory: {}", e))?;

    let db_path = Path::new(&config.database.data_dir).join("caseway.db");
    tracing::info!("🗄️ Opening database: {}", db_path.display());
    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;

    tracing::info!("📋 Initializing storage schemas");
    let workflow_storage = WorkflowStorage::new(pool.clone());
    workflow_storage.init_schema().await?;
    let record_store = RecordStore::new(pool);
    record_store.init_schema().await?;

    tracing::info!("📊 Initializing workflow registry");
    let registry = Arc::new(WorkflowRegistry::new(workflow_storage.clone()));
    registry.init_from_storage().await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notifier: Arc<dyn Notifier> = match &config.notify.webhook_url {
        Some(url) => {
            tracing::info!("📣 Notifications go to webhook: {}", url);
            Arc::new(WebhookNotifier::new(url.clone()))
        }
        None => {
            tracing::info!("📣 No notification webhook configured, dropping notifications");
            Arc::new(NoopNotifier)
        }
    };

    tracing::info!("⚙️ Initializing transition engine");
    let actions = ActionExecutor::new(
        record_store.clone(),
        Arc::clone(&notifier),
        Arc::clone(&clock),
    );
    let engine = TransitionEngine::new(
        Arc::clone(&registry),
        record_store.clone(),
        actions,
        Arc::clone(&clock),
    );

    // Start the SLA monitor in the background; the spawned task owns the
    // scheduler handle for the lifetime of the process.
    let monitor = SlaMonitor::new(record_store.clone(), Arc::clone(&notifier), Arc::clone(&clock));
    let schedule = config.sla.scan_schedule.clone();
    tokio::spawn(async move {
        match monitor.start(&schedule).await {
            Ok(_scheduler) => std::future::pending::<()>().await,
            Err(e) => tracing::error!("❌ Failed to start SLA monitor: {}", e),
        }
    });

    let record_state = RecordAppState {
        engine,
        store: record_store,
    };
    let workflow_state = WorkflowAppState {
        storage: workflow_storage,
        registry,
    };

    tracing::info!("📡 Creating HTTP router");
    let app = Router::new()
        .route("/healthz", get(health_check))
        .merge(create_workflow_routes().with_state(workflow_state))
        .merge(create_record_routes().with_state(record_state));

    tracing::info!("✅ Application initialized successfully");
    Ok(app)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting Caseway server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
