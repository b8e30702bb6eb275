/// Server setup and initialization
///
/// Wires together all components: database, catalog registry, accounts,
/// notification dispatcher, enrollment engine and HTTP routes.
/// Provides the application factory used by `main` and by the router tests.

use crate::{
    accounts::{AccountService, AccountStorage},
    api::{create_api_routes, AppState},
    catalog::{CatalogRegistry, CourseStorage},
    config::Config,
    database::Database,
    enrollment::{EnrollmentEngine, WorkflowStorage},
    notify::Dispatcher,
    reports::ReportService,
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Create the main Axum application with all routes and middleware
///
/// Notifications go to the configured webhook, or to the log when none is set.
pub async fn create_app(config: Config) -> Result<Router> {
    let dispatcher = Dispatcher::from_webhook_url(config.notify.webhook_url.as_deref())?;
    build_app(config, dispatcher).await
}

/// Build the application around an explicit notification dispatcher
pub async fn build_app(config: Config, dispatcher: Dispatcher) -> Result<Router> {
    tracing::info!("🗄️ Connecting to database");
    let database = Database::connect(&config.database.url).await?;
    let pool = database.pool().clone();

    tracing::info!("📊 Initializing course catalog registry");
    let catalog = Arc::new(CatalogRegistry::new(CourseStorage::new(pool.clone())));
    catalog
        .init_from_storage()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load courses from storage: {}", e))?;

    tracing::info!("🔐 Initializing account service");
    let accounts = AccountService::new(AccountStorage::new(pool.clone()), dispatcher.clone(), config.auth.clone());
    if let (Some(email), Some(password)) = (&config.auth.admin_email, &config.auth.admin_password) {
        accounts
            .ensure_admin(email, password, &config.auth.admin_name)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bootstrap admin account: {}", e))?;
    }

    tracing::info!("🚀 Initializing enrollment engine");
    let engine = Arc::new(EnrollmentEngine::new(
        WorkflowStorage::new(pool.clone()),
        Arc::clone(&catalog),
        dispatcher,
        config.workflow.clone(),
    ));

    let app_state = AppState {
        catalog,
        accounts,
        engine,
        reports: ReportService::new(pool),
    };

    // Browser front-end is served from another origin
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    tracing::info!("📡 Creating HTTP router with all endpoints");
    let app = Router::new()
        .route("/healthz", get(health_check))
        .nest("/api", create_api_routes().with_state(app_state))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    tracing::info!("✅ Application initialized successfully");

    Ok(app)
}

/// Start the HTTP server with the given configuration
///
/// Creates the application and starts the Axum server on the configured address and port.
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,academy=debug,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true),
        )
        .init();

    tracing::info!("Starting academy server...");

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
