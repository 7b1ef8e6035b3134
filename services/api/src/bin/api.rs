//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, FsImageStore, LogNotifier, OpenAiVisionDetector},
    config::Config,
    error::ApiError,
    web::{
        router,
        state::{AppState, SessionRegistry},
        ApiDoc,
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{header::{ACCEPT, CONTENT_TYPE}, HeaderValue, Method};
use axum::Router;
use dumpster_core::{identity::OrganizationDirectory, service::ReportService};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Open the Database & Run Migrations ---
    info!("Opening database at {}...", config.database_url);
    let db_adapter = Arc::new(DbAdapter::connect(&config.database_url, 5).await?);
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let openai_config = OpenAIConfig::new().with_api_key(config.require_openai_api_key()?);
    let detector = Arc::new(OpenAiVisionDetector::new(
        Client::with_config(openai_config),
        config.vision_model.clone(),
        config.detection_labels.clone(),
    ));
    let images = Arc::new(FsImageStore::new(config.upload_dir.clone()).await?);
    info!("Storing annotated images in {}", images.root().display());
    let notifier = Arc::new(LogNotifier);

    let directory = OrganizationDirectory::new(config.org_credentials.clone());
    if directory.is_empty() {
        warn!("ORG_CREDENTIALS is empty: no organization will be able to log in.");
    } else {
        info!("{} organization account(s) configured.", directory.len());
    }

    // --- 4. Build the Shared AppState ---
    let reports = ReportService::new(db_adapter, detector, images, notifier)
        .with_upload_watchers(config.upload_watchers.clone());
    let app_state = Arc::new(AppState {
        reports: Arc::new(reports),
        directory: Arc::new(directory),
        sessions: SessionRegistry::new(config.session_idle_ttl, config.max_sessions),
        config: config.clone(),
    });

    let cors = CorsLayer::new()
        .allow_origin(
            "http://localhost:3000"
                .parse::<HeaderValue>()
                .map_err(|e| ApiError::Internal(e.to_string()))?,
        )
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
