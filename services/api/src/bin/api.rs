//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, JsonFileAdapter},
    config::{Config, StorageBackend},
    error::ApiError,
    web::{self, middleware::ADMIN_TOKEN_HEADER, rest::ApiDoc, state::AppState},
};
use attendance_core::{AttendanceRepository, InMemoryRepository, LocalClock};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, Method,
};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

async fn open_repository(config: &Config) -> Result<Arc<dyn AttendanceRepository>, ApiError> {
    match &config.storage {
        StorageBackend::Memory => {
            info!("Using in-memory storage; data is lost on restart.");
            Ok(Arc::new(InMemoryRepository::new()))
        }
        StorageBackend::File(path) => {
            info!("Using JSON file storage at {}", path.display());
            Ok(Arc::new(JsonFileAdapter::open(path).await?))
        }
        StorageBackend::Postgres(database_url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = DbAdapter::new(db_pool);
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Ok(Arc::new(db_adapter))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Open Storage ---
    let repo = open_repository(&config).await?;

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        repo,
        config: config.clone(),
        clock: Arc::new(LocalClock),
    });

    // Check-in links are opened from arbitrary phones, so any origin is allowed.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static(ADMIN_TOKEN_HEADER),
        ]);

    // --- 4. Create the Web Router ---
    let app = Router::new()
        .merge(web::router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
