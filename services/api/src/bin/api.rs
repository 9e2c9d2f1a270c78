//! services/api/src/bin/api.rs

use market_api_lib::{
    adapters::{DbAdapter, InMemoryChatStore, InMemoryUserDirectory},
    app::api_router,
    config::Config,
    error::ApiError,
    web::{rest::ApiDoc, state::AppState},
};
use market_chat_core::ports::{ChatHistoryStore, UserDirectory};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
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

    // --- 2. Connect to Database & Run Migrations ---
    let (store, users): (Arc<dyn ChatHistoryStore>, Arc<dyn UserDirectory>) =
        match config.database_url.as_deref() {
            Some(database_url) => {
                info!("Connecting to database...");
                let db_pool = PgPoolOptions::new()
                    .max_connections(config.db_max_connections)
                    .connect(database_url)
                    .await?;
                let db_adapter = Arc::new(DbAdapter::new(db_pool));
                info!("Running database migrations...");
                db_adapter.run_migrations().await?;
                info!("Database migrations complete.");
                let store: Arc<dyn ChatHistoryStore> = db_adapter.clone();
                let users: Arc<dyn UserDirectory> = db_adapter;
                (store, users)
            }
            None => {
                warn!("DATABASE_URL is not set; chat history is kept in memory and no accounts can log in");
                let store: Arc<dyn ChatHistoryStore> = Arc::new(InMemoryChatStore::new());
                let users: Arc<dyn UserDirectory> = Arc::new(InMemoryUserDirectory::default());
                (store, users)
            }
        };

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(config.clone(), store, users));

    // --- 4. Create the Web Router ---
    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router(app_state))
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
