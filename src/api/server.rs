use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    aggregate, ask_assistant, compute, health_check, list_columns, list_tools, query, AppState,
};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// DVF_HOST=0.0.0.0
    /// DVF_PORT=8080
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("DVF_HOST").unwrap_or(defaults.host),
            port: std::env::var("DVF_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Catalogue
        .route("/columns", get(list_columns))
        .route("/tools", get(list_tools))
        // Plans
        .route("/query", post(query))
        .route("/aggregate", post(aggregate))
        .route("/compute", post(compute))
        .route("/assistant", post(ask_assistant))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server until CTRL+C
pub async fn run_server(config: ServerConfig, state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting DVF analytics server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("DVF analytics server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
