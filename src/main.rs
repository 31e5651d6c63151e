//! DVF Analytics Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - DVF_HOST: Bind address (default: 0.0.0.0)
//! - DVF_PORT: Port number (default: 8080)
//! - RUST_LOG: Log level (default: dvf_analytics=info,tower_http=info)
//!
//! Storage:
//! - DATABASE_URL: Postgres connection string. When unset the server runs on an
//!   in-memory table, optionally seeded from DVF_SEED_FILE (JSON array of transactions)
//! - DVF_DB_MAX_CONNECTIONS: Pool size (default: 10)
//! - DVF_DB_ACQUIRE_TIMEOUT_SECS: Pool acquire timeout (default: 10)
//!
//! Assistant (disabled unless DVF_LLM_BASE_URL is set):
//! - DVF_LLM_BASE_URL: OpenAI-compatible API base, e.g. https://api.openai.com/v1
//! - DVF_LLM_API_KEY: Bearer token
//! - DVF_LLM_MODEL: Model name (default: gpt-4o-mini)
//! - DVF_LLM_TIMEOUT_SECS: Request timeout (default: 30)

use std::sync::Arc;

use dvf_analytics::api::{run_server, AppState, ServerConfig};
use dvf_analytics::assistant::{Assistant, LlmConfig};
use dvf_analytics::executor::{MemoryExecutor, PgExecutor, PlanExecutor, PoolConfig};
use dvf_analytics::Transaction;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dvf_analytics=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    tracing::info!("DVF analytics configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);

    let executor: Arc<dyn PlanExecutor> = match PoolConfig::from_env() {
        Some(pool_config) => {
            tracing::info!(
                "  Storage: postgres (max {} connections)",
                pool_config.max_connections
            );
            Arc::new(PgExecutor::connect(&pool_config).await?)
        }
        None => {
            let executor = MemoryExecutor::new();
            if let Ok(path) = std::env::var("DVF_SEED_FILE") {
                let inserted = executor.insert_batch(Transaction::load_json(&path)?);
                tracing::info!("  Storage: in-memory, {} transactions from {}", inserted, path);
            } else {
                tracing::warn!("  Storage: in-memory and empty (set DATABASE_URL or DVF_SEED_FILE)");
            }
            Arc::new(executor)
        }
    };

    let mut state = AppState::new(executor);
    match LlmConfig::from_env() {
        Some(llm_config) => {
            let assistant = Assistant::from_config(llm_config)?;
            tracing::info!("  Assistant: enabled (model {})", assistant.model());
            state = state.with_assistant(assistant);
        }
        None => tracing::info!("  Assistant: DISABLED (DVF_LLM_BASE_URL unset)"),
    }

    run_server(config, state).await
}
