pub mod api;
pub mod config;
pub mod llm;
pub mod notes;
pub mod pipeline;
pub mod session_registry;
pub mod sources;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::api::{start_server, ApiContext, ServerError};
use crate::config::{AppConfig, ConfigError};
use crate::llm::OpenRouterClient;
use crate::pipeline::NoteOrchestrator;
use crate::session_registry::SessionRegistry;
use crate::sources::DirectorySource;

/// Fatal startup/runtime errors for the sidecar binary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

/// Run the sidecar until Ctrl-C.
pub async fn run() -> Result<(), AppError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = AppConfig::from_env()?;
    if config.api_key.is_none() {
        tracing::warn!("OPENROUTER_API_KEY is not set; generations will fail");
    }
    tracing::info!(
        source_dir = %config.source_dir.display(),
        model = %config.model,
        "Configuration loaded"
    );

    let registry = Arc::new(SessionRegistry::new());
    let orchestrator = Arc::new(NoteOrchestrator::new(
        Arc::clone(&registry),
        Arc::new(OpenRouterClient::from_config(&config)),
        Arc::new(DirectorySource::new(config.source_dir.clone())),
    ));
    let ctx = ApiContext::new(orchestrator, config.allowed_origins.clone());

    let server = start_server(ctx, config.bind_addr()).await?;
    // The desktop shell reads the bound port from stdout.
    println!("PORT:{}", server.port());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    registry.shutdown().await;
    server.stop().await;
    Ok(())
}
