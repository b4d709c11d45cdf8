//! ideapad-server - Ideapad backend server
//!
//! Conversation-scoped REST API over a TCP listener.

use anyhow::Context;
use clap::Parser;
use ideapad_core::{InferenceBackend, StubBackend};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;
mod routes;
mod services;
mod state;

use config::{BackendKind, Config};
use services::IdleReaper;
use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "ideapad-server", version, about = "Ideapad backend server")]
struct Cli {
    /// Configuration file (defaults to ~/.ideapad/config.toml)
    #[arg(short, long, env = "IDEAPAD_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:8000
    #[arg(short, long)]
    bind: Option<String>,

    /// Default model for new conversations
    #[arg(short, long)]
    model_path: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("ideapad_server=info".parse()?)
                .add_directive("ideapad_core=info".parse()?),
        )
        .init();

    info!("ideapad-server v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_deref())?.with_overrides(cli.bind, cli.model_path);
    config.validate()?;
    match &config.config_path {
        Some(path) => info!("Config loaded from {:?}", path),
        None => info!("No config file found, using defaults"),
    }

    let backend = build_backend(&config)?;
    let addr = config.bind_addr()?;
    let state = AppState::new(config, backend);

    let reaper = match state.config.session.idle_timeout() {
        Some(idle_timeout) => {
            let reaper = IdleReaper::new(
                Arc::clone(&state.orchestrator),
                idle_timeout,
                state.config.session.reap_interval(),
            );
            reaper.start().await;
            Some(reaper)
        }
        None => None,
    };

    let app = routes::create_router(Arc::clone(&state));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Server listening on http://{}", addr);
    info!(
        "Default model {} via {} backend",
        state.default_sampling().model_path,
        state.orchestrator.backend_name()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");
    if let Some(reaper) = reaper {
        reaper.stop().await;
    }
    let sweep = state.orchestrator.shutdown_all().await;
    if sweep.release_failures > 0 {
        tracing::warn!(
            "{} of {} conversation(s) failed to release on shutdown",
            sweep.release_failures,
            sweep.ended.len()
        );
    }

    Ok(())
}

fn build_backend(config: &Config) -> anyhow::Result<Arc<dyn InferenceBackend>> {
    match config.backend.kind {
        BackendKind::Stub => Ok(Arc::new(StubBackend::new())),
        #[cfg(feature = "http")]
        BackendKind::Http => {
            let backend = ideapad_core::HttpBackend::new(ideapad_core::HttpBackendConfig {
                base_url: config.backend.base_url.clone(),
                api_key: config.backend.api_key.clone(),
                request_timeout: std::time::Duration::from_secs(
                    config.backend.request_timeout_secs,
                ),
            })
            .context("Failed to build HTTP backend client")?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "http"))]
        BackendKind::Http => {
            anyhow::bail!("backend.kind = \"http\" requires the `http` feature")
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
