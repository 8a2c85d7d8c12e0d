//! Scene Composer (cdeck-sc) - Main entry point
//!
//! Wires the configuration, renderer, worker pool, registry sweeper, and
//! HTTP server together and runs until a shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cdeck_sc::api::{self, AppContext};
use cdeck_sc::config::Config;
use cdeck_sc::fetch::AssetFetcher;
use cdeck_sc::notify::Notifier;
use cdeck_sc::pipeline::{start_workers, PipelineContext};
use cdeck_sc::publish::HttpObjectStore;
use cdeck_sc::registry::{spawn_sweeper, JobRegistry};
use cdeck_sc::render::ffmpeg::FfmpegRenderer;

/// Command-line arguments for cdeck-sc
#[derive(Parser, Debug)]
#[command(name = "cdeck-sc")]
#[command(about = "Scene composition microservice for Clipdeck")]
#[command(version)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CDECK_SC_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config file)
    #[arg(short, long, env = "CDECK_SC_PORT")]
    port: Option<u16>,

    /// Bearer shared secret (overrides config file)
    #[arg(long, env = "CDECK_SC_SECRET")]
    secret: Option<String>,

    /// Scratch directory root (overrides config file)
    #[arg(long, env = "CDECK_SC_SCRATCH")]
    scratch: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cdeck_sc=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(secret) = args.secret {
        config.shared_secret = secret;
    }
    if let Some(scratch) = args.scratch {
        config.scratch_root = scratch;
    }

    info!("Starting Clipdeck Scene Composer on port {}", config.port);
    info!("Scratch root: {}", config.scratch_root.display());

    std::fs::create_dir_all(&config.scratch_root).context("Failed to create scratch root")?;

    // Fail at startup if the renderer binary is unusable
    let renderer = FfmpegRenderer::new(config.ffmpeg_bin.clone());
    renderer
        .probe()
        .await
        .context("Renderer binary check failed")?;

    let registry = Arc::new(JobRegistry::new());
    spawn_sweeper(
        Arc::clone(&registry),
        std::time::Duration::from_secs(config.sweep_interval_secs),
        chrono::Duration::seconds(config.retention_secs as i64),
    );

    let store = HttpObjectStore::new(
        config.storage_base_url.clone(),
        config.storage_public_url.clone(),
    )
    .context("Failed to initialize object store")?;

    let ctx = Arc::new(PipelineContext {
        registry: Arc::clone(&registry),
        renderer: Arc::new(renderer),
        store: Arc::new(store),
        fetcher: AssetFetcher::new(std::time::Duration::from_secs(config.fetch_timeout_secs))
            .context("Failed to initialize asset fetcher")?,
        notifier: Notifier::new(
            config.notify_attempts,
            cdeck_common::time::millis_to_duration(config.notify_backoff_ms),
            std::time::Duration::from_secs(config.notify_timeout_secs),
        )
        .context("Failed to initialize notifier")?,
        scratch_root: config.scratch_root.clone(),
    });

    let queue = start_workers(ctx, config.workers, config.queue_capacity);

    let app_ctx = AppContext { registry, queue };
    api::server::run(config.port, app_ctx, config.shared_secret, shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
