use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use relayd::api;
use relayd::store;
use relayd::AppState;
use relayd::Config;
use relayd::SerialBridge;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Loaded when no `--config` is given and the file exists
const DEFAULT_CONFIG_PATH: &str = "relayd.toml";

#[derive(Debug, Parser)]
#[command(version, about = "Relay command and state server")]
struct Cli {
    /// Config file to load; may be repeated, earlier files win on conflicts
    #[arg(short, long = "config", value_name = "PATH")]
    configs: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Variables may also be set externally, so a missing .env is fine
    let dotenv_path = dotenvy::dotenv().ok();

    let paths = if cli.configs.is_empty() {
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            vec![default]
        } else {
            Vec::new()
        }
    } else {
        cli.configs
    };

    let (mut config, diagnostics) = Config::from_files(&paths)?;
    if !diagnostics.is_empty() {
        eprint!("{}", relayd::format_diagnostics(&diagnostics));
    }
    config.apply_env(|key| std::env::var(key).ok())?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.targets())
        .init();

    tracing::info!("relayd starting");
    for path in &paths {
        tracing::info!("Loaded config from: {}", path.display());
    }
    if let Some(path) = dotenv_path {
        tracing::info!("Loaded environment from: {}", path.display());
    }

    let store = store::connect(&config.storage.url)
        .await
        .context("failed to open state store")?;

    let mut state = AppState::new(store);
    let bridge_task = match config.serial.device.clone() {
        Some(device) => {
            let (bridge, handle) = SerialBridge::spawn(device);
            state = state.with_bridge(bridge);
            Some(handle)
        }
        None => {
            tracing::debug!("No serial device configured, hardware bridge disabled");
            None
        }
    };

    let static_dir = config.server.static_dir.take().filter(|dir| {
        let exists = dir.is_dir();
        if !exists {
            tracing::debug!("Static directory {} not found, not serving files", dir.display());
        }
        exists
    });

    let router = api::create_router(state, static_dir);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let mut server = tokio::spawn(api::serve(
        config.server.listen.clone(),
        config.server.port,
        router,
        shutdown_rx,
    ));

    tracing::info!("Press Ctrl+C to exit");

    tokio::select! {
        result = &mut server => {
            // The server only returns early when it failed to start
            result.context("HTTP server task panicked")??;
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => tracing::info!("Received shutdown signal"),
                Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
            }
        }
    }

    shutdown_tx.send(()).ok();
    server.await.context("HTTP server task panicked")??;

    // The router held the last bridge handle, so the writer drains and exits
    if let Some(handle) = bridge_task {
        handle.await.ok();
    }

    tracing::info!("relayd shutdown complete");

    Ok(())
}
