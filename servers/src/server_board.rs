use anyhow::{Context, Result};
use lib_transit::preferences::{FileStore, KeyValueStore, PreferenceStore, Preferences};
use lib_transit::{BoardState, LiveStore, RouteTable};
use std::sync::Arc;
use tokio::signal;

mod board_logic;
use board_logic::{config, downstream, logger, state, upstream};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config();
    logger::setup_logging(&config.log_dir(), config.log_level())?;

    // An unknown default street is a configuration error
    let routes = RouteTable::builtin();
    routes
        .lookup(config.default_street())
        .with_context(|| format!("Invalid default street '{}'", config.default_street()))?;

    let backend: Arc<dyn KeyValueStore> = match &config.preferences_dir {
        Some(dir) => Arc::new(FileStore::new(dir.clone())),
        None => Arc::new(FileStore::in_config_dir()),
    };
    let defaults = Preferences { street: config.default_street().to_string(), ..Default::default() };
    let preferences = PreferenceStore::with_defaults(backend, defaults);

    let board = BoardState::new(routes, LiveStore::new(), preferences);
    let app_state = state::AppState::new(board);

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let upstream_handle = tokio::spawn(upstream::run(
        config.clone(),
        app_state.clone(),
        shutdown_tx.subscribe(),
    ));

    let downstream_handle = tokio::spawn(downstream::run(
        config.clone(),
        app_state.clone(),
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = terminate() => {
            log::info!("SIGTERM received, initiating shutdown.");
        }
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    // Wait for components to shut down
    let _ = tokio::try_join!(upstream_handle, downstream_handle);

    log::info!("Shutdown complete.");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut term_signal) => {
            term_signal.recv().await;
        }
        Err(e) => {
            log::warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    // On non-unix platforms, just wait forever.
    std::future::pending::<()>().await;
}
