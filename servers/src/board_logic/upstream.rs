use crate::board_logic::config::Config;
use crate::board_logic::state::AppState;
use lib_transit::CatalogStatus;
use lib_transit::error::BootstrapError;
use lib_transit::feed::Session;
use lib_transit::retrieve::{Bootstrap, BootstrapClient};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::timeout;

/// Bootstraps the catalog and credential, then keeps the feed session running
/// until shutdown. A failed bootstrap leaves the board `Unavailable` and the
/// feed unstarted.
pub async fn run(config: Config, app_state: AppState, mut shutdown: broadcast::Receiver<()>) {
    let client = match BootstrapClient::new(config.bootstrap_config()) {
        Ok(client) => client,
        Err(e) => {
            log::error!("Failed to build bootstrap client: {}", e);
            app_state.board.set_catalog(CatalogStatus::Unavailable(e.to_string()));
            return;
        }
    };

    log::info!("Bootstrapping credential and catalog...");
    let bootstrap_timeout = config.bootstrap_timeout();
    let outcome = tokio::select! {
        _ = shutdown.recv() => {
            log::info!("Upstream shutting down during bootstrap.");
            return;
        }
        res = timeout(bootstrap_timeout, client.run()) => {
            res.unwrap_or_else(|_| Err(BootstrapError::Timeout(bootstrap_timeout.as_secs())))
        }
    };

    let Bootstrap { credential, catalog } = match outcome {
        Ok(bootstrap) => bootstrap,
        Err(e) => {
            log::error!("Bootstrap failed: {}", e);
            app_state.board.set_catalog(CatalogStatus::Unavailable(e.to_string()));
            return;
        }
    };

    let catalog = Arc::new(catalog);
    app_state.board.set_catalog(CatalogStatus::Ready(Arc::clone(&catalog)));

    let session = Session::new(config.session_config(credential), catalog, app_state.board.live().clone());
    let mut states = session.subscribe_state();
    session.start();

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Upstream shutting down...");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                app_state.publish_session(state);
            }
        }
    }

    session.stop().await;
    app_state.publish_session(session.state());
}
