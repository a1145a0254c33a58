use crate::board_logic::config::Config;
use crate::board_logic::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use lib_transit::{CatalogStatus, PreferencesPatch};
use serde_json::json;
use std::net::SocketAddr;
use tokio::sync::broadcast;

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/streets", get(streets_handler))
        .route("/streets/{name}", get(street_handler))
        .route("/catalog", get(catalog_handler))
        .route("/live", get(live_handler))
        .route("/board", get(board_handler))
        .route("/preferences", get(preferences_handler).put(update_preferences_handler))
        .route("/session", get(session_handler))
        .with_state(app_state)
}

pub async fn run(config: Config, app_state: AppState, mut shutdown: broadcast::Receiver<()>) {
    let app = router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port()));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };
    log::info!("Downstream server listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.recv().await.ok();
            log::info!("Downstream server shutting down.");
        })
        .await;
    if let Err(e) = served {
        log::error!("Downstream server error: {}", e);
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn streets_handler(State(state): State<AppState>) -> impl IntoResponse {
    let names = state.board.routes().street_names();
    // Selector layout: two streets per row
    let rows: Vec<Vec<&str>> = names.chunks(2).map(|row| row.to_vec()).collect();
    Json(json!({ "streets": names, "rows": rows }))
}

async fn street_handler(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.board.get_street(&name) {
        Ok(street) => Json(street.clone()).into_response(),
        Err(e) => (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

async fn catalog_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = match state.board.get_catalog() {
        CatalogStatus::Loading => json!({ "status": "loading" }),
        CatalogStatus::Unavailable(reason) => json!({ "status": "unavailable", "reason": reason }),
        CatalogStatus::Ready(catalog) => json!({
            "status": "ready",
            "stops": catalog.stops,
            "vehicles": catalog.vehicles,
        }),
    };
    Json(body)
}

async fn live_handler(State(state): State<AppState>) -> impl IntoResponse {
    let live = state.board.get_live_state();
    Json(json!({ "count": live.len(), "vehicles": &*live }))
}

async fn board_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.board.board())
}

async fn preferences_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.board.preferences())
}

async fn update_preferences_handler(
    State(state): State<AppState>,
    Json(patch): Json<PreferencesPatch>,
) -> Response {
    match state.board.set_preferences(patch) {
        Ok(prefs) => {
            log::info!("Preferences updated: {:?}", prefs);
            Json(prefs).into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

async fn session_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "state": state.session_state(),
        "vehicles": state.board.get_live_state().len(),
        "startedAt": state.started_at(),
    }))
}
