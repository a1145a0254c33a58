use chrono::{DateTime, Utc};
use lib_transit::feed::SessionState;
use lib_transit::BoardState;
use std::sync::Arc;
use tokio::sync::watch;

/// State shared between the upstream feed task and the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub board: BoardState,
    // Mirror of the feed session state; the session only exists after bootstrap
    session_tx: Arc<watch::Sender<SessionState>>,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(board: BoardState) -> Self {
        let (session_tx, _) = watch::channel(SessionState::Idle);
        Self {
            board,
            session_tx: Arc::new(session_tx),
            started_at: Utc::now(),
        }
    }

    pub fn session_state(&self) -> SessionState {
        *self.session_tx.borrow()
    }

    pub fn publish_session(&self, state: SessionState) {
        self.session_tx.send_replace(state);
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
