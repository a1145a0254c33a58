//! # Feed Session
//!
//! One long-lived connection to the live feed, driven by a single reactor
//! task:
//!
//! ```text
//! Idle -> Authenticating -> Subscribed -> Receiving
//!   ^            |              |             |
//!   +------------+--------------+-------------+   (drop, error, silence)
//!
//! any state -> Closed                              (stop)
//! ```
//!
//! Each connection attempt opens the websocket, waits for the Engine.IO open
//! packet and the Socket.IO connect packet, authenticates, joins one topic per
//! configured line and then folds every matching envelope into the shared
//! [`LiveStore`]. Dropped connections are retried with [`Backoff`]; the live
//! state is cleared whenever a fresh connection authenticates.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::backoff::Backoff;
use super::codec::{self, EnginePacket, Handshake, SocketPacket};
use super::protocol::{self, Demultiplexer};
use crate::catalog::Catalog;
use crate::error::FeedError;
use crate::reconciler::LiveStore;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;

const MIN_PING_PERIOD: Duration = Duration::from_millis(1);
const MAX_HEARTBEAT: Duration = Duration::from_secs(24 * 60 * 60);

/// Uptime after which a connection that never delivered an envelope still
/// clears the failure count.
const STABLE_UPTIME: Duration = Duration::from_secs(30);

/// Default feed host.
pub const DEFAULT_ENDPOINT: &str = "https://www.bustime.ru/";

/// Default topic namespace.
pub const DEFAULT_NAMESPACE: &str = "ru.bustime";

/// Lines subscribed when none are configured.
pub const DEFAULT_LINE_IDS: [&str; 6] = ["2227", "2228", "2229", "2230", "2246", "3465"];

/// Connection parameters of a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// `http(s)://` or `ws(s)://` URL of the feed host.
    pub endpoint: String,
    pub namespace: String,
    pub line_ids: Vec<String>,
    /// Sent as the `username` of the authentication event.
    pub credential: String,
    /// Bound on connect plus the open and connect packets.
    pub handshake_timeout: Duration,
    /// Silence that counts as a dropped connection when the server announced
    /// no heartbeat.
    pub silent_timeout: Duration,
    pub backoff: Backoff,
    /// `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
}

impl SessionConfig {
    pub fn new(credential: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            line_ids: DEFAULT_LINE_IDS.iter().map(|id| id.to_string()).collect(),
            credential: credential.into(),
            handshake_timeout: Duration::from_secs(15),
            silent_timeout: Duration::from_secs(60),
            backoff: Backoff::default(),
            max_reconnect_attempts: None,
        }
    }

    /// Topics joined after authentication, one per line id.
    pub fn topics(&self) -> Vec<String> {
        self.line_ids.iter().map(|id| protocol::topic_for(&self.namespace, id)).collect()
    }
}

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Authenticating,
    Subscribed,
    Receiving,
    Closed,
}

/// Builds the Engine.IO v3 websocket URL for `endpoint`.
///
/// An empty path becomes `/socket.io/`; `EIO=3&transport=websocket` is
/// appended to the query.
pub fn socket_url(endpoint: &str) -> Result<Url, FeedError> {
    let invalid = || FeedError::InvalidEndpoint(endpoint.to_string());
    let mut url = Url::parse(endpoint).map_err(|_| invalid())?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(invalid()),
    };
    url.set_scheme(scheme).map_err(|_| invalid())?;

    if url.path().is_empty() || url.path() == "/" {
        url.set_path("/socket.io/");
    }
    url.query_pairs_mut().append_pair("EIO", "3").append_pair("transport", "websocket");
    Ok(url)
}

/// Handle on the reactor task.
pub struct Session {
    config: Arc<SessionConfig>,
    catalog: Arc<Catalog>,
    live: LiveStore,
    state: Arc<watch::Sender<SessionState>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn new(config: SessionConfig, catalog: Arc<Catalog>, live: LiveStore) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            config: Arc::new(config),
            catalog,
            live,
            state: Arc::new(state),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver notified on every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn live(&self) -> &LiveStore {
        &self.live
    }

    /// Spawns the reactor. Does nothing if it is already running or the
    /// session was stopped.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() || self.cancel.is_cancelled() {
            log::debug!("Session already started or closed; ignoring start");
            return;
        }

        let reactor = Reactor {
            config: Arc::clone(&self.config),
            catalog: Arc::clone(&self.catalog),
            live: self.live.clone(),
            state: Arc::clone(&self.state),
            cancel: self.cancel.clone(),
            demux: Demultiplexer::new(&self.config.namespace),
        };
        *task = Some(tokio::spawn(reactor.run()));
    }

    /// Cancels the reactor, waits for it to close the socket and clears the
    /// live state. The session ends in `Closed` and cannot be restarted.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::error!("Feed reactor ended abnormally: {}", e);
            }
        }

        self.live.reset();
        self.state.send_replace(SessionState::Closed);
        log::info!("Feed session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// How one connection attempt ended.
enum Outcome {
    Stopped,
    /// `healthy` is set once the connection delivered an envelope or stayed up
    /// past one silence window and `STABLE_UPTIME`; only then is the failure
    /// count cleared.
    Dropped { healthy: bool, reason: FeedError },
}

struct Reactor {
    config: Arc<SessionConfig>,
    catalog: Arc<Catalog>,
    live: LiveStore,
    state: Arc<watch::Sender<SessionState>>,
    cancel: CancellationToken,
    demux: Demultiplexer,
}

impl Reactor {
    async fn run(self) {
        let mut failures: u32 = 0;

        loop {
            match self.connection().await {
                Outcome::Stopped => break,
                Outcome::Dropped { healthy, reason } => {
                    self.transition(SessionState::Idle);
                    if healthy {
                        failures = 0;
                    }

                    if let Some(max) = self.config.max_reconnect_attempts {
                        if failures >= max {
                            log::error!("Feed unreachable after {} reconnect attempts ({}); giving up", failures, reason);
                            break;
                        }
                    }

                    let delay = self.config.backoff.delay(failures);
                    failures = failures.saturating_add(1);
                    log::warn!("Feed connection lost ({}). Reconnecting in {}ms...", reason, delay.as_millis());

                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.transition(SessionState::Closed);
    }

    fn transition(&self, next: SessionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            log::info!("Feed session state: {:?}", next);
        }
    }

    async fn connection(&self) -> Outcome {
        self.transition(SessionState::Authenticating);

        let url = match socket_url(&self.config.endpoint) {
            Ok(url) => url,
            Err(reason) => return Outcome::Dropped { healthy: false, reason },
        };
        log::info!("Connecting to feed: {}", url);

        let opened = tokio::select! {
            _ = self.cancel.cancelled() => return Outcome::Stopped,
            res = timeout(self.config.handshake_timeout, open(url.as_str())) => res,
        };
        let (ws, handshake) = match opened {
            Ok(Ok(opened)) => opened,
            Ok(Err(reason)) => return Outcome::Dropped { healthy: false, reason },
            Err(_) => {
                let secs = self.config.handshake_timeout.as_secs();
                return Outcome::Dropped { healthy: false, reason: FeedError::HandshakeTimeout(secs) };
            }
        };

        let (mut write, mut read) = ws.split();
        if let Err(reason) = self.subscribe(&mut write).await {
            return Outcome::Dropped { healthy: false, reason };
        }
        self.live.reset();
        self.transition(SessionState::Subscribed);

        let (ping_every, silence) = heartbeat(handshake.as_ref(), self.config.silent_timeout);
        let mut pinger = tokio::time::interval_at(Instant::now() + ping_every, ping_every);
        let connected_at = Instant::now();
        let mut last_activity = connected_at;
        let mut receiving = false;
        let dropped = |receiving: bool, reason: FeedError| Outcome::Dropped {
            healthy: receiving || connected_at.elapsed() >= silence.max(STABLE_UPTIME),
            reason,
        };

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    log::info!("Feed session stopping...");
                    let _ = write.send(Message::Close(None)).await;
                    return Outcome::Stopped;
                }
                _ = pinger.tick() => {
                    if let Err(e) = write.send(Message::Text(codec::PING.into())).await {
                        return dropped(receiving, FeedError::WebSocket(e.to_string()));
                    }
                }
                // Watchdog for connections that stay open but go quiet
                _ = tokio::time::sleep_until(last_activity + silence) => {
                    return dropped(receiving, FeedError::Silent(silence.as_secs()));
                }
                msg = read.next() => {
                    last_activity = Instant::now();
                    match msg {
                        Some(Ok(Message::Text(text))) => match self.on_frame(text.as_str(), &mut write).await {
                            Ok(routed) => receiving |= routed,
                            Err(reason) => return dropped(receiving, reason),
                        },
                        Some(Ok(Message::Close(_))) | None => return dropped(receiving, FeedError::Closed),
                        Some(Err(e)) => return dropped(receiving, FeedError::WebSocket(e.to_string())),
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }

    async fn subscribe(&self, write: &mut WsWrite) -> Result<(), FeedError> {
        send_text(write, protocol::authentication_frame(&self.config.credential)).await?;
        for topic in self.config.topics() {
            log::debug!("Joining {}", topic);
            send_text(write, protocol::join_frame(&topic)).await?;
        }
        Ok(())
    }

    /// Handles one inbound frame. Returns `true` when it carried a routed
    /// vehicle batch.
    async fn on_frame(&self, frame: &str, write: &mut WsWrite) -> Result<bool, FeedError> {
        let packet = match codec::decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                log::debug!("Skipping undecodable frame ({}): {}", e, frame);
                return Ok(false);
            }
        };

        match packet {
            EnginePacket::Ping(probe) => send_text(write, format!("{}{}", codec::PONG, probe)).await?,
            EnginePacket::Close | EnginePacket::Message(SocketPacket::Disconnect) => return Err(FeedError::Closed),
            EnginePacket::Message(SocketPacket::Error(reason)) => return Err(FeedError::Rejected(reason)),
            EnginePacket::Message(SocketPacket::Event(event)) => {
                if let Some(batch) = self.demux.route(&event, &self.catalog, Utc::now()) {
                    let sightings = batch.len();
                    let vehicles = self.live.apply(batch);
                    log::trace!("Applied {} sightings from {}; {} vehicles tracked", sightings, event.name, vehicles);
                    self.transition(SessionState::Receiving);
                    return Ok(true);
                }
            }
            _ => {}
        }
        Ok(false)
    }
}

/// Ping period and silence limit for one connection: the handshake's
/// `pingInterval` and `pingInterval + pingTimeout`, or half of and all of
/// `silent_timeout` when the server announced none. Both are clamped to
/// `MAX_HEARTBEAT` and the period is at least one millisecond.
fn heartbeat(handshake: Option<&Handshake>, silent_timeout: Duration) -> (Duration, Duration) {
    let (ping_every, silence) = match handshake {
        Some(hs) if hs.ping_interval > 0 => (
            Duration::from_millis(hs.ping_interval),
            Duration::from_millis(hs.ping_interval.saturating_add(hs.ping_timeout)),
        ),
        _ => (silent_timeout / 2, silent_timeout),
    };
    (ping_every.clamp(MIN_PING_PERIOD, MAX_HEARTBEAT), silence.min(MAX_HEARTBEAT))
}

async fn send_text(write: &mut WsWrite, frame: String) -> Result<(), FeedError> {
    write.send(Message::Text(frame.into())).await.map_err(|e| FeedError::WebSocket(e.to_string()))
}

/// Connects and reads until the Socket.IO connect packet, answering pings on
/// the way. Returns the Engine.IO handshake if the server sent one.
async fn open(url: &str) -> Result<(WsStream, Option<Handshake>), FeedError> {
    let (mut ws, _) = connect_async(url).await.map_err(|e| FeedError::WebSocket(e.to_string()))?;
    let mut handshake = None;

    loop {
        let frame = match ws.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => return Err(FeedError::Closed),
            Some(Err(e)) => return Err(FeedError::WebSocket(e.to_string())),
            Some(Ok(_)) => continue,
        };

        match codec::decode(frame.as_str()) {
            Ok(EnginePacket::Open(hs)) => {
                log::debug!("Engine.IO open: sid={} pingInterval={}ms", hs.sid, hs.ping_interval);
                handshake = Some(hs);
            }
            Ok(EnginePacket::Ping(probe)) => {
                let pong = format!("{}{}", codec::PONG, probe);
                ws.send(Message::Text(pong.into())).await.map_err(|e| FeedError::WebSocket(e.to_string()))?;
            }
            Ok(EnginePacket::Message(SocketPacket::Connect)) => return Ok((ws, handshake)),
            Ok(EnginePacket::Message(SocketPacket::Error(reason))) => return Err(FeedError::Rejected(reason)),
            Ok(EnginePacket::Close) | Ok(EnginePacket::Message(SocketPacket::Disconnect)) => {
                return Err(FeedError::Closed)
            }
            Ok(other) => log::trace!("Ignoring {:?} during handshake", other),
            Err(e) => log::debug!("Skipping undecodable handshake frame ({}): {}", e, frame.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_socket_url_from_http_endpoint() {
        let url = socket_url("https://www.bustime.ru/").unwrap();
        assert_eq!(url.as_str(), "wss://www.bustime.ru/socket.io/?EIO=3&transport=websocket");

        let url = socket_url("ws://127.0.0.1:9000/feed/").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:9000/feed/?EIO=3&transport=websocket");
    }

    #[test]
    fn test_socket_url_rejects_other_schemes() {
        assert!(matches!(socket_url("ftp://example.com"), Err(FeedError::InvalidEndpoint(_))));
        assert!(matches!(socket_url("not a url"), Err(FeedError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_default_topics() {
        let config = SessionConfig::new("cred");
        let topics = config.topics();
        assert_eq!(topics.len(), 6);
        assert_eq!(topics[0], "ru.bustime.bus_mode1__2227");
        assert_eq!(topics[5], "ru.bustime.bus_mode1__3465");
    }

    fn handshake(ping_interval: u64, ping_timeout: u64) -> Handshake {
        Handshake { sid: "sid".to_string(), upgrades: Vec::new(), ping_interval, ping_timeout }
    }

    #[test]
    fn test_heartbeat_follows_handshake() {
        let (ping_every, silence) = heartbeat(Some(&handshake(25000, 5000)), Duration::from_secs(60));
        assert_eq!(ping_every, Duration::from_millis(25000));
        assert_eq!(silence, Duration::from_millis(30000));

        let (ping_every, silence) = heartbeat(Some(&handshake(u64::MAX, u64::MAX)), Duration::from_secs(60));
        assert_eq!(ping_every, MAX_HEARTBEAT);
        assert_eq!(silence, MAX_HEARTBEAT);
    }

    #[test]
    fn test_heartbeat_without_handshake_uses_silent_timeout() {
        let (ping_every, silence) = heartbeat(None, Duration::from_secs(60));
        assert_eq!(ping_every, Duration::from_secs(30));
        assert_eq!(silence, Duration::from_secs(60));

        let (ping_every, silence) = heartbeat(None, Duration::ZERO);
        assert_eq!(ping_every, MIN_PING_PERIOD);
        assert_eq!(silence, Duration::ZERO);

        let (ping_every, _) = heartbeat(Some(&handshake(0, 0)), Duration::ZERO);
        assert!(!ping_every.is_zero());
    }

    #[tokio::test]
    async fn test_stop_without_start_closes() {
        let session = Session::new(
            SessionConfig::new("cred"),
            Arc::new(Catalog::new(HashMap::new(), HashMap::new())),
            LiveStore::new(),
        );
        assert_eq!(session.state(), SessionState::Idle);

        session.stop().await;
        assert_eq!(session.state(), SessionState::Closed);

        session.start();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_gives_up_after_max_attempts() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut config = SessionConfig::new("cred");
        config.endpoint = format!("ws://{addr}/");
        config.backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(5));
        config.max_reconnect_attempts = Some(2);

        let session = Session::new(config, Arc::new(Catalog::new(HashMap::new(), HashMap::new())), LiveStore::new());
        let mut states = session.subscribe_state();
        session.start();

        timeout(Duration::from_secs(5), states.wait_for(|s| *s == SessionState::Closed))
            .await
            .expect("session should give up")
            .unwrap();
    }
}
