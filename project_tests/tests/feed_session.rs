//! End-to-end runs of the feed session against an in-process Socket.IO
//! lookalike bound to a random local port.

use futures_util::{SinkExt, StreamExt};
use lib_transit::feed::{Backoff, Session, SessionConfig, SessionState};
use lib_transit::{Catalog, LiveStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::protocol::Message};

const SCRIPT: &str = r#"stops=[{value:"Площадь Металлургов",ids:[22411]},{value:"Гвардейская",ids:["22344"]}];BUSES={"2227":{name:"1",ttype:0},"2228":{name:"2"}};"#;
const OPEN: &str = r#"0{"sid":"test","upgrades":[],"pingInterval":25000,"pingTimeout":5000}"#;
const WAIT: Duration = Duration::from_secs(5);

type ServerWs = WebSocketStream<TcpStream>;

async fn listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

async fn accept(listener: &TcpListener) -> ServerWs {
    let (stream, _) = listener.accept().await.unwrap();
    accept_async(stream).await.unwrap()
}

async fn next_text(ws: &mut ServerWs) -> Option<String> {
    while let Some(msg) = ws.next().await {
        match msg {
            Ok(Message::Text(text)) => return Some(text.as_str().to_string()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

async fn send(ws: &mut ServerWs, frame: &str) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

/// Open + connect, then reads the authentication and the join frames.
async fn handshake(ws: &mut ServerWs, open: &str) -> (String, Vec<String>) {
    send(ws, open).await;
    send(ws, "40").await;
    let auth = next_text(ws).await.unwrap();
    let join = next_text(ws).await.unwrap();
    (auth, vec![join])
}

fn bus_frame(event: &str, stop: &str, vehicle: &str, line: &str) -> String {
    let payload = serde_json::json!([event, {"bdata_mode1": {stop: [{"g": vehicle, "id": line}]}}]);
    format!("42{payload}")
}

fn session(addr: SocketAddr, configure: impl FnOnce(&mut SessionConfig)) -> Session {
    let mut config = SessionConfig::new("cred");
    config.endpoint = format!("ws://{addr}/");
    config.namespace = "ns".to_string();
    config.line_ids = vec!["2227".to_string()];
    config.handshake_timeout = Duration::from_secs(2);
    config.backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(50));
    configure(&mut config);

    let catalog = Arc::new(Catalog::from_script(SCRIPT).unwrap());
    Session::new(config, catalog, LiveStore::new())
}

async fn wait_for_vehicle(session: &Session, vehicle: &str) {
    timeout(WAIT, async {
        while session.live().snapshot().get(vehicle).is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("vehicle {vehicle} never arrived"));
}

#[tokio::test]
async fn test_subscribe_and_reconcile() {
    let (listener, addr) = listener().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let (auth, joins) = handshake(&mut ws, OPEN).await;

        send(&mut ws, &bus_frame("other.bus_mode1__2227", "22411", "X", "2227")).await;
        send(&mut ws, &bus_frame("ns.bus_mode1__2227", "22411", "V1", "2227")).await;
        send(&mut ws, &bus_frame("ns.bus_mode1__2227", "99999", "V2", "4242")).await;

        // Hold the socket until the client closes it
        while next_text(&mut ws).await.is_some() {}
        (auth, joins)
    });

    let session = session(addr, |_| {});
    let mut states = session.subscribe_state();
    session.start();

    timeout(WAIT, states.wait_for(|s| *s == SessionState::Receiving)).await.unwrap().unwrap();
    wait_for_vehicle(&session, "V2").await;

    let live = session.live().snapshot();
    let v1 = live.get("V1").unwrap();
    assert_eq!(v1.stop_id, "22411");
    assert_eq!(v1.stop_name, "Площадь Металлургов");
    assert_eq!(v1.bus.as_deref(), Some("1"));

    let v2 = live.get("V2").unwrap();
    assert_eq!(v2.stop_name, lib_transit::UNKNOWN_STOP);
    assert_eq!(v2.bus, None);

    assert!(live.get("X").is_none(), "events outside the namespace must be ignored");
    assert_eq!(live.len(), 2);

    session.stop().await;
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.live().snapshot().is_empty());

    let (auth, joins) = timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(auth, r#"42["authentication",{"username":"cred","password":"","os":"web"}]"#);
    assert_eq!(joins, vec![r#"42["join","ns.bus_mode1__2227"]"#.to_string()]);
}

#[tokio::test]
async fn test_reconnect_resets_live_state() {
    let (listener, addr) = listener().await;

    let server = tokio::spawn(async move {
        let mut first = accept(&listener).await;
        handshake(&mut first, OPEN).await;
        send(&mut first, &bus_frame("ns.bus_mode1__2227", "22411", "V1", "2227")).await;
        // Give the client time to apply the batch, then drop the connection
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(first);

        let mut second = accept(&listener).await;
        handshake(&mut second, OPEN).await;
        send(&mut second, &bus_frame("ns.bus_mode1__2228", "22344", "V2", "2228")).await;
        while next_text(&mut second).await.is_some() {}
    });

    let session = session(addr, |_| {});
    session.start();

    wait_for_vehicle(&session, "V1").await;
    wait_for_vehicle(&session, "V2").await;

    let live = session.live().snapshot();
    assert!(live.get("V1").is_none(), "a fresh connection starts from an empty state");
    assert_eq!(live.get("V2").unwrap().stop_name, "Гвардейская");
    assert_eq!(live.get("V2").unwrap().bus.as_deref(), Some("2"));

    session.stop().await;
    timeout(WAIT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_heartbeat_pings_and_pongs() {
    let (listener, addr) = listener().await;
    let open = r#"0{"sid":"hb","upgrades":[],"pingInterval":50,"pingTimeout":1000}"#;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        handshake(&mut ws, open).await;
        send(&mut ws, "2probe").await;

        let (mut saw_ping, mut saw_pong) = (false, false);
        while !(saw_ping && saw_pong) {
            match next_text(&mut ws).await.as_deref() {
                Some("2") => saw_ping = true,
                Some("3probe") => saw_pong = true,
                Some(_) => {}
                None => break,
            }
        }
        (saw_ping, saw_pong)
    });

    let session = session(addr, |_| {});
    session.start();

    let (saw_ping, saw_pong) = timeout(WAIT, server).await.unwrap().unwrap();
    assert!(saw_ping, "client should ping every pingInterval");
    assert!(saw_pong, "client should answer server pings");

    session.stop().await;
}

#[tokio::test]
async fn test_rejection_and_silent_server_end_in_closed() {
    let (listener, addr) = listener().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        handshake(&mut ws, OPEN).await;
        send(&mut ws, r#"44"unauthorized""#).await;
        while next_text(&mut ws).await.is_some() {}

        // Second attempt: accept the socket but never speak
        let _silent = accept(&listener).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let session = session(addr, |config| {
        config.handshake_timeout = Duration::from_millis(300);
        config.max_reconnect_attempts = Some(1);
    });
    let mut states = session.subscribe_state();
    session.start();

    timeout(WAIT, states.wait_for(|s| *s == SessionState::Closed)).await.unwrap().unwrap();
    assert!(session.live().snapshot().is_empty());

    server.abort();
}

#[tokio::test]
async fn test_rejected_after_connect_exhausts_reconnect_attempts() {
    let (listener, addr) = listener().await;
    let connections = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&connections);
    let server = tokio::spawn(async move {
        // Every connection gets through the handshake and is then refused
        loop {
            let mut ws = accept(&listener).await;
            counter.fetch_add(1, Ordering::SeqCst);
            handshake(&mut ws, OPEN).await;
            send(&mut ws, r#"44"unauthorized""#).await;
        }
    });

    let session = session(addr, |config| {
        config.backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(2000));
        config.max_reconnect_attempts = Some(2);
    });
    let mut states = session.subscribe_state();
    session.start();

    timeout(WAIT, states.wait_for(|s| *s == SessionState::Closed)).await.unwrap().unwrap();
    // The first attempt plus two reconnects
    assert_eq!(connections.load(Ordering::SeqCst), 3);
    assert!(session.live().snapshot().is_empty());

    server.abort();
}
