//! # Socket.IO Frame Codec
//!
//! The feed speaks Socket.IO v2 over Engine.IO v3 websocket text frames. Each
//! frame starts with an Engine.IO packet type digit; Engine.IO `message`
//! packets carry a Socket.IO packet whose own type digit follows, then an
//! optional `/namespace,`, an optional numeric ack id and a JSON body.
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,"pingTimeout":5000}   open
//! 2 / 3                                                 ping / pong
//! 40                                                    connect
//! 42["event-name",{...}]                                event
//! 44"reason"                                            error
//! ```
//!
//! Binary attachments are not used by the feed and decode as
//! [`SocketPacket::Binary`] so the caller can skip them.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::CodecError;

/// Engine.IO ping frame.
pub const PING: &str = "2";
/// Engine.IO pong frame.
pub const PONG: &str = "3";

/// Parameters announced by the server in the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between client pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a ping before dropping the client.
    pub ping_timeout: u64,
}

/// A decoded Socket.IO event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub namespace: Option<String>,
    pub ack_id: Option<u64>,
    pub name: String,
    pub args: Vec<Value>,
}

impl Event {
    /// First argument, the payload for every event the feed sends.
    pub fn payload(&self) -> Option<&Value> {
        self.args.first()
    }
}

/// Socket.IO packet carried by an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect,
    Disconnect,
    Event(Event),
    Ack,
    Error(String),
    Binary,
}

/// One decoded websocket text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// Decodes one text frame.
pub fn decode(frame: &str) -> Result<EnginePacket, CodecError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let rest = chars.as_str();

    match kind {
        '0' => serde_json::from_str::<Handshake>(rest)
            .map(EnginePacket::Open)
            .map_err(|e| CodecError::Json(e.to_string())),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping(rest.to_string())),
        '3' => Ok(EnginePacket::Pong(rest.to_string())),
        '4' => decode_socket(rest).map(EnginePacket::Message),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(CodecError::UnknownPacketType(other)),
    }
}

fn decode_socket(body: &str) -> Result<SocketPacket, CodecError> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let (namespace, rest) = split_namespace(chars.as_str());

    match kind {
        '0' => Ok(SocketPacket::Connect),
        '1' => Ok(SocketPacket::Disconnect),
        '2' => decode_event(namespace, rest).map(SocketPacket::Event),
        '3' => Ok(SocketPacket::Ack),
        '4' => Ok(SocketPacket::Error(decode_error(rest))),
        '5' | '6' => Ok(SocketPacket::Binary),
        other => Err(CodecError::UnknownMessageType(other)),
    }
}

fn split_namespace(rest: &str) -> (Option<String>, &str) {
    if !rest.starts_with('/') {
        return (None, rest);
    }
    match rest.find(',') {
        Some(idx) => (Some(rest[..idx].to_string()), &rest[idx + 1..]),
        None => (Some(rest.to_string()), ""),
    }
}

fn decode_event(namespace: Option<String>, rest: &str) -> Result<Event, CodecError> {
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    let ack_id = if digits > 0 { rest[..digits].parse::<u64>().ok() } else { None };

    let data: Value = serde_json::from_str(&rest[digits..]).map_err(|e| CodecError::Json(e.to_string()))?;
    let mut items = match data {
        Value::Array(items) => items.into_iter(),
        _ => return Err(CodecError::MissingEventName),
    };

    let name = match items.next() {
        Some(Value::String(name)) => name,
        _ => return Err(CodecError::MissingEventName),
    };

    Ok(Event { namespace, ack_id, name, args: items.collect() })
}

fn decode_error(rest: &str) -> String {
    match serde_json::from_str::<Value>(rest) {
        Ok(Value::String(s)) => s,
        Ok(Value::Object(map)) => map
            .get("message")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| Value::Object(map).to_string()),
        _ => rest.to_string(),
    }
}

/// Encodes an event with a single payload argument on the default namespace.
pub fn encode_event(name: &str, payload: &Value) -> String {
    format!("42{}", json!([name, payload]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_open_handshake() {
        let frame = r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":60000}"#;
        match decode(frame).unwrap() {
            EnginePacket::Open(hs) => {
                assert_eq!(hs.sid, "abc");
                assert_eq!(hs.ping_interval, 25000);
                assert_eq!(hs.ping_timeout, 60000);
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn test_decode_control_frames() {
        assert_eq!(decode("2").unwrap(), EnginePacket::Ping(String::new()));
        assert_eq!(decode("3probe").unwrap(), EnginePacket::Pong("probe".to_string()));
        assert_eq!(decode("40").unwrap(), EnginePacket::Message(SocketPacket::Connect));
        assert_eq!(decode("41").unwrap(), EnginePacket::Message(SocketPacket::Disconnect));
        assert_eq!(decode("6").unwrap(), EnginePacket::Noop);
    }

    #[test]
    fn test_decode_event_with_namespace_and_ack() {
        let frame = r#"42/live,7["ru.bustime.bus_mode1__2227",{"bdata_mode1":{}}]"#;
        let EnginePacket::Message(SocketPacket::Event(event)) = decode(frame).unwrap() else {
            panic!("expected an event");
        };

        assert_eq!(event.namespace.as_deref(), Some("/live"));
        assert_eq!(event.ack_id, Some(7));
        assert_eq!(event.name, "ru.bustime.bus_mode1__2227");
        assert_eq!(event.payload(), Some(&json!({"bdata_mode1": {}})));
    }

    #[test]
    fn test_decode_error_packets() {
        assert_eq!(
            decode(r#"44"unauthorized""#).unwrap(),
            EnginePacket::Message(SocketPacket::Error("unauthorized".to_string()))
        );
        assert_eq!(
            decode(r#"44{"message":"bad credential"}"#).unwrap(),
            EnginePacket::Message(SocketPacket::Error("bad credential".to_string()))
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode(""), Err(CodecError::Empty));
        assert_eq!(decode("9"), Err(CodecError::UnknownPacketType('9')));
        assert_eq!(decode("42{\"a\":1}"), Err(CodecError::MissingEventName));
        assert!(matches!(decode("42[oops"), Err(CodecError::Json(_))));
    }

    #[test]
    fn test_encode_event_frame() {
        let frame = encode_event("join", &json!("ru.bustime.bus_mode1__2227"));
        assert_eq!(frame, r#"42["join","ru.bustime.bus_mode1__2227"]"#);
    }
}
