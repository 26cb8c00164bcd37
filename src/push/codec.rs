//! Engine.IO v4 / Socket.IO v5 text framing over a websocket transport.
//!
//! Only the default namespace and text packets are handled; binary events
//! and acknowledgements are decoded as `SocketPacket::Unsupported`.

use super::PushError;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_PING_INTERVAL_MS: u64 = 25_000;
const DEFAULT_PING_TIMEOUT_MS: u64 = 20_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenHandshake {
    pub sid: String,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
}

impl OpenHandshake {
    /// How long the connection may stay silent before it is considered dead.
    pub fn liveness_window(&self) -> Duration {
        self.ping_interval + self.ping_timeout
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenPayload {
    #[serde(default)]
    sid: String,
    #[serde(default)]
    ping_interval: Option<u64>,
    #[serde(default)]
    ping_timeout: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineFrame {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect,
    Disconnect,
    Event { name: String, data: Value },
    ConnectError(String),
    Unsupported(char),
}

pub fn decode_frame(text: &str) -> Result<EngineFrame, PushError> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| PushError::Protocol("empty engine.io frame".to_string()))?;
    let rest = chars.as_str();
    match kind {
        '0' => decode_open(rest).map(EngineFrame::Open),
        '1' => Ok(EngineFrame::Close),
        '2' => Ok(EngineFrame::Ping(rest.to_string())),
        '3' => Ok(EngineFrame::Pong(rest.to_string())),
        '4' => decode_packet(rest).map(EngineFrame::Message),
        '5' | '6' => Ok(EngineFrame::Noop),
        other => Err(PushError::Protocol(format!(
            "unknown engine.io packet type `{other}`"
        ))),
    }
}

fn decode_open(payload: &str) -> Result<OpenHandshake, PushError> {
    let open: OpenPayload = serde_json::from_str(payload)
        .map_err(|err| PushError::Protocol(format!("invalid open packet: {err}")))?;
    Ok(OpenHandshake {
        sid: open.sid,
        ping_interval: Duration::from_millis(
            open.ping_interval.unwrap_or(DEFAULT_PING_INTERVAL_MS),
        ),
        ping_timeout: Duration::from_millis(open.ping_timeout.unwrap_or(DEFAULT_PING_TIMEOUT_MS)),
    })
}

fn decode_packet(text: &str) -> Result<SocketPacket, PushError> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| PushError::Protocol("empty socket.io packet".to_string()))?;
    let body = strip_ack_id(strip_namespace(chars.as_str()));
    match kind {
        '0' => Ok(SocketPacket::Connect),
        '1' => Ok(SocketPacket::Disconnect),
        '2' => decode_event(body),
        '4' => Ok(SocketPacket::ConnectError(connect_error_message(body))),
        other @ ('3' | '5' | '6') => Ok(SocketPacket::Unsupported(other)),
        other => Err(PushError::Protocol(format!(
            "unknown socket.io packet type `{other}`"
        ))),
    }
}

/// Drops a leading `/namespace,` prefix if present.
fn strip_namespace(body: &str) -> &str {
    if !body.starts_with('/') {
        return body;
    }
    match body.find(',') {
        Some(index) => &body[index + 1..],
        None => "",
    }
}

fn strip_ack_id(body: &str) -> &str {
    body.trim_start_matches(|ch: char| ch.is_ascii_digit())
}

fn decode_event(body: &str) -> Result<SocketPacket, PushError> {
    let args: Vec<Value> = serde_json::from_str(body)
        .map_err(|err| PushError::Protocol(format!("invalid event packet: {err}")))?;
    let mut args = args.into_iter();
    let name = match args.next() {
        Some(Value::String(name)) => name,
        _ => {
            return Err(PushError::Protocol(
                "event packet must start with an event name".to_string(),
            ))
        }
    };
    Ok(SocketPacket::Event {
        name,
        data: args.next().unwrap_or(Value::Null),
    })
}

fn connect_error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        Ok(Value::String(text)) => text,
        _ => body.to_string(),
    }
}

pub fn encode_connect() -> String {
    "40".to_string()
}

pub fn encode_pong(payload: &str) -> String {
    format!("3{payload}")
}

pub fn encode_event(name: &str, data: &Value) -> String {
    format!("42{}", Value::Array(vec![Value::String(name.to_string()), data.clone()]))
}
