use serde_json::Value;

use crate::errors::{ClientError, Result};

/// One Engine.IO v4 text packet, with the Socket.IO v4 packet inside `4`.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `0{"sid":...,"pingInterval":...}`
    Open(Value),
    /// `1`
    Close,
    /// `2`, optionally with a probe payload.
    Ping(String),
    /// `3`
    Pong(String),
    /// `40`, with the handshake object when sent by the server.
    Connect(Option<Value>),
    /// `41`
    Disconnect,
    /// `42["name", payload]`
    Event { name: String, payload: Value },
    /// `44{"message":...}`
    ConnectError(Value),
    /// `6`
    Noop,
}

impl Frame {
    pub fn event(name: impl Into<String>, payload: Value) -> Self {
        Frame::Event {
            name: name.into(),
            payload,
        }
    }

    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let Some(kind) = chars.next() else {
            return Err(malformed(text));
        };
        let rest = chars.as_str();

        match kind {
            '0' => Ok(Frame::Open(serde_json::from_str(rest).map_err(|_| malformed(text))?)),
            '1' => Ok(Frame::Close),
            '2' => Ok(Frame::Ping(rest.to_string())),
            '3' => Ok(Frame::Pong(rest.to_string())),
            '4' => decode_socket_packet(rest).ok_or_else(|| malformed(text)),
            '6' => Ok(Frame::Noop),
            _ => Err(malformed(text)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Frame::Open(handshake) => format!("0{handshake}"),
            Frame::Close => "1".to_string(),
            Frame::Ping(payload) => format!("2{payload}"),
            Frame::Pong(payload) => format!("3{payload}"),
            Frame::Connect(None) => "40".to_string(),
            Frame::Connect(Some(handshake)) => format!("40{handshake}"),
            Frame::Disconnect => "41".to_string(),
            Frame::Event { name, payload } => {
                format!("42{}", Value::Array(vec![Value::String(name.clone()), payload.clone()]))
            }
            Frame::ConnectError(error) => format!("44{error}"),
            Frame::Noop => "6".to_string(),
        }
    }
}

fn decode_socket_packet(packet: &str) -> Option<Frame> {
    let mut chars = packet.chars();
    let kind = chars.next()?;
    let body = strip_namespace(chars.as_str());

    match kind {
        '0' if body.is_empty() => Some(Frame::Connect(None)),
        '0' => Some(Frame::Connect(Some(serde_json::from_str(body).ok()?))),
        '1' => Some(Frame::Disconnect),
        '2' => {
            // An ack id may sit between the type and the array.
            let body = body.trim_start_matches(|c: char| c.is_ascii_digit());
            let Value::Array(mut items) = serde_json::from_str(body).ok()? else {
                return None;
            };
            if items.is_empty() {
                return None;
            }
            let Value::String(name) = items.remove(0) else {
                return None;
            };
            let payload = if items.is_empty() {
                Value::Null
            } else {
                items.remove(0)
            };
            Some(Frame::Event { name, payload })
        }
        '4' => Some(Frame::ConnectError(
            serde_json::from_str(body).unwrap_or(Value::Null),
        )),
        _ => None,
    }
}

/// Drops a `/namespace,` prefix. Only the default namespace is used.
fn strip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        body.split_once(',').map(|(_, rest)| rest).unwrap_or("")
    } else {
        body
    }
}

fn malformed(text: &str) -> ClientError {
    ClientError::Realtime(format!("malformed packet `{text}`"))
}
