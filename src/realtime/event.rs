use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::structs::{Comment, LiveMetadata, SessionStatus};

pub const MESSAGE_TASK: &str = "message-task";
pub const ERROR: &str = "error";
pub const JOIN_ROOM: &str = "join-room";

/// Body of a `message-task` event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskMessage {
    action: String,
    name: String,
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    seq: Option<u64>,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    status: SessionStatus,
}

#[derive(Debug, Deserialize)]
struct ErrorData {
    #[serde(default)]
    message: Option<String>,
}

/// What the backend pushes over the realtime channel.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    Comment {
        task_id: Option<String>,
        comment: Comment,
    },
    Metadata {
        task_id: String,
        metadata: LiveMetadata,
        seq: Option<u64>,
    },
    /// The backend joined the live room; the session is now running.
    Joined {
        task_id: String,
        seq: Option<u64>,
    },
    Status {
        task_id: String,
        status: SessionStatus,
        seq: Option<u64>,
    },
    Error {
        message: String,
    },
    /// Anything this client does not act on.
    Ignored,
}

/// Interprets a Socket.IO event by name and payload.
pub fn parse_event(name: &str, payload: Value) -> RealtimeEvent {
    match name {
        MESSAGE_TASK => parse_task_message(payload),
        ERROR => {
            let message = serde_json::from_value::<ErrorData>(payload)
                .ok()
                .and_then(|data| data.message)
                .unwrap_or_else(|| "Realtime error".to_string());
            RealtimeEvent::Error { message }
        }
        other => {
            debug!("Ignoring realtime event `{}`", other);
            RealtimeEvent::Ignored
        }
    }
}

fn parse_task_message(payload: Value) -> RealtimeEvent {
    let message: TaskMessage = match serde_json::from_value(payload) {
        Ok(message) => message,
        Err(err) => {
            debug!("Malformed message-task payload: {}", err);
            return RealtimeEvent::Ignored;
        }
    };

    if message.action != "update" {
        debug!("Ignoring message-task action `{}`", message.action);
        return RealtimeEvent::Ignored;
    }

    let TaskMessage {
        name,
        task_id,
        seq,
        data,
        ..
    } = message;

    let event = match (name.as_str(), task_id) {
        ("comment", task_id) => serde_json::from_value(data)
            .ok()
            .map(|comment| RealtimeEvent::Comment { task_id, comment }),
        ("metadata", Some(task_id)) => serde_json::from_value(data)
            .ok()
            .map(|metadata| RealtimeEvent::Metadata {
                task_id,
                metadata,
                seq,
            }),
        ("join", Some(task_id)) => Some(RealtimeEvent::Joined { task_id, seq }),
        ("status", Some(task_id)) => serde_json::from_value::<StatusData>(data)
            .ok()
            .map(|data| RealtimeEvent::Status {
                task_id,
                status: data.status,
                seq,
            }),
        _ => None,
    };

    event.unwrap_or_else(|| {
        debug!("Ignoring message-task `{}`", name);
        RealtimeEvent::Ignored
    })
}
