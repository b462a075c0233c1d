use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::dispatch::Dispatcher;
use super::event::{parse_event, JOIN_ROOM};
use super::frame::Frame;
use crate::errors::{ClientError, Result};

/// Live connection to the backend's Socket.IO endpoint, joined to the user's room.
pub struct RealtimeChannel {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RealtimeChannel {
    /// Connects to `url` and starts applying events through `dispatcher`.
    pub async fn connect(url: &str, user_id: &str, dispatcher: Dispatcher) -> Result<Self> {
        let (socket, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|err| ClientError::Realtime(err.to_string()))?;

        info!("Realtime channel connected");

        let (mut sink, mut stream) = socket.split();
        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let user_id = user_id.to_string();

        let task = tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = &mut shutdown_rx => {
                        let _ = sink.send(Message::Text(Frame::Disconnect.encode())).await;
                        let _ = sink.close().await;
                        break;
                    }
                    message = stream.next() => message,
                };

                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        error!("Socket connection error: {}", err);
                        break;
                    }
                };

                let frame = match Frame::decode(&text) {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!("{}", err);
                        continue;
                    }
                };

                let reply = match frame {
                    Frame::Open(_) => Some(Frame::Connect(None)),
                    Frame::Ping(payload) => Some(Frame::Pong(payload)),
                    Frame::Connect(_) => {
                        debug!("Joining room of user {}", user_id);
                        Some(Frame::event(JOIN_ROOM, json!({ "userId": user_id })))
                    }
                    Frame::Event { name, payload } => {
                        dispatcher.dispatch(parse_event(&name, payload)).await;
                        None
                    }
                    Frame::ConnectError(err) => {
                        error!("Socket connection error: {}", err);
                        break;
                    }
                    Frame::Close | Frame::Disconnect => break,
                    Frame::Pong(_) | Frame::Noop => None,
                };

                if let Some(reply) = reply {
                    if let Err(err) = sink.send(Message::Text(reply.encode())).await {
                        error!("Failed to write to realtime channel: {}", err);
                        break;
                    }
                }
            }

            info!("Realtime channel closed");
        });

        Ok(Self {
            shutdown: Some(shutdown),
            task,
        })
    }

    pub fn is_open(&self) -> bool {
        !self.task.is_finished()
    }

    /// Leaves the namespace, closes the socket and waits for the reader to stop.
    pub async fn disconnect(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}
