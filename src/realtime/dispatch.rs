use std::sync::Arc;

use tracing::{debug, warn};

use super::event::RealtimeEvent;
use crate::notify::{Notice, Notifier};
use crate::stores::{CommentStore, SessionStore};
use crate::structs::SessionStatus;
use crate::tts::TtsController;

/// Applies realtime events to the stores.
#[derive(Clone)]
pub struct Dispatcher {
    comments: Arc<CommentStore>,
    sessions: Arc<SessionStore>,
    tts: Arc<TtsController>,
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(
        comments: Arc<CommentStore>,
        sessions: Arc<SessionStore>,
        tts: Arc<TtsController>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            comments,
            sessions,
            tts,
            notifier,
        }
    }

    pub async fn dispatch(&self, event: RealtimeEvent) {
        match event {
            RealtimeEvent::Comment { comment, .. } => {
                self.tts.announce(&comment);
                self.comments.push(comment);
            }
            RealtimeEvent::Metadata {
                task_id,
                metadata,
                seq,
            } => {
                self.sessions.apply_metadata(&task_id, metadata, seq).await;
            }
            RealtimeEvent::Joined { task_id, seq } => {
                self.sessions
                    .apply_status(&task_id, SessionStatus::Running, seq)
                    .await;
            }
            RealtimeEvent::Status {
                task_id,
                status,
                seq,
            } => {
                self.sessions.apply_status(&task_id, status, seq).await;
            }
            RealtimeEvent::Error { message } => {
                warn!("Realtime error: {}", message);
                self.notifier.notify(Notice::failure(message));
            }
            RealtimeEvent::Ignored => debug!("Nothing to apply"),
        }
    }
}
