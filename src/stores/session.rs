use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::errors::{ClientError, Result};
use crate::notify::{Notice, Notifier};
use crate::structs::{ActiveTask, ApiClient, HistoryPage, LiveMetadata, SessionStatus, UrlItem};

pub const HISTORY_PAGE_SIZE: u32 = 10;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    task_id: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct HistoryQuery {
    page: u32,
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<SessionStatus>,
}

/// Monitoring sessions of the signed in user.
///
/// Writes that come from the server carry a per-session sequence number; a write
/// that is not newer than the last one applied is dropped. Local optimistic
/// changes never bump the sequence, so a revert only lands if no server write
/// arrived in the meantime.
pub struct SessionStore {
    api: Arc<ApiClient>,
    notifier: Arc<dyn Notifier>,
    urls: RwLock<Vec<UrlItem>>,
}

impl SessionStore {
    pub fn new(api: Arc<ApiClient>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            notifier,
            urls: RwLock::new(Vec::new()),
        }
    }

    pub async fn urls(&self) -> Vec<UrlItem> {
        self.urls.read().await.clone()
    }

    pub async fn get(&self, task_id: &str) -> Option<UrlItem> {
        self.urls
            .read()
            .await
            .iter()
            .find(|item| item.task_id == task_id)
            .cloned()
    }

    pub async fn set_urls(&self, urls: Vec<UrlItem>) {
        *self.urls.write().await = urls;
    }

    /// Adds a URL the user has typed but not started yet.
    pub async fn add_draft(&self, url: impl Into<String>) {
        self.urls.write().await.insert(0, UrlItem::draft(url));
    }

    /// Drops a started session. Drafts go through [`SessionStore::remove_draft`].
    pub async fn remove(&self, task_id: &str) {
        if task_id.trim().is_empty() {
            return;
        }
        self.urls.write().await.retain(|item| item.task_id != task_id);
    }

    pub async fn remove_draft(&self, url: &str) {
        self.urls
            .write()
            .await
            .retain(|item| !(item.is_draft() && item.url == url));
    }

    pub async fn clear(&self) {
        self.urls.write().await.clear();
    }

    /// Replaces the server-backed sessions with the backend's active list.
    /// Drafts are kept.
    pub async fn fetch_active_urls(&self) -> Result<()> {
        let tasks = match self.api.get::<Vec<ActiveTask>>("/comments/active").await {
            Ok(tasks) => tasks,
            Err(err) => {
                error!("Failed to fetch active URLs: {}", err);
                self.notifier
                    .notify(Notice::failure("Failed to load active sessions"));
                return Err(err);
            }
        };

        let mut urls = self.urls.write().await;

        let mut merged: Vec<UrlItem> = urls.iter().filter(|item| item.is_draft()).cloned().collect();
        for task in tasks {
            let mut fresh = UrlItem::from(task);
            if let Some(local) = urls.iter().find(|item| item.task_id == fresh.task_id) {
                if local.seq > fresh.seq {
                    // A newer realtime update already landed for this session.
                    fresh.status = local.status;
                    fresh.metadata = local.metadata.clone();
                    fresh.seq = local.seq;
                }
            }
            merged.push(fresh);
        }

        debug!("{} active sessions", merged.len());
        *urls = merged;
        Ok(())
    }

    /// Asks the backend to start monitoring `url`, then reloads the session list.
    ///
    /// If a draft exists for `url` it shows `pending` while the request runs and
    /// goes back to `idle` on failure. Otherwise nothing is added until the
    /// backend confirms.
    pub async fn start_url(&self, url: &str) -> Result<String> {
        let url = url.trim();
        if url.is_empty() {
            self.notifier.notify(Notice::failure("Please enter a valid URL"));
            return Err(ClientError::InvalidUrl(url.to_string()));
        }

        let had_draft = self.mark_draft(url, SessionStatus::Idle, SessionStatus::Pending).await;

        let started = match self
            .api
            .post::<StartResponse, _>("/comments/start", &json!({ "url": url }))
            .await
        {
            Ok(started) => started,
            Err(err) => {
                if had_draft {
                    self.mark_draft(url, SessionStatus::Pending, SessionStatus::Idle)
                        .await;
                }
                self.notifier.notify(Notice::failure(err.to_string()));
                return Err(err);
            }
        };

        info!("Started session {} for {}", started.task_id, url);
        self.remove_draft(url).await;

        if self.fetch_active_urls().await.is_err() {
            // Keep the confirmed session visible until the next successful reload.
            let mut urls = self.urls.write().await;
            if !urls.iter().any(|item| item.task_id == started.task_id) {
                urls.insert(
                    0,
                    UrlItem {
                        task_id: started.task_id.clone(),
                        url: url.to_string(),
                        status: SessionStatus::Pending,
                        created_at: started.created_at.unwrap_or_else(Utc::now),
                        metadata: None,
                        seq: 0,
                    },
                );
            }
        }

        self.notifier.notify(Notice::success("Started a new session"));
        Ok(started.task_id)
    }

    /// Asks the backend to stop `task_id`, then reloads the session list.
    /// On failure the session goes back to the status it had before.
    pub async fn stop_url(&self, task_id: &str) -> Result<()> {
        if task_id.trim().is_empty() {
            warn!("Refusing to stop a session without task id");
            return Err(ClientError::MissingTaskId);
        }

        let previous = {
            let mut urls = self.urls.write().await;
            urls.iter_mut()
                .find(|item| item.task_id == task_id)
                .map(|item| {
                    let previous = (item.status, item.seq);
                    item.status = SessionStatus::Stopping;
                    previous
                })
        };

        let result = self
            .api
            .post::<(), _>("/comments/stop", &json!({ "taskId": task_id }))
            .await;

        if let Err(err) = result {
            if let Some((status, seq)) = previous {
                let mut urls = self.urls.write().await;
                if let Some(item) = urls.iter_mut().find(|item| item.task_id == task_id) {
                    if item.seq == seq && item.status == SessionStatus::Stopping {
                        item.status = status;
                    }
                }
            }
            self.notifier.notify(Notice::failure(err.to_string()));
            return Err(err);
        }

        info!("Stopped session {}", task_id);

        if self.fetch_active_urls().await.is_err() {
            let mut urls = self.urls.write().await;
            if let Some(item) = urls.iter_mut().find(|item| item.task_id == task_id) {
                item.status = SessionStatus::Stopped;
            }
        }

        self.notifier.notify(Notice::success("Session stopped"));
        Ok(())
    }

    /// Applies a server status update. Returns `false` when it was ignored.
    pub async fn apply_status(&self, task_id: &str, status: SessionStatus, seq: Option<u64>) -> bool {
        self.apply(task_id, seq, |item| item.status = status).await
    }

    /// Applies a server metadata update. Returns `false` when it was ignored.
    pub async fn apply_metadata(&self, task_id: &str, metadata: LiveMetadata, seq: Option<u64>) -> bool {
        self.apply(task_id, seq, |item| item.metadata = Some(metadata)).await
    }

    /// One page of past sessions, newest first.
    pub async fn fetch_history(&self, page: u32, only_running: bool) -> Result<HistoryPage> {
        let page = page.max(1);
        let query = HistoryQuery {
            page,
            limit: HISTORY_PAGE_SIZE,
            status: only_running.then_some(SessionStatus::Running),
        };

        let mut history: HistoryPage = self.api.get_with_query("/comments/history", &query).await?;
        history.page = page;
        history.has_more = history.items.len() as u32 == HISTORY_PAGE_SIZE;
        Ok(history)
    }

    async fn apply<F>(&self, task_id: &str, seq: Option<u64>, update: F) -> bool
    where
        F: FnOnce(&mut UrlItem),
    {
        if task_id.is_empty() {
            debug!("Ignoring update without task id");
            return false;
        }

        let mut urls = self.urls.write().await;
        let Some(item) = urls.iter_mut().find(|item| item.task_id == task_id) else {
            debug!("Ignoring update for unknown session {}", task_id);
            return false;
        };

        match seq {
            Some(seq) if seq <= item.seq => {
                warn!(
                    "Dropping stale update #{} for session {} (at #{})",
                    seq, task_id, item.seq
                );
                false
            }
            Some(seq) => {
                update(item);
                item.seq = seq;
                true
            }
            // Servers without sequence numbers: last write wins.
            None => {
                update(item);
                true
            }
        }
    }

    async fn mark_draft(&self, url: &str, from: SessionStatus, to: SessionStatus) -> bool {
        let mut urls = self.urls.write().await;
        match urls
            .iter_mut()
            .find(|item| item.is_draft() && item.url == url && item.status == from)
        {
            Some(item) => {
                item.status = to;
                true
            }
            None => false,
        }
    }
}
