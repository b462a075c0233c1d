use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a monitoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Pending,
    Decoding,
    Running,
    Stopping,
    /// Older backend builds spell this `stop`.
    #[serde(alias = "stop")]
    Stopped,
}

impl SessionStatus {
    /// Whether the backend is still doing work for this session.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionStatus::Pending | SessionStatus::Decoding | SessionStatus::Running
        )
    }
}

/// Live counters the backend scrapes from the stream page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveMetadata {
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub share_count: Option<u64>,
}

/// A live source the user asked the backend to monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlItem {
    /// Assigned by the backend on start. Empty for a draft the user has typed but not started.
    pub task_id: String,
    pub url: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<LiveMetadata>,
    /// Sequence number of the last server write applied to this item.
    pub seq: u64,
}

impl UrlItem {
    pub fn draft(url: impl Into<String>) -> Self {
        Self {
            task_id: String::new(),
            url: url.into(),
            status: SessionStatus::Idle,
            created_at: Utc::now(),
            metadata: None,
            seq: 0,
        }
    }

    pub fn is_draft(&self) -> bool {
        self.task_id.is_empty()
    }
}

/// Session as returned by `GET /comments/active`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ActiveTask {
    #[serde(rename = "_id")]
    pub id: String,
    pub source: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<LiveMetadata>,
    #[serde(default)]
    pub seq: u64,
}

impl From<ActiveTask> for UrlItem {
    fn from(task: ActiveTask) -> Self {
        Self {
            task_id: task.id,
            url: task.source,
            status: task.status,
            created_at: task.created_at,
            metadata: task.metadata,
            seq: task.seq,
        }
    }
}

/// A past session, with links to the exported comment file and log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub source: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub log_url: Option<String>,
}

impl HistoryEntry {
    /// Opens the exported comment file, if the backend produced one.
    pub fn open_file(&self) -> bool {
        match &self.file_url {
            Some(url) => crate::links::open_external(url),
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub items: Vec<HistoryEntry>,
    /// Page number that was requested, starting at 1.
    #[serde(skip)]
    pub page: u32,
    #[serde(skip)]
    pub has_more: bool,
}
