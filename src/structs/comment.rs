use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who wrote a comment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// An inbound chat message. Lives only in the comment buffer and is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub author: Author,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Platform the comment came from, e.g. "tiktok".
    #[serde(default)]
    pub platform: Option<String>,
}

impl Comment {
    /// Line read aloud for this comment.
    pub fn spoken(&self) -> String {
        format!("{}: {}", self.author.name, self.text)
    }
}
