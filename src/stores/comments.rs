use std::collections::VecDeque;
use std::sync::Mutex;

use crate::config::{clamp_max_comments, DEFAULT_MAX_COMMENTS};
use crate::structs::Comment;

#[derive(Debug)]
struct Buffer {
    comments: VecDeque<Comment>,
    max: usize,
    loading: bool,
    error: Option<String>,
}

/// Bounded buffer of live comments. The oldest comment is evicted first.
#[derive(Debug)]
pub struct CommentStore {
    buffer: Mutex<Buffer>,
}

impl Default for CommentStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_COMMENTS)
    }
}

impl CommentStore {
    /// `max` is used as given; preferences clamp it before it gets here.
    pub fn new(max: usize) -> Self {
        Self {
            buffer: Mutex::new(Buffer {
                comments: VecDeque::with_capacity(max.min(DEFAULT_MAX_COMMENTS)),
                max: max.max(1),
                loading: false,
                error: None,
            }),
        }
    }

    pub fn push(&self, comment: Comment) {
        let mut buffer = self.lock();
        buffer.comments.push_back(comment);
        while buffer.comments.len() > buffer.max {
            buffer.comments.pop_front();
        }
    }

    /// Changes the bound, dropping the oldest comments if the buffer is now over it.
    pub fn set_max(&self, max: usize) -> usize {
        let max = clamp_max_comments(max);
        let mut buffer = self.lock();
        buffer.max = max;
        while buffer.comments.len() > max {
            buffer.comments.pop_front();
        }
        max
    }

    pub fn max(&self) -> usize {
        self.lock().max
    }

    pub fn len(&self) -> usize {
        self.lock().comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().comments.is_empty()
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<Comment> {
        self.lock().comments.iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().comments.clear();
    }

    pub fn set_loading(&self, loading: bool) {
        self.lock().loading = loading;
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    pub fn set_error(&self, error: Option<String>) {
        self.lock().error = error;
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Buffer> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
