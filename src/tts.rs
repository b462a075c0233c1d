//! Reading comments aloud.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::config::DEFAULT_TTS_LANGUAGE;
use crate::structs::Comment;

/// The platform text-to-speech engine.
///
/// `speak` returns immediately; the host calls [`TtsController::finished`] once the
/// utterance is done, stopped or failed.
pub trait SpeechEngine: Send + Sync {
    fn speak(&self, text: &str, language: &str);
    fn stop(&self);
}

/// Engine that only logs. Used when the host has no speech output.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentEngine;

impl SpeechEngine for SilentEngine {
    fn speak(&self, text: &str, language: &str) {
        debug!("[{}] {}", language, text);
    }

    fn stop(&self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtsState {
    pub is_speaking: bool,
    pub auto_read: bool,
    pub current_text: Option<String>,
    pub language: String,
}

impl Default for TtsState {
    fn default() -> Self {
        Self {
            is_speaking: false,
            auto_read: false,
            current_text: None,
            language: DEFAULT_TTS_LANGUAGE.to_string(),
        }
    }
}

pub struct TtsController {
    engine: Arc<dyn SpeechEngine>,
    state: Mutex<TtsState>,
}

impl TtsController {
    pub fn new(engine: Arc<dyn SpeechEngine>, language: impl Into<String>, auto_read: bool) -> Self {
        Self {
            engine,
            state: Mutex::new(TtsState {
                language: language.into(),
                auto_read,
                ..TtsState::default()
            }),
        }
    }

    pub fn snapshot(&self) -> TtsState {
        self.lock().clone()
    }

    /// Speaks `text`, cutting off whatever is being spoken.
    /// `language` overrides the configured language for this utterance only.
    pub fn speak(&self, text: &str, language: Option<&str>) {
        self.engine.stop();

        let language = {
            let mut state = self.lock();
            let language = language.unwrap_or(state.language.as_str()).to_string();
            state.is_speaking = true;
            state.current_text = Some(text.to_string());
            language
        };

        self.engine.speak(text, &language);
    }

    pub fn stop(&self) {
        self.engine.stop();
        self.finished();
    }

    /// Called when the engine is done with the current utterance.
    pub fn finished(&self) {
        let mut state = self.lock();
        state.is_speaking = false;
        state.current_text = None;
    }

    pub fn toggle_auto_read(&self) -> bool {
        let mut state = self.lock();
        state.auto_read = !state.auto_read;
        state.auto_read
    }

    pub fn set_language(&self, language: impl Into<String>) {
        self.lock().language = language.into();
    }

    /// Reads a fresh comment aloud when auto-read is on.
    pub fn announce(&self, comment: &Comment) -> bool {
        if !self.lock().auto_read {
            return false;
        }
        self.speak(&comment.spoken(), None);
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TtsState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
