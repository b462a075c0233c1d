//! Client core for the TLive livestream companion: account, subscriptions and
//! in-app purchases, live sessions, the realtime comment feed and read-aloud.

mod app;
pub mod config;
pub mod errors;
pub mod links;
pub mod notify;
pub mod purchase;
pub mod realtime;
pub mod storage;
pub mod stores;
pub mod structs;
pub mod tts;

pub use app::{App, AppBuilder};
pub use config::{Config, Environment, Platform, Preferences};
pub use errors::{ClientError, PurchaseError, Result};
pub use notify::{Notice, NoticeKind, Notifier};
pub use purchase::{PaymentService, PurchaseGateway};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use stores::{CommentStore, SessionStore, SubscriptionStore, UserStore};
pub use structs::ApiClient;
pub use tts::{SpeechEngine, TtsController};

// Tester
#[cfg(test)]
mod tests;
