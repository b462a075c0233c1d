mod client;
mod comment;
mod package;
mod session;
mod user;

pub use client::{ApiClient, Method};
pub use comment::{Author, Comment};
pub use package::{Offer, Package, StreamLimit, Subscription, SubscriptionRecord, Tier};
pub use session::{HistoryEntry, HistoryPage, LiveMetadata, SessionStatus, UrlItem};
pub use user::{Profile, SubscriptionStatus, UserSubscription};

pub(crate) use session::ActiveTask;
