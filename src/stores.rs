mod comments;
mod session;
mod subscription;
mod user;

pub use comments::CommentStore;
pub use session::SessionStore;
pub use subscription::{SubscriptionState, SubscriptionStore};
pub use user::{UserState, UserStore};
