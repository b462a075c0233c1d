//! Realtime channel: Socket.IO over a WebSocket, carrying comments and session updates.

mod channel;
mod dispatch;
mod event;
mod frame;

pub use channel::RealtimeChannel;
pub use dispatch::Dispatcher;
pub use event::{parse_event, RealtimeEvent};
pub use frame::Frame;
