//! Notify module - unsolicited push notifications.
//!
//! Provides:
//! - [`Payload`] - decoded body of a response or notification
//! - [`NotificationHandler`] - subscriber callback (closures work directly)
//! - the dispatch worker that fans notifications out to subscribers
//!
//! # Example
//!
//! ```ignore
//! use nefit_client::PushNotification;
//!
//! client.subscribe(|n: PushNotification| async move {
//!     if let Some(value) = n.payload.value() {
//!         println!("{} -> {}", n.uri, value);
//!     }
//! });
//! ```

mod dispatch;
mod handler;
mod payload;

pub(crate) use dispatch::{decode_push, dispatch_loop, enqueue};
pub use dispatch::DEFAULT_NOTIFICATION_CAPACITY;
pub use handler::{BoxFuture, NotificationHandler, Subscribers};
pub use payload::Payload;

/// Unsolicited state change pushed by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct PushNotification {
    /// Endpoint the update refers to (top-level `id` field), or empty.
    pub uri: String,
    /// Decoded payload.
    pub payload: Payload,
}
