//! Notification handlers and the subscriber list.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;

use super::PushNotification;

/// Boxed future returned by handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Receiver of push notifications.
///
/// Implemented for any `Fn(PushNotification) -> impl Future<Output = ()>`, so
/// closures can be subscribed directly:
///
/// ```ignore
/// client.subscribe(|n: PushNotification| async move {
///     tracing::info!(uri = %n.uri, "changed");
/// });
/// ```
pub trait NotificationHandler: Send + Sync + 'static {
    /// Handle one notification.
    fn call(&self, notification: PushNotification) -> BoxFuture<'static, ()>;
}

impl<F, Fut> NotificationHandler for F
where
    F: Fn(PushNotification) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self, notification: PushNotification) -> BoxFuture<'static, ()> {
        Box::pin((self)(notification))
    }
}

/// Ordered, append-only list of handlers.
#[derive(Default)]
pub struct Subscribers {
    handlers: RwLock<Vec<Arc<dyn NotificationHandler>>>,
}

impl Subscribers {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler.
    pub fn add(&self, handler: Arc<dyn NotificationHandler>) {
        self.handlers.write().push(handler);
    }

    /// Copy of the current list, in subscription order.
    pub fn snapshot(&self) -> Vec<Arc<dyn NotificationHandler>> {
        self.handlers.read().clone()
    }

    /// Number of handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// True when nobody has subscribed.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}
