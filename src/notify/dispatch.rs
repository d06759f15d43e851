//! Push decoding and the dispatch worker.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{Payload, PushNotification, Subscribers};
use crate::crypto::Encryptor;
use crate::protocol::HttpResponse;

/// Default notification intake capacity.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 100;

/// Turn an unsolicited response into a notification.
///
/// Only status 200 with a non-empty body is decoded; anything else, or a
/// body that fails to decrypt, yields `None`.
pub fn decode_push(response: &HttpResponse, encryptor: &Encryptor) -> Option<PushNotification> {
    if response.status_code != 200 || response.body.is_empty() {
        tracing::debug!(status = response.status_code, "ignoring push without payload");
        return None;
    }

    let text = match encryptor.decrypt_and_strip(&response.body) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "failed to decrypt push notification");
            return None;
        }
    };

    let payload = Payload::decode(text, response.content_type.as_deref());
    let uri = payload.id().unwrap_or_default().to_string();

    Some(PushNotification { uri, payload })
}

/// Queue a notification without blocking.
///
/// When the intake is full the notification is dropped with a warning.
pub fn enqueue(tx: &mpsc::Sender<PushNotification>, notification: PushNotification) {
    match tx.try_send(notification) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(n)) => {
            tracing::warn!(uri = %n.uri, "notification queue full, dropping message");
        }
        Err(mpsc::error::TrySendError::Closed(n)) => {
            tracing::debug!(uri = %n.uri, "notification queue closed, dropping message");
        }
    }
}

/// Deliver a notification to every current subscriber.
///
/// Each handler runs on its own task; nothing waits for them.
pub fn dispatch(subscribers: &Subscribers, notification: PushNotification, span: &tracing::Span) {
    let handlers = subscribers.snapshot();
    tracing::debug!(uri = %notification.uri, handlers = handlers.len(), "dispatching notification");

    for handler in handlers {
        let fut = handler.call(notification.clone());
        tokio::spawn(fut.instrument(span.clone()));
    }
}

/// Dispatch worker.
///
/// Runs until the intake closes or `shutdown` fires. After shutdown it keeps
/// dispatching until the intake is closed, so late notifications still reach
/// subscribers.
pub async fn dispatch_loop(
    mut rx: mpsc::Receiver<PushNotification>,
    subscribers: Arc<Subscribers>,
    shutdown: CancellationToken,
    span: tracing::Span,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("dispatch worker shutting down, draining queue");
                break;
            }
            notification = rx.recv() => match notification {
                Some(n) => dispatch(&subscribers, n, &span),
                None => {
                    tracing::debug!("notification intake closed");
                    break;
                }
            },
        }
    }

    // Senders may still be live while the receive worker winds down; drain
    // until every one of them is gone.
    while let Some(n) = rx.recv().await {
        dispatch(&subscribers, n, &span);
    }
}
