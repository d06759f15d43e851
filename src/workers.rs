//! Background workers owned by a connected client.
//!
//! - keepalive: periodic ping, failures logged
//! - receive: reads inbound stanzas and routes chat messages
//!
//! The notification dispatch worker lives in [`crate::notify`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::correlation::PendingTable;
use crate::crypto::Encryptor;
use crate::notify::{decode_push, enqueue, PushNotification};
use crate::protocol::parse_http_response;
use crate::transport::{ChatMessage, Inbound, MessageType, Transport};

/// Pause after a receive error before reading again.
pub const RECEIVE_ERROR_DELAY: Duration = Duration::from_millis(100);

/// Send a ping every `period` until `shutdown` fires.
pub(crate) async fn keepalive_loop(
    transport: Arc<dyn Transport>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                match transport.ping().await {
                    Ok(()) => tracing::debug!("sent keepalive ping"),
                    Err(e) => tracing::error!(error = %e, "failed to send ping"),
                }
            }
        }
    }
}

/// Routes inbound chat messages to waiters or the notification queue.
pub(crate) struct Inbox {
    pub pending: Arc<PendingTable>,
    pub encryptor: Encryptor,
    pub notify_tx: mpsc::Sender<PushNotification>,
}

impl Inbox {
    pub fn handle_chat(&self, msg: ChatMessage) {
        tracing::debug!(from = %msg.from, kind = ?msg.kind, "received chat message");

        if msg.kind == MessageType::Error {
            tracing::error!(from = %msg.from, text = %msg.text, "received error message");
            self.pending.broadcast_error(&msg.text);
            return;
        }

        if msg.text.is_empty() {
            return;
        }

        let response = match parse_http_response(&msg.text) {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, body = %msg.text, "failed to parse response");
                return;
            }
        };
        tracing::debug!(
            status = response.status_code,
            waiters = self.pending.len(),
            "parsed response"
        );

        // Unclaimed responses are push notifications.
        if let Some(response) = self.pending.offer(response) {
            if let Some(notification) = decode_push(&response, &self.encryptor) {
                tracing::info!(uri = %notification.uri, "push notification received");
                enqueue(&self.notify_tx, notification);
            }
        }
    }
}

/// Read stanzas until `shutdown` fires.
///
/// Receive errors are logged and followed by a short pause; the loop never
/// reconnects.
pub(crate) async fn receive_loop(
    transport: Arc<dyn Transport>,
    inbox: Inbox,
    shutdown: CancellationToken,
) {
    loop {
        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = transport.recv() => result,
        };

        match result {
            Ok(Inbound::Chat(msg)) => inbox.handle_chat(msg),
            Ok(Inbound::Presence) => {}
            Ok(Inbound::Other(kind)) => tracing::debug!(kind = %kind, "ignoring stanza"),
            Err(e) => {
                tracing::error!(error = %e, "error receiving message");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(RECEIVE_ERROR_DELAY) => {}
                }
            }
        }
    }
}
