//! In-process transport.
//!
//! [`MemoryConnector`] hands out a [`MemoryTransport`] whose other end is a
//! [`MemoryDevice`]. The device side sees every message the client sends and
//! can inject chat messages, error stanzas and presence updates. Useful for
//! tests and for driving the engine without a network.
//!
//! # Example
//!
//! ```ignore
//! use nefit_client::transport::MemoryConnector;
//!
//! let (connector, device) = MemoryConnector::new();
//! let client = Client::builder(config).connector(connector).build()?;
//! client.connect(&ctx).await?;
//!
//! let sent = device.next_message().await.unwrap();
//! device.send_chat("HTTP/1.1 200 OK\r\n\r\n");
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::session::{ChatMessage, Connector, Inbound, MessageType, SessionParams, Transport};
use crate::error::{NefitError, Result};

/// A message sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Destination address.
    pub to: String,
    /// Body text.
    pub text: String,
}

/// State shared by both ends.
#[derive(Default)]
struct Link {
    params: Mutex<Option<SessionParams>>,
    refusal: Mutex<Option<String>>,
    pings: AtomicUsize,
    closed: CancellationToken,
}

/// Connector for an in-process session.
pub struct MemoryConnector {
    transport: Arc<MemoryTransport>,
    link: Arc<Link>,
}

impl MemoryConnector {
    /// Create a connector and the device end of its session.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Self, MemoryDevice) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let link = Arc::new(Link::default());

        let transport = Arc::new(MemoryTransport {
            outbound: outbound_tx,
            inbound: tokio::sync::Mutex::new(inbound_rx),
            link: link.clone(),
        });
        let device = MemoryDevice {
            outbound: tokio::sync::Mutex::new(outbound_rx),
            inbound: inbound_tx,
            link: link.clone(),
        };

        (Self { transport, link }, device)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, params: &SessionParams) -> Result<Arc<dyn Transport>> {
        *self.link.params.lock() = Some(params.clone());

        if let Some(reason) = self.link.refusal.lock().clone() {
            return Err(NefitError::Connection(reason));
        }
        if self.link.closed.is_cancelled() {
            return Err(NefitError::Connection("session already closed".to_string()));
        }

        Ok(self.transport.clone())
    }
}

/// Client end of an in-process session.
pub struct MemoryTransport {
    outbound: mpsc::UnboundedSender<SentMessage>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    link: Arc<Link>,
}

impl MemoryTransport {
    fn check_open(&self) -> Result<()> {
        if self.link.closed.is_cancelled() {
            Err(NefitError::Connection("session closed".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, to: &str, text: &str) -> Result<()> {
        self.check_open()?;
        self.outbound
            .send(SentMessage {
                to: to.to_string(),
                text: text.to_string(),
            })
            .map_err(|_| NefitError::Connection("device end dropped".to_string()))
    }

    async fn recv(&self) -> Result<Inbound> {
        self.check_open()?;
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            _ = self.link.closed.cancelled() => {
                Err(NefitError::Connection("session closed".to_string()))
            }
            msg = inbound.recv() => {
                msg.ok_or_else(|| NefitError::Connection("device end dropped".to_string()))
            }
        }
    }

    async fn ping(&self) -> Result<()> {
        self.check_open()?;
        self.link.pings.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.link.closed.cancel();
        Ok(())
    }
}

/// Device end of an in-process session.
pub struct MemoryDevice {
    outbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<SentMessage>>,
    inbound: mpsc::UnboundedSender<Inbound>,
    link: Arc<Link>,
}

impl MemoryDevice {
    /// Next message sent by the client, or `None` once the client end is gone.
    pub async fn next_message(&self) -> Option<SentMessage> {
        self.outbound.lock().await.recv().await
    }

    /// A message already sent by the client, without waiting.
    pub fn try_next_message(&self) -> Option<SentMessage> {
        self.outbound.try_lock().ok()?.try_recv().ok()
    }

    /// Deliver an inbound stanza to the client.
    pub fn inject(&self, inbound: Inbound) {
        let _ = self.inbound.send(inbound);
    }

    /// Deliver a `type="chat"` message with the given body.
    pub fn send_chat(&self, text: impl Into<String>) {
        self.inject(Inbound::Chat(ChatMessage {
            from: "device".to_string(),
            kind: MessageType::Chat,
            text: text.into(),
        }));
    }

    /// Deliver a `type="error"` message with the given body.
    pub fn send_error(&self, text: impl Into<String>) {
        self.inject(Inbound::Chat(ChatMessage {
            from: "device".to_string(),
            kind: MessageType::Error,
            text: text.into(),
        }));
    }

    /// Make subsequent connects fail with `reason`.
    pub fn refuse_connections(&self, reason: impl Into<String>) {
        *self.link.refusal.lock() = Some(reason.into());
    }

    /// Parameters of the most recent connect attempt.
    pub fn session_params(&self) -> Option<SessionParams> {
        self.link.params.lock().clone()
    }

    /// Number of keepalive pings received.
    pub fn pings(&self) -> usize {
        self.link.pings.load(Ordering::Relaxed)
    }

    /// True once the client closed the session.
    pub fn is_closed(&self) -> bool {
        self.link.closed.is_cancelled()
    }
}
