//! Session seam between the client engine and the messaging transport.
//!
//! The engine never speaks the messaging protocol itself. A [`Connector`]
//! opens an authenticated, TLS-upgraded session and hands back a
//! [`Transport`] that can send chat text, receive inbound stanzas, ping and
//! close.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::Result;

/// Minimum TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

/// TLS requirements for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPolicy {
    /// Start in plain text and upgrade with STARTTLS (direct TLS is refused).
    pub starttls: bool,
    /// Lowest acceptable protocol version.
    pub min_version: TlsVersion,
    /// Name to verify the server certificate against.
    pub server_name: String,
}

/// Everything a connector needs to open a session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionParams {
    /// `host:port` to dial.
    pub address: String,
    /// Login identity, `local-part@host`.
    pub jid: String,
    /// Login secret (prefixed access key).
    pub password: String,
    /// TLS requirements.
    pub tls: TlsPolicy,
}

impl SessionParams {
    /// Session parameters derived from client configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            address: config.address(),
            jid: config.jid(),
            password: config.auth_password(),
            tls: TlsPolicy {
                starttls: true,
                min_version: TlsVersion::Tls12,
                server_name: config.host.clone(),
            },
        }
    }
}

impl fmt::Debug for SessionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionParams")
            .field("address", &self.address)
            .field("jid", &self.jid)
            .field("password", &"[REDACTED]")
            .field("tls", &self.tls)
            .finish()
    }
}

/// Type attribute of a chat stanza.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// `type="chat"`
    Chat,
    /// No type or `type="normal"`.
    Normal,
    /// `type="error"`
    Error,
}

impl MessageType {
    /// Parse a stanza `type` attribute.
    pub fn from_attr(value: &str) -> Self {
        match value {
            "chat" => MessageType::Chat,
            "error" => MessageType::Error,
            _ => MessageType::Normal,
        }
    }
}

/// An inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Sender address.
    pub from: String,
    /// Message type.
    pub kind: MessageType,
    /// Body text with transport escaping already removed.
    pub text: String,
}

/// Anything the transport can receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Chat message; the only kind the engine acts on.
    Chat(ChatMessage),
    /// Presence update.
    Presence,
    /// Any other stanza, named for diagnostics.
    Other(String),
}

/// An open session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `text` as a chat message to `to`.
    async fn send(&self, to: &str, text: &str) -> Result<()>;

    /// Wait for the next inbound stanza.
    async fn recv(&self) -> Result<Inbound>;

    /// Send a liveness signal.
    async fn ping(&self) -> Result<()>;

    /// Close the session. Pending `recv` calls fail afterwards.
    async fn close(&self) -> Result<()>;
}

/// Opens sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Dial, upgrade to TLS and authenticate.
    async fn connect(&self, params: &SessionParams) -> Result<Arc<dyn Transport>>;
}
