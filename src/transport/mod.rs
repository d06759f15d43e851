//! Transport module - the messaging session under the client.
//!
//! Provides:
//! - [`Connector`] / [`Transport`] - the seam a real messaging library plugs into
//! - [`SessionParams`] / [`TlsPolicy`] - addressing, credentials and TLS rules
//! - an in-process implementation ([`MemoryConnector`], [`MemoryDevice`])

mod memory;
mod session;

pub use memory::{MemoryConnector, MemoryDevice, MemoryTransport, SentMessage};
pub use session::{
    ChatMessage, Connector, Inbound, MessageType, SessionParams, TlsPolicy, TlsVersion, Transport,
};
