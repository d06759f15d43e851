//! # nefit-client
//!
//! Async client for the Nefit Easy heating controller protocol.
//!
//! The device backend speaks HTTP-style GET/PUT requests tunneled in chat
//! message stanzas, with bodies AES-256 encrypted under a key derived from the
//! device credentials.
//!
//! ## Architecture
//!
//! - **Protocol codec** ([`protocol`]): request text, stanza escaping, response parsing
//! - **Encryption** ([`crypto`]): key derivation, ECB encrypt/decrypt, base64
//! - **Request queue**: at most one request in flight against the session
//! - **Correlation**: responses are broadcast to waiters; unclaimed ones are push notifications
//! - **Retry**: per-attempt deadlines, exponential backoff for PUT
//! - **Lifecycle** ([`Client`]): keepalive, receive and dispatch workers
//!
//! The messaging session itself is supplied through the [`transport::Connector`]
//! trait; [`transport::MemoryConnector`] provides an in-process one.
//!
//! ## Example
//!
//! ```ignore
//! use nefit_client::{CallContext, Client, Config};
//!
//! #[tokio::main]
//! async fn main() -> nefit_client::Result<()> {
//!     let client = Client::builder(Config::new("123456789", "abcdefghij", "password"))
//!         .connector(my_xmpp_connector)
//!         .build()?;
//!
//!     let ctx = CallContext::new();
//!     client.connect(&ctx).await?;
//!
//!     let pressure = client.get(&ctx, nefit_client::uris::PRESSURE).await?;
//!     println!("pressure: {:?}", pressure.value());
//!
//!     client.set_temperature(&ctx, 21.5).await?;
//!     client.close().await
//! }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod notify;
pub mod protocol;
pub mod transport;

mod client;
mod commands;
mod context;
mod correlation;
mod queue;
mod retry;
mod workers;

pub use client::{Client, ClientBuilder, ConnectionState};
pub use commands::{uris, UserMode};
pub use config::Config;
pub use context::CallContext;
pub use error::{NefitError, Result};
pub use notify::{NotificationHandler, Payload, PushNotification};
pub use retry::{RetryPolicy, MAX_BACKOFF};
