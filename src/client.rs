//! Client builder and connection lifecycle.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the session
//! connector, logging span and intake capacities. The [`Client`] manages the
//! lifecycle:
//! 1. Open the session (STARTTLS, TLS >= 1.2)
//! 2. Start the keepalive, receive and notification dispatch workers
//! 3. Serve GET/PUT calls through the single-flight request queue
//! 4. On close: cancel workers, close the session, drain notifications,
//!    shut down the queue
//!
//! # Example
//!
//! ```ignore
//! use nefit_client::{CallContext, Client, Config, PushNotification};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new("123456789", "abcdefghij", "password");
//!     let client = Client::builder(config)
//!         .connector(my_xmpp_connector)
//!         .build()?;
//!
//!     let ctx = CallContext::new();
//!     client.connect(&ctx).await?;
//!
//!     client.subscribe(|n: PushNotification| async move {
//!         println!("{} changed", n.uri);
//!     });
//!
//!     let pressure = client.get(&ctx, "/system/appliance/systemPressure").await?;
//!     println!("{:?}", pressure.value());
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::Config;
use crate::context::CallContext;
use crate::correlation::PendingTable;
use crate::crypto::Encryptor;
use crate::error::{NefitError, Result};
use crate::notify::{
    dispatch_loop, NotificationHandler, Payload, PushNotification, Subscribers,
    DEFAULT_NOTIFICATION_CAPACITY,
};
use crate::protocol::OutboundMessage;
use crate::queue::{RequestQueue, DEFAULT_QUEUE_CAPACITY};
use crate::retry::{get_with_retry, put_with_retry, RetryPolicy};
use crate::transport::{Connector, SessionParams, Transport};
use crate::workers::{keepalive_loop, receive_loop, Inbox};

/// Lifecycle state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Built, never connected.
    Disconnected,
    /// Session being opened.
    Connecting,
    /// Session open, workers running.
    Connected,
    /// Shutdown in progress.
    Closing,
    /// Shut down; cannot be reused.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Builder for configuring and creating a client.
pub struct ClientBuilder {
    config: Config,
    connector: Option<Box<dyn Connector>>,
    span: Option<tracing::Span>,
    notification_capacity: usize,
    queue_capacity: usize,
}

impl ClientBuilder {
    /// Create a builder for `config`.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            connector: None,
            span: None,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Set the session connector. Required.
    pub fn connector<C: Connector + 'static>(mut self, connector: C) -> Self {
        self.connector = Some(Box::new(connector));
        self
    }

    /// Set the span all client logging is recorded under.
    ///
    /// Default: `info_span!("nefit_client", serial = ...)`
    pub fn span(mut self, span: tracing::Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Set the notification queue capacity.
    ///
    /// When full, new notifications are dropped with a warning.
    /// Default: 100
    pub fn notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity;
        self
    }

    /// Set the request queue intake capacity.
    ///
    /// Default: 100
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Validate the configuration, derive the key and build the client.
    ///
    /// Must be called from within a Tokio runtime; the request queue worker
    /// starts here.
    pub fn build(self) -> Result<Client> {
        let config = self.config.with_defaults();
        config.validate()?;

        let connector = self
            .connector
            .ok_or_else(|| NefitError::Config("no session connector configured".to_string()))?;

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(NefitError::Config(
                "client must be built inside a Tokio runtime".to_string(),
            ));
        }

        let encryptor = Encryptor::new(&config.access_key, &config.password)?;
        let span = self
            .span
            .unwrap_or_else(|| tracing::info_span!("nefit_client", serial = %config.serial_number));

        let shared = Shared {
            policy: RetryPolicy::from_config(&config),
            jid: config.jid(),
            resource_jid: config.resource_jid(),
            config,
            encryptor,
            queue: RequestQueue::start(self.queue_capacity),
            connector,
            transport: RwLock::new(None),
            pending: Arc::new(PendingTable::new()),
            subscribers: Arc::new(Subscribers::new()),
            notify_tx: Mutex::new(None),
            notification_capacity: self.notification_capacity.max(1),
            state: Mutex::new(ConnectionState::Disconnected),
            shutdown: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            span,
        };

        Ok(Client {
            shared: Arc::new(shared),
        })
    }
}

struct Shared {
    config: Config,
    policy: RetryPolicy,
    jid: String,
    resource_jid: String,
    encryptor: Encryptor,
    queue: RequestQueue,
    connector: Box<dyn Connector>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    pending: Arc<PendingTable>,
    subscribers: Arc<Subscribers>,
    notify_tx: Mutex<Option<mpsc::Sender<PushNotification>>>,
    notification_capacity: usize,
    state: Mutex<ConnectionState>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    span: tracing::Span,
}

impl Shared {
    fn transport(&self) -> Result<Arc<dyn Transport>> {
        self.transport.read().clone().ok_or(NefitError::NotConnected)
    }

    /// Install the session and spawn the background workers.
    fn start_session(&self, transport: Arc<dyn Transport>) {
        *self.transport.write() = Some(transport.clone());

        let (notify_tx, notify_rx) = mpsc::channel(self.notification_capacity);
        let inbox = Inbox {
            pending: self.pending.clone(),
            encryptor: self.encryptor.clone(),
            notify_tx: notify_tx.clone(),
        };
        *self.notify_tx.lock() = Some(notify_tx);

        let workers = vec![
            tokio::spawn(
                keepalive_loop(
                    transport.clone(),
                    self.config.ping_interval,
                    self.shutdown.clone(),
                )
                .instrument(self.span.clone()),
            ),
            tokio::spawn(
                receive_loop(transport, inbox, self.shutdown.clone())
                    .instrument(self.span.clone()),
            ),
            tokio::spawn(
                dispatch_loop(
                    notify_rx,
                    self.subscribers.clone(),
                    self.shutdown.clone(),
                    self.span.clone(),
                )
                .instrument(self.span.clone()),
            ),
        ];
        self.workers.lock().extend(workers);
    }

    /// One GET attempt. Runs on the request queue.
    async fn execute_get(&self, ctx: &CallContext, uri: &str) -> Result<Payload> {
        let transport = self.transport()?;
        let msg = OutboundMessage::get(&self.jid, &self.resource_jid, uri);
        let text = msg.body_text()?;

        let mut waiter = self.pending.register("get", uri);
        tracing::debug!(uri = %uri, request_id = %waiter.id(), "sending GET request");
        transport.send(&msg.to, &text).await?;
        let response = waiter.wait(ctx).await?;

        if response.status_code != 200 {
            return Err(NefitError::Remote {
                status: response.status_code,
                reason: response.status,
            });
        }

        let decrypted = self.encryptor.decrypt_and_strip(&response.body)?;
        Ok(Payload::decode(decrypted, response.content_type.as_deref()))
    }

    /// One PUT attempt. Runs on the request queue.
    async fn execute_put(&self, ctx: &CallContext, uri: &str, encrypted: &str) -> Result<()> {
        let transport = self.transport()?;
        let msg = OutboundMessage::put(&self.jid, &self.resource_jid, uri, encrypted);
        let text = msg.body_text()?;

        let mut waiter = self.pending.register("put", uri);
        tracing::debug!(
            uri = %uri,
            request_id = %waiter.id(),
            payload_length = encrypted.len(),
            "sending PUT request"
        );
        transport.send(&msg.to, &text).await?;
        let response = waiter.wait(ctx).await?;

        if response.status_code >= 300 {
            tracing::error!(
                uri = %uri,
                status_code = response.status_code,
                status = %response.status,
                "PUT request rejected"
            );
            return Err(NefitError::Remote {
                status: response.status_code,
                reason: response.status,
            });
        }

        tracing::debug!(uri = %uri, status_code = response.status_code, "PUT request successful");
        Ok(())
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A client for one device.
///
/// Cheap to clone; clones share the session. Use [`connect`](Self::connect)
/// before issuing requests and [`close`](Self::close) when done.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder(config: Config) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// The effective configuration (defaults applied).
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// True while a session is open.
    pub fn is_connected(&self) -> bool {
        self.shared.transport.read().is_some()
    }

    /// Open the session and start the background workers.
    ///
    /// Fails if the client is already connected or has been closed. On
    /// failure the client stays disconnected and `connect` may be retried.
    /// A [`close`](Self::close) issued while connecting wins: the new session
    /// is closed and `connect` returns [`NefitError::Connection`].
    pub async fn connect(&self, ctx: &CallContext) -> Result<()> {
        let shared = &self.shared;
        {
            let mut state = shared.state.lock();
            match *state {
                ConnectionState::Disconnected => *state = ConnectionState::Connecting,
                other => {
                    return Err(NefitError::Connection(format!(
                        "cannot connect while {}",
                        other
                    )))
                }
            }
        }

        let params = SessionParams::from_config(&shared.config);
        shared.span.in_scope(|| {
            tracing::info!(host = %shared.config.host, jid = %params.jid, "connecting to backend")
        });

        let connected = tokio::select! {
            biased;
            result = shared.connector.connect(&params) => result,
            _ = shared.shutdown.cancelled() => Err(closed_during_connect()),
            err = ctx.done() => Err(err),
        };

        let transport = match connected {
            Ok(transport) => transport,
            Err(e) => {
                {
                    let mut state = shared.state.lock();
                    if *state == ConnectionState::Connecting {
                        *state = ConnectionState::Disconnected;
                    }
                }
                shared.span.in_scope(|| tracing::error!(error = %e, "failed to connect"));
                return Err(e);
            }
        };

        // close() may have run while the connector was working. The state
        // lock is held while the session and workers are installed, so a
        // concurrent close sees either nothing or everything.
        let installed = {
            let mut state = shared.state.lock();
            if *state == ConnectionState::Connecting {
                shared.start_session(transport.clone());
                *state = ConnectionState::Connected;
                true
            } else {
                false
            }
        };

        if !installed {
            shared
                .span
                .in_scope(|| tracing::warn!("client closed during connect, dropping session"));
            if let Err(e) = transport.close().await {
                shared
                    .span
                    .in_scope(|| tracing::warn!(error = %e, "error closing session"));
            }
            return Err(closed_during_connect());
        }

        shared.span.in_scope(|| tracing::info!("connected to backend"));
        Ok(())
    }

    /// Register a push notification handler.
    ///
    /// Handlers are called in subscription order, each on its own task.
    pub fn subscribe<H: NotificationHandler>(&self, handler: H) {
        self.shared.subscribers.add(Arc::new(handler));
    }

    /// GET `uri` and return the decrypted payload.
    ///
    /// Retries only when an attempt times out.
    pub async fn get(&self, ctx: &CallContext, uri: &str) -> Result<Payload> {
        if !self.is_connected() {
            return Err(NefitError::NotConnected);
        }

        let shared = self.shared.clone();
        let policy = shared.policy;
        get_with_retry(&policy, ctx, uri, |attempt_ctx| {
            let shared = shared.clone();
            let uri = uri.to_string();
            async move {
                let job_ctx = attempt_ctx.clone();
                let job_shared = shared.clone();
                shared
                    .queue
                    .submit(&attempt_ctx, async move {
                        job_shared.execute_get(&job_ctx, &uri).await
                    })
                    .await
            }
        })
        .instrument(self.shared.span.clone())
        .await
    }

    /// PUT `value` serialized as JSON.
    pub async fn put<T>(&self, ctx: &CallContext, uri: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let json = serde_json::to_string(value)?;
        self.put_raw(ctx, uri, &json).await
    }

    /// PUT a pre-encoded JSON document verbatim.
    ///
    /// Retries with exponential backoff while attempts time out; a remote
    /// rejection is returned at once.
    pub async fn put_raw(&self, ctx: &CallContext, uri: &str, json: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(NefitError::NotConnected);
        }

        let shared = self.shared.clone();
        let policy = shared.policy;
        let encrypted: Arc<str> = Arc::from(shared.encryptor.encrypt(json));

        let run = async {
            tracing::debug!(uri = %uri, json_length = json.len(), "PUT request prepared");
            put_with_retry(&policy, ctx, uri, |attempt_ctx| {
                let shared = shared.clone();
                let uri = uri.to_string();
                let encrypted = encrypted.clone();
                async move {
                    let job_ctx = attempt_ctx.clone();
                    let job_shared = shared.clone();
                    shared
                        .queue
                        .submit(&attempt_ctx, async move {
                            job_shared.execute_put(&job_ctx, &uri, &encrypted).await
                        })
                        .await
                }
            })
            .await
        };

        run.instrument(self.shared.span.clone()).await
    }

    /// Shut the client down.
    ///
    /// Cancels the workers, closes the session, closes the notification
    /// intake (buffered notifications are still dispatched), waits for the
    /// workers and finally stops the request queue. Idempotent.
    pub async fn close(&self) -> Result<()> {
        let shared = &self.shared;
        {
            let mut state = shared.state.lock();
            match *state {
                ConnectionState::Closing | ConnectionState::Closed => return Ok(()),
                _ => *state = ConnectionState::Closing,
            }
        }

        let span = shared.span.clone();
        async {
            tracing::info!("closing client");

            shared.shutdown.cancel();

            let transport = shared.transport.write().take();
            if let Some(transport) = transport {
                if let Err(e) = transport.close().await {
                    tracing::warn!(error = %e, "error closing session");
                }
            }

            shared.notify_tx.lock().take();

            let workers: Vec<_> = std::mem::take(&mut *shared.workers.lock());
            for worker in workers {
                if let Err(e) = worker.await {
                    tracing::error!(error = %e, "background worker panicked");
                }
            }

            shared.queue.shutdown().await;

            *shared.state.lock() = ConnectionState::Closed;
            tracing::info!("client closed");
        }
        .instrument(span)
        .await;

        Ok(())
    }
}

fn closed_during_connect() -> NefitError {
    NefitError::Connection("client closed during connect".to_string())
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.shared.config)
            .field("state", &self.state())
            .finish()
    }
}
