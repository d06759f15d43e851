//! Response correlation.
//!
//! Responses carry no request id, so correlation is by broadcast: while any
//! waiter is registered, every inbound response is offered to all of them.
//! When no waiter is registered the message is an unsolicited push.
//!
//! Each waiter is owned by a [`PendingGuard`]; dropping the guard removes the
//! entry, so it is removed exactly once however the call ends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::context::CallContext;
use crate::error::{NefitError, Result};
use crate::protocol::HttpResponse;

struct Waiter {
    response_tx: mpsc::Sender<HttpResponse>,
    error_tx: mpsc::Sender<String>,
}

/// Table of callers waiting for a response.
#[derive(Default)]
pub struct PendingTable {
    waiters: RwLock<HashMap<String, Waiter>>,
    seq: AtomicU64,
}

impl PendingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `uri` and return the guard that owns it.
    pub fn register(self: &Arc<Self>, prefix: &str, uri: &str) -> PendingGuard {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let id = format!("{}:{}:{}-{}", prefix, uri, nanos, seq);

        let (response_tx, response_rx) = mpsc::channel(1);
        let (error_tx, error_rx) = mpsc::channel(1);

        self.waiters.write().insert(
            id.clone(),
            Waiter {
                response_tx,
                error_tx,
            },
        );

        PendingGuard {
            table: Arc::clone(self),
            id,
            response_rx,
            error_rx,
        }
    }

    /// Offer a response to every waiter.
    ///
    /// Returns the response back when nobody is waiting, meaning it is a push
    /// notification. Waiters whose slot is already full are skipped.
    pub fn offer(&self, response: HttpResponse) -> Option<HttpResponse> {
        let waiters = self.waiters.read();
        if waiters.is_empty() {
            return Some(response);
        }

        for waiter in waiters.values() {
            let _ = waiter.response_tx.try_send(response.clone());
        }
        None
    }

    /// Deliver an error-stanza text to every waiter.
    pub fn broadcast_error(&self, text: &str) {
        let waiters = self.waiters.read();
        for waiter in waiters.values() {
            let _ = waiter.error_tx.try_send(text.to_string());
        }
    }

    /// Number of registered waiters.
    pub fn len(&self) -> usize {
        self.waiters.read().len()
    }

    /// True when no call is waiting.
    pub fn is_empty(&self) -> bool {
        self.waiters.read().is_empty()
    }

    fn remove(&self, id: &str) {
        self.waiters.write().remove(id);
    }
}

/// Registration handle for one pending call.
///
/// Removes its entry from the table on drop.
pub struct PendingGuard {
    table: Arc<PendingTable>,
    id: String,
    response_rx: mpsc::Receiver<HttpResponse>,
    error_rx: mpsc::Receiver<String>,
}

impl PendingGuard {
    /// Waiter id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for a response, an error stanza, or the end of `ctx`.
    pub async fn wait(&mut self, ctx: &CallContext) -> Result<HttpResponse> {
        tokio::select! {
            Some(response) = self.response_rx.recv() => Ok(response),
            Some(text) = self.error_rx.recv() => Err(NefitError::ErrorStanza(text)),
            err = ctx.done() => Err(err),
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}
