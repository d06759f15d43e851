//! Single-flight request queue.
//!
//! The device backend tolerates one in-flight request at a time. Every
//! operation that touches the shared session is submitted here and executed by
//! one dedicated worker task in strict FIFO order.
//!
//! # Architecture
//!
//! ```text
//! get()  ─┐
//! put()  ─┼─► mpsc::Sender<Job> (bounded) ─► Worker Task ─► Transport
//! get()  ─┘          ▲                            │
//!                    └──── oneshot result ◄───────┘
//! ```
//!
//! A caller that gives up (cancellation or deadline) stops waiting; the worker
//! still finishes the job and its result is dropped.

use std::future::Future;
use std::pin::Pin;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::CallContext;
use crate::error::{NefitError, Result};

/// Default intake capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// FIFO serializer backed by one worker task.
pub struct RequestQueue {
    tx: mpsc::Sender<Job>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RequestQueue {
    /// Spawn the worker and return the queue.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(worker_loop(rx, shutdown.clone()));

        Self {
            tx,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Enqueue `work` and wait for its result.
    ///
    /// Blocks while the intake is full. Returns early with the context's
    /// error if `ctx` ends first, or [`NefitError::QueueClosed`] once the
    /// queue has been shut down.
    pub async fn submit<T, Fut>(&self, ctx: &CallContext, work: Fut) -> Result<T>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if self.is_closed() {
            return Err(NefitError::QueueClosed);
        }

        let (result_tx, result_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let result = work.await;
            // Receiver may be gone if the caller gave up.
            let _ = result_tx.send(result);
        });

        tokio::select! {
            _ = self.shutdown.cancelled() => return Err(NefitError::QueueClosed),
            err = ctx.done() => return Err(err),
            sent = self.tx.send(job) => {
                if sent.is_err() {
                    return Err(NefitError::QueueClosed);
                }
            }
        }

        tokio::select! {
            result = result_rx => result.unwrap_or(Err(NefitError::QueueClosed)),
            err = ctx.done() => Err(err),
        }
    }

    /// True once [`shutdown`](Self::shutdown) has been called.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop the worker and wait for any in-flight job to finish.
    ///
    /// Jobs still queued are dropped; their submitters see
    /// [`NefitError::QueueClosed`]. Calling this more than once is a no-op.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "request queue worker panicked");
            }
        }
    }
}

impl Drop for RequestQueue {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Worker loop: one job at a time until shutdown.
async fn worker_loop(mut rx: mpsc::Receiver<Job>, shutdown: CancellationToken) {
    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        job.await;
    }

    tracing::debug!("request queue worker stopped");
}
