//! Serialized command queue.
//!
//! Radio hardware tolerates exactly one operation at a time; overlapping
//! calls fail in driver-specific ways. Every radio command is therefore
//! funneled through one worker task that runs queued operations strictly in
//! submission order, at most one in flight. Callers wait on a oneshot with a
//! deadline; a command that outlives its deadline stays queued and still
//! executes in order, only the caller stops waiting for it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::transport::RadioError;

/// Errors from enqueued command execution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The caller's deadline expired before the command ran to completion.
    /// The command itself is not cancelled.
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    /// The command ran and failed; the underlying error is passed through
    /// unchanged.
    #[error("Command failed: {0}")]
    Execution(#[source] RadioError),

    /// The queue worker is gone.
    #[error("Command queue closed")]
    Cancelled,
}

type Job = BoxFuture<'static, ()>;

/// FIFO queue executing one command at a time.
pub struct CommandQueue {
    tx: mpsc::UnboundedSender<Job>,
    default_timeout: Duration,
}

impl CommandQueue {
    /// Spawn the worker task. `default_timeout` bounds how long callers wait
    /// for a result; zero means wait forever.
    pub fn new(default_timeout: Duration) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
            }
            debug!("command queue worker stopped");
        });
        Arc::new(Self {
            tx,
            default_timeout,
        })
    }

    /// Enqueue a command and wait for its result under the default timeout.
    pub async fn enqueue<F, Fut, T>(&self, op: F) -> Result<T, QueueError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, RadioError>> + Send + 'static,
        T: Send + 'static,
    {
        self.enqueue_with_timeout(self.default_timeout, op).await
    }

    /// `enqueue` for commands whose only result is success or failure.
    pub async fn enqueue_unit<F, Fut>(&self, op: F) -> Result<(), QueueError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), RadioError>> + Send + 'static,
    {
        self.enqueue(op).await
    }

    /// Enqueue a command with an explicit wait deadline. A deadline of zero
    /// waits indefinitely.
    ///
    /// On timeout the command is NOT removed from the queue: it still runs
    /// in its original position so the radio never sees a half-issued
    /// operation, and its eventual result is discarded.
    pub async fn enqueue_with_timeout<F, Fut, T>(
        &self,
        timeout: Duration,
        op: F,
    ) -> Result<T, QueueError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, RadioError>> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel::<Result<T, RadioError>>();
        let job: Job = Box::pin(async move {
            let result = op().await;
            // Receiver may have stopped waiting; the command ran regardless.
            let _ = result_tx.send(result);
        });
        self.tx.send(job).map_err(|_| QueueError::Cancelled)?;

        let outcome = if timeout.is_zero() {
            result_rx.await.map_err(|_| QueueError::Cancelled)?
        } else {
            match tokio::time::timeout(timeout, result_rx).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => return Err(QueueError::Cancelled),
                Err(_) => return Err(QueueError::Timeout(timeout)),
            }
        };
        outcome.map_err(QueueError::Execution)
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}
