//! Bounded fire-and-forget report queue.
//!
//! The poll loop enqueues each cycle's batch without waiting on the network;
//! one drain task forwards batches to the inner sink in enqueue order. When
//! the collector falls behind and the queue fills, new batches are dropped
//! instead of stalling sampling.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::event::AttributedEvent;
use crate::reporter::{ReportError, ReportSink};

/// Default number of pending batches.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Queue in front of a slower [`ReportSink`].
#[derive(Debug)]
pub struct QueuedReporter {
    tx: mpsc::Sender<Vec<AttributedEvent>>,
    handle: JoinHandle<()>,
    dropped: Arc<AtomicU64>,
}

impl QueuedReporter {
    /// Spawn the drain task on the current Tokio runtime.
    ///
    /// `capacity` is clamped to at least one batch.
    pub fn spawn<S: ReportSink>(inner: S, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Vec<AttributedEvent>>(capacity.max(1));

        let handle = tokio::spawn(async move {
            tracing::debug!("Report queue started");
            while let Some(batch) = rx.recv().await {
                let count = batch.len();
                if let Err(e) = inner.report(batch).await {
                    tracing::warn!(error = %e, events = count, "Failed to report events");
                }
            }
            tracing::debug!("Report queue drained");
        });

        Self {
            tx,
            handle,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Batches dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting batches and wait for the pending ones to be delivered.
    pub async fn shutdown(self) -> Result<(), ReportError> {
        drop(self.tx);
        self.handle
            .await
            .map_err(|e| ReportError::Config(format!("report queue task failed: {e}")))
    }
}

#[async_trait::async_trait]
impl ReportSink for QueuedReporter {
    async fn report(&self, events: Vec<AttributedEvent>) -> Result<(), ReportError> {
        self.tx.try_send(events).map_err(|e| match e {
            TrySendError::Full(batch) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    events = batch.len(),
                    dropped_total = dropped,
                    "Report queue full, dropping batch"
                );
                ReportError::QueueFull
            }
            TrySendError::Closed(_) => ReportError::Closed,
        })
    }
}
