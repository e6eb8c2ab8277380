//! Usage sampler: one aggregated view of all transports per poll cycle.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::source::UsageSource;
use super::types::{TransportKind, UsageSample, aggregate};
use super::worker::QueryWorker;

/// Errors that can occur while sampling.
///
/// Facility failures never surface here; they are absorbed per transport.
#[derive(Debug, Error)]
pub enum SamplerError {
    /// Failed to start the query worker thread.
    #[error("failed to spawn query worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// The query worker already has a request in flight.
    #[error("query worker is busy")]
    WorkerBusy,

    /// The query worker exited (source panicked or was shut down).
    #[error("query worker stopped")]
    WorkerStopped,

    /// The source did not answer in time.
    #[error("usage query timed out after {0:?}")]
    QueryTimeout(Duration),

    /// The sampling window cannot be represented.
    #[error("invalid window span: {0:?}")]
    InvalidWindow(Duration),
}

/// Samples the usage facility for a fixed set of transports.
#[derive(Debug)]
pub struct UsageSampler {
    worker: QueryWorker,
    transports: Vec<TransportKind>,
    window_span: chrono::TimeDelta,
}

impl UsageSampler {
    /// Create a sampler and start its query worker.
    ///
    /// # Errors
    /// Returns `SamplerError::InvalidWindow` for an out-of-range span, or
    /// `SamplerError::Spawn` if the worker thread cannot be created.
    pub fn new<S: UsageSource>(
        source: S,
        transports: Vec<TransportKind>,
        window_span: Duration,
    ) -> Result<Self, SamplerError> {
        let span = chrono::TimeDelta::from_std(window_span)
            .ok()
            .filter(|span| Utc::now().checked_sub_signed(*span).is_some())
            .ok_or(SamplerError::InvalidWindow(window_span))?;
        let worker = QueryWorker::spawn(source)?;

        Ok(Self {
            worker,
            transports,
            window_span: span,
        })
    }

    /// Bound each cycle's wait on the usage source (default: 5s, `None` to
    /// wait indefinitely).
    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.worker = self.worker.with_timeout(timeout);
        self
    }

    /// Transports queried each cycle, in query order.
    pub fn transports(&self) -> &[TransportKind] {
        &self.transports
    }

    /// Sample `[now - window_span, now]` across all transports.
    ///
    /// Returns `Ok(None)` when no transport produced a bucket; the caller
    /// skips the rest of the cycle.
    pub async fn sample(&self) -> Result<Option<UsageSample>, SamplerError> {
        let end = Utc::now();
        let start = end
            .checked_sub_signed(self.window_span)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let buckets = self
            .worker
            .query(self.transports.clone(), start, end)
            .await?;

        let Some(aggregate) = aggregate(&buckets) else {
            tracing::trace!("No usage buckets in window");
            return Ok(None);
        };

        tracing::trace!(
            buckets = buckets.len(),
            total_bytes = aggregate.total_bytes,
            "Usage sampled"
        );
        Ok(Some(UsageSample { aggregate, buckets }))
    }

    /// Stop the query worker.
    pub fn shutdown(self) -> Result<(), SamplerError> {
        self.worker.shutdown()
    }
}
