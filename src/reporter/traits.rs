//! Core reporting traits and types.

use thiserror::Error;

use crate::event::AttributedEvent;

/// Errors that can occur while reporting events.
///
/// None of these stop the poll loop; the scheduler logs them and moves on.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Collector answered with a non-success status.
    #[error("collector returned status {0}")]
    Status(u16),

    /// Timeout elapsed.
    #[error("timeout elapsed")]
    Timeout,

    /// Report queue is full; the batch was dropped.
    #[error("report queue full")]
    QueueFull,

    /// Report queue was shut down.
    #[error("report queue closed")]
    Closed,

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),
}

/// Destination for attributed events.
///
/// One call carries all events of one cycle, in cycle order.
#[async_trait::async_trait]
pub trait ReportSink: Send + Sync + 'static {
    /// Deliver one cycle's events.
    async fn report(&self, events: Vec<AttributedEvent>) -> Result<(), ReportError>;
}

#[async_trait::async_trait]
impl<T: ReportSink + ?Sized> ReportSink for std::sync::Arc<T> {
    async fn report(&self, events: Vec<AttributedEvent>) -> Result<(), ReportError> {
        (**self).report(events).await
    }
}
