//! Usage facility abstraction.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{SummaryBucket, TransportKind};

/// Errors reported by a usage facility.
///
/// None of these are fatal: the sampler treats a failing transport kind as
/// contributing zero buckets for the cycle.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The agent lacks access to usage accounting.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The facility has no data for this host or transport.
    #[error("usage facility unavailable: {0}")]
    Unavailable(String),

    /// I/O error while reading accounting data.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Map an I/O error, separating permission failures from the rest.
    pub fn from_io(err: std::io::Error, what: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(what.to_string()),
            std::io::ErrorKind::NotFound => Self::Unavailable(format!("{what} not found")),
            _ => Self::Io(err),
        }
    }
}

/// Host facility that reports network usage buckets per time window.
///
/// Implementations are blocking; the sampler calls them from its own worker
/// thread, never from the poll loop.
pub trait UsageSource: Send + 'static {
    /// Query all buckets for `kind` within `[start, end]`.
    ///
    /// An empty vector means no data and is not an error.
    fn query_summary(
        &mut self,
        kind: TransportKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SummaryBucket>, SourceError>;
}

impl<S: UsageSource + ?Sized> UsageSource for Box<S> {
    fn query_summary(
        &mut self,
        kind: TransportKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SummaryBucket>, SourceError> {
        (**self).query_summary(kind, start, end)
    }
}
