//! Usage Sampler
//!
//! Queries the host's network accounting for every configured transport over
//! a sliding window and aggregates the buckets into one per-cycle total.
//!
//! # Architecture
//!
//! - [`UsageSource`]: Blocking facility seam (production: [`ProcNetDevSource`])
//! - [`QueryWorker`]: Reusable background thread that owns the source
//! - [`UsageSampler`]: Async facade used by the poll loop
//!
//! # Example
//!
//! ```rust,no_run
//! use netmonitor::sampler::{ProcNetDevSource, TransportKind, UsageSampler};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), netmonitor::sampler::SamplerError> {
//! let sampler = UsageSampler::new(
//!     ProcNetDevSource::new(None),
//!     vec![TransportKind::Wifi, TransportKind::Cellular],
//!     Duration::from_secs(100),
//! )?;
//! if let Some(sample) = sampler.sample().await? {
//!     println!("{} bytes", sample.aggregate.total_bytes);
//! }
//! # Ok(())
//! # }
//! ```

mod procfs;
mod source;
mod types;
mod usage;
mod worker;

pub use procfs::{InterfaceCounters, ProcNetDevSource, parse_net_dev, parse_status_uid};
pub use source::{SourceError, UsageSource};
pub use types::{
    STATE_ALL, SummaryBucket, TAG_NONE, TransportKind, UsageAggregate, UsageBucket, UsageSample,
    aggregate,
};
pub use usage::{SamplerError, UsageSampler};
pub use worker::{DEFAULT_QUERY_TIMEOUT, QueryWorker};
