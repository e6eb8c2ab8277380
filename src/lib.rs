//! Netmonitor - per-call-site network usage attribution
//!
//! This crate samples the host process's network usage on a fixed cadence,
//! attributes each non-empty sample to the tracked call sites currently
//! executing on live threads, and reports the resulting events to a remote
//! collector. It can be used as a library inside an instrumented program, or
//! run as a standalone agent with the `netmonitor` executable.
//!
//! # Architecture
//!
//! - **Sampler**: Windowed usage queries on a reusable worker thread
//! - **Attribution**: Shadow call stacks and tracked-frame selection
//! - **Event**: Joins one aggregate with every attribution record
//! - **Reporter**: JSON over HTTP behind a bounded queue
//! - **Scheduler**: Fixed-cadence poll loop with drift compensation
//!
//! # Example
//!
//! ```rust,no_run
//! use netmonitor::{
//!     CallSiteAttributor, CallSiteRegistry, HttpReporter, PollingScheduler,
//!     ProcNetDevSource, QueuedReporter, SchedulerConfig, TransportKind, UsageSampler,
//! };
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sampler = UsageSampler::new(
//!         ProcNetDevSource::new(None),
//!         vec![TransportKind::Wifi, TransportKind::Cellular],
//!         Duration::from_secs(100),
//!     )?;
//!     let attributor = CallSiteAttributor::new(CallSiteRegistry::new(), ["com.app"]);
//!     let http = HttpReporter::new("http://10.0.2.2:8080/addEvent", Duration::from_secs(5))?;
//!     let queue = QueuedReporter::spawn(http, 64);
//!
//!     PollingScheduler::new(sampler, attributor, queue, SchedulerConfig::default())
//!         .run()
//!         .await;
//!     Ok(())
//! }
//! ```

pub mod attribution;
pub mod config;
pub mod event;
pub mod reporter;
pub mod sampler;
pub mod scheduler;

pub use attribution::{
    AttributionRecord, CallSiteAttributor, CallSiteRegistry, FrameGuard, StackFrame,
    ThreadIntrospector, ThreadSnapshot, enter, monitor_scope,
};
pub use config::{AppConfig, ConfigError, MonitorConfig, ReporterConfig};
pub use event::{AttributedEvent, assemble};
pub use reporter::{HttpReporter, QueuedReporter, ReportError, ReportSink};
pub use sampler::{
    ProcNetDevSource, SamplerError, SourceError, SummaryBucket, TransportKind, UsageAggregate,
    UsageBucket, UsageSample, UsageSampler, UsageSource,
};
pub use scheduler::{
    CycleOutcome, CycleReport, PollingScheduler, SchedulerConfig, SchedulerHandle,
};
