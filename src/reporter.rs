//! Reporting Layer
//!
//! Delivers attributed events to the remote collector.
//!
//! - [`ReportSink`]: Core trait for event destinations
//! - [`HttpReporter`]: JSON over HTTP POST
//! - [`QueuedReporter`]: Bounded queue that decouples the poll loop from the network
//!
//! # Example
//!
//! ```rust,no_run
//! use netmonitor::reporter::{HttpReporter, QueuedReporter};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), netmonitor::reporter::ReportError> {
//! let http = HttpReporter::new("http://10.0.2.2:8080/addEvent", Duration::from_secs(5))?;
//! let queue = QueuedReporter::spawn(http, 64);
//! // scheduler hands batches to `queue`
//! queue.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod http;
mod queue;
mod traits;

pub use http::{DEFAULT_REQUEST_TIMEOUT, HttpReporter};
pub use queue::{DEFAULT_QUEUE_CAPACITY, QueuedReporter};
pub use traits::{ReportError, ReportSink};
