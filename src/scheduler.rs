//! Polling scheduler driving the sample → attribute → report cycle.
//!
//! Each cycle starts by recording a monotonic timestamp; after the hand-off
//! the scheduler sleeps only for what is left of the cadence, so slow cycles
//! do not push later ones back. Timing uses [`tokio::time::Instant`], which
//! follows a paused test clock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep, timeout};

use crate::attribution::{CallSiteAttributor, monitor_scope};
use crate::event::assemble;
use crate::reporter::ReportSink;
use crate::sampler::UsageSampler;

/// Default cadence between cycle starts (100 milliseconds).
pub const DEFAULT_CADENCE: Duration = Duration::from_millis(100);

/// Default pause after a cycle that found no usage (50 milliseconds).
pub const DEFAULT_EMPTY_BACKOFF: Duration = Duration::from_millis(50);

/// Default bound on handing events to the sink (50 milliseconds).
pub const DEFAULT_HANDOFF_TIMEOUT: Duration = Duration::from_millis(50);

/// Timing parameters of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Target time between the starts of consecutive cycles.
    pub cadence: Duration,
    /// Delay before retrying after an empty sample. Zero retries at once.
    pub empty_backoff: Duration,
    /// Upper bound on one hand-off to the sink; keep below the cadence.
    pub handoff_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cadence: DEFAULT_CADENCE,
            empty_backoff: DEFAULT_EMPTY_BACKOFF,
            handoff_timeout: DEFAULT_HANDOFF_TIMEOUT,
        }
    }
}

impl SchedulerConfig {
    pub fn with_cadence(mut self, cadence: Duration) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn with_empty_backoff(mut self, backoff: Duration) -> Self {
        self.empty_backoff = backoff;
        self
    }

    pub fn with_handoff_timeout(mut self, timeout: Duration) -> Self {
        self.handoff_timeout = timeout;
        self
    }
}

/// What happened during one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The facility had no usage; nothing was attributed or reported.
    Empty,
    /// Usage was measured but no thread ran tracked code.
    NoAttribution,
    /// Events were handed to the sink.
    Reported { events: usize },
    /// The sink failed or timed out; the events are lost.
    ReportFailed { events: usize },
}

/// Result of one cycle plus the delay before the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub elapsed: Duration,
    pub next_delay: Duration,
}

/// Remaining part of the cadence after `elapsed`, never negative.
pub fn residual_sleep(cadence: Duration, elapsed: Duration) -> Duration {
    cadence.saturating_sub(elapsed)
}

/// Fixed-cadence poll loop.
pub struct PollingScheduler {
    sampler: UsageSampler,
    attributor: CallSiteAttributor,
    sink: Arc<dyn ReportSink>,
    config: SchedulerConfig,
}

impl std::fmt::Debug for PollingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingScheduler")
            .field("sampler", &self.sampler)
            .field("attributor", &self.attributor)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PollingScheduler {
    pub fn new(
        sampler: UsageSampler,
        attributor: CallSiteAttributor,
        sink: impl ReportSink,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            sampler,
            attributor,
            sink: Arc::new(sink),
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Execute a single cycle.
    ///
    /// Never fails: sampler, attribution and reporting problems are logged and
    /// folded into the outcome.
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle_start = Instant::now();

        let sample = match self.sampler.sample().await {
            Ok(Some(sample)) => sample,
            Ok(None) => {
                return CycleReport {
                    outcome: CycleOutcome::Empty,
                    elapsed: cycle_start.elapsed(),
                    next_delay: self.config.empty_backoff,
                };
            }
            Err(e) => {
                tracing::error!(error = %e, "Usage sampling failed");
                return CycleReport {
                    outcome: CycleOutcome::Empty,
                    elapsed: cycle_start.elapsed(),
                    next_delay: self.config.empty_backoff.max(self.config.cadence),
                };
            }
        };

        let records = self.attributor.attribute();
        let events = assemble(&sample.aggregate, &records);

        let outcome = if events.is_empty() {
            tracing::trace!(
                total_bytes = sample.aggregate.total_bytes,
                "No tracked call sites"
            );
            CycleOutcome::NoAttribution
        } else {
            self.hand_off(events).await
        };

        let elapsed = cycle_start.elapsed();
        CycleReport {
            outcome,
            elapsed,
            next_delay: residual_sleep(self.config.cadence, elapsed),
        }
    }

    async fn hand_off(&self, events: Vec<crate::event::AttributedEvent>) -> CycleOutcome {
        let count = events.len();
        match timeout(self.config.handoff_timeout, self.sink.report(events)).await {
            Ok(Ok(())) => {
                tracing::debug!(events = count, "Cycle events handed off");
                CycleOutcome::Reported { events: count }
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, events = count, "Report failed");
                CycleOutcome::ReportFailed { events: count }
            }
            Err(_) => {
                tracing::warn!(
                    events = count,
                    timeout_ms = self.config.handoff_timeout.as_millis(),
                    "Report timed out"
                );
                CycleOutcome::ReportFailed { events: count }
            }
        }
    }

    /// Run the loop on the current task until the process exits.
    ///
    /// The thread is only flagged as the monitor while each snapshot is taken;
    /// use [`spawn`](Self::spawn) to flag a dedicated thread for its lifetime.
    pub async fn run(self) {
        let (_stop, stop_rx) = watch::channel(false);
        self.run_until(stop_rx).await;
    }

    /// Run the loop until `stop` becomes `true` or its sender is dropped.
    pub async fn run_until(self, mut stop: watch::Receiver<bool>) {
        tracing::info!(
            cadence_ms = self.config.cadence.as_millis(),
            transports = ?self.sampler.transports(),
            tracked = ?self.attributor.tracked_prefixes(),
            "Polling scheduler started"
        );

        loop {
            if *stop.borrow() {
                break;
            }

            let report = self.run_cycle().await;
            tracing::trace!(
                outcome = ?report.outcome,
                elapsed_us = report.elapsed.as_micros(),
                next_delay_us = report.next_delay.as_micros(),
                "Cycle finished"
            );

            if report.next_delay.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                _ = sleep(report.next_delay) => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        if let Err(e) = self.sampler.shutdown() {
            tracing::warn!(error = %e, "Usage query worker did not stop cleanly");
        }
        tracing::info!("Polling scheduler stopped");
    }

    /// Run the loop on a dedicated OS thread with its own runtime.
    ///
    /// The thread is flagged as the monitor for its whole lifetime.
    pub fn spawn(self) -> std::io::Result<SchedulerHandle> {
        let (stop, stop_rx) = watch::channel(false);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let thread = std::thread::Builder::new()
            .name("netmonitor-poll".to_string())
            .spawn(move || {
                let _monitor = monitor_scope();
                runtime.block_on(self.run_until(stop_rx));
            })?;

        Ok(SchedulerHandle { stop, thread })
    }
}

/// Handle to a scheduler running on its own thread.
#[derive(Debug)]
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    thread: std::thread::JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop to stop and wait for the thread to exit.
    pub fn stop(self) -> std::thread::Result<()> {
        let _ = self.stop.send(true);
        self.thread.join()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}
