//! Background query worker owning the usage source.
//!
//! Single-worker pattern: one thread owns the [`UsageSource`] and serves query
//! commands over a bounded MPSC channel, answering each through a oneshot.
//! The poll loop never runs a blocking facility call on its own thread, and no
//! thread is spawned per cycle.

use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use super::source::{SourceError, UsageSource};
use super::types::{TransportKind, UsageBucket};
use super::usage::SamplerError;

/// Pending commands allowed in the channel.
const CHANNEL_CAPACITY: usize = 4;

/// Default bound on waiting for one query (5 seconds).
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Commands sent to the worker thread.
#[derive(Debug)]
pub enum Command {
    /// Query every transport kind over one window.
    Query {
        kinds: Vec<TransportKind>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        reply: oneshot::Sender<Vec<UsageBucket>>,
    },
    /// Graceful shutdown.
    Shutdown,
}

/// Handle to the query worker thread.
#[derive(Debug)]
pub struct QueryWorker {
    tx: SyncSender<Command>,
    handle: Option<JoinHandle<()>>,
    timeout: Option<Duration>,
}

impl QueryWorker {
    /// Spawn the worker thread, moving `source` into it.
    pub fn spawn<S: UsageSource>(source: S) -> Result<Self, SamplerError> {
        let (tx, rx) = mpsc::sync_channel(CHANNEL_CAPACITY);
        let actor = WorkerActor {
            source,
            rx,
            warned: HashSet::new(),
        };
        let handle = thread::Builder::new()
            .name("usage-query".to_string())
            .spawn(move || actor.run())
            .map_err(SamplerError::Spawn)?;

        Ok(Self {
            tx,
            handle: Some(handle),
            timeout: Some(DEFAULT_QUERY_TIMEOUT),
        })
    }

    /// Set how long [`query`](Self::query) waits for the source to answer.
    ///
    /// `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Query all `kinds` and wait for the buckets.
    ///
    /// Buckets are returned in transport order, then in the order the source
    /// enumerated them. A source that does not answer within the timeout
    /// yields `SamplerError::QueryTimeout`; its late reply is discarded.
    pub async fn query(
        &self,
        kinds: Vec<TransportKind>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageBucket>, SamplerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .try_send(Command::Query {
                kinds,
                start,
                end,
                reply,
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => SamplerError::WorkerBusy,
                TrySendError::Disconnected(_) => SamplerError::WorkerStopped,
            })?;

        let reply = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, rx)
                .await
                .map_err(|_| SamplerError::QueryTimeout(limit))?,
            None => rx.await,
        };
        reply.map_err(|_| SamplerError::WorkerStopped)
    }

    /// Stop the worker and wait for its thread to exit.
    pub fn shutdown(mut self) -> Result<(), SamplerError> {
        // A full channel still disconnects once `tx` is dropped below.
        let _ = self.tx.try_send(Command::Shutdown);
        let handle = self.handle.take();
        drop(self);
        if let Some(handle) = handle {
            handle.join().map_err(|_| SamplerError::WorkerStopped)?;
        }
        Ok(())
    }
}

struct WorkerActor<S> {
    source: S,
    rx: Receiver<Command>,
    warned: HashSet<TransportKind>,
}

impl<S: UsageSource> WorkerActor<S> {
    fn run(mut self) {
        tracing::debug!("Usage query worker started");

        while let Ok(cmd) = self.rx.recv() {
            match cmd {
                Command::Query {
                    kinds,
                    start,
                    end,
                    reply,
                } => {
                    let buckets = self.query(&kinds, start, end);
                    if reply.send(buckets).is_err() {
                        tracing::debug!("Query requester dropped before reply");
                    }
                }
                Command::Shutdown => break,
            }
        }

        tracing::debug!("Usage query worker stopped");
    }

    fn query(
        &mut self,
        kinds: &[TransportKind],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<UsageBucket> {
        let mut buckets = Vec::new();
        for &kind in kinds {
            match self.source.query_summary(kind, start, end) {
                Ok(summaries) => {
                    self.warned.remove(&kind);
                    buckets.extend(
                        summaries
                            .iter()
                            .map(|summary| UsageBucket::from_summary(summary, kind)),
                    );
                }
                Err(e) => self.report_failure(kind, &e),
            }
        }
        buckets
    }

    /// Warn once per outage, then stay quiet until the kind recovers.
    fn report_failure(&mut self, kind: TransportKind, err: &SourceError) {
        if self.warned.insert(kind) {
            tracing::warn!(transport = %kind, error = %err, "Usage query failed, treating as no data");
        } else {
            tracing::trace!(transport = %kind, error = %err, "Usage query still failing");
        }
    }
}
