//! Linux procfs usage source.
//!
//! Reads per-interface byte counters from `/proc/<pid>/net/dev` and turns the
//! growth since the previous read into one bucket per interface.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::source::{SourceError, UsageSource};
use super::types::{STATE_ALL, SummaryBucket, TAG_NONE, TransportKind};

/// Byte counters of one interface line in `net/dev`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, Copy)]
struct Baseline {
    rx_bytes: u64,
    tx_bytes: u64,
    read_at: DateTime<Utc>,
}

/// Usage source backed by `/proc/<pid>/net/dev`.
///
/// Counters are cumulative, so the first read of an interface only records a
/// baseline. A counter that goes backwards (interface reset) restarts it.
#[derive(Debug)]
pub struct ProcNetDevSource {
    root: PathBuf,
    baselines: HashMap<String, Baseline>,
    uid: Option<u32>,
}

impl ProcNetDevSource {
    /// Source for the given process, or the agent itself when `pid` is `None`.
    pub fn new(pid: Option<u32>) -> Self {
        let root = match pid {
            Some(pid) => PathBuf::from(format!("/proc/{pid}")),
            None => PathBuf::from("/proc/self"),
        };
        Self::with_root(root)
    }

    /// Source reading from an arbitrary procfs-like directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            baselines: HashMap::new(),
            uid: None,
        }
    }

    /// Directory this source reads from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn owner_uid(&mut self) -> u32 {
        if let Some(uid) = self.uid {
            return uid;
        }
        let path = self.root.join("status");
        let uid = match std::fs::read_to_string(&path) {
            Ok(content) => parse_status_uid(&content),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Cannot read process status");
                None
            }
        };
        let uid = uid.unwrap_or(0);
        self.uid = Some(uid);
        uid
    }
}

impl UsageSource for ProcNetDevSource {
    fn query_summary(
        &mut self,
        kind: TransportKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SummaryBucket>, SourceError> {
        let path = self.root.join("net/dev");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| SourceError::from_io(e, &path.display().to_string()))?;
        let uid = self.owner_uid();

        let mut buckets = Vec::new();
        for counters in parse_net_dev(&content) {
            if TransportKind::classify(&counters.name) != Some(kind) {
                continue;
            }

            let current = Baseline {
                rx_bytes: counters.rx_bytes,
                tx_bytes: counters.tx_bytes,
                read_at: end,
            };
            let Some(previous) = self.baselines.insert(counters.name.clone(), current) else {
                tracing::debug!(interface = %counters.name, "Recorded interface baseline");
                continue;
            };

            if current.rx_bytes < previous.rx_bytes || current.tx_bytes < previous.tx_bytes {
                tracing::debug!(interface = %counters.name, "Interface counters reset");
                continue;
            }

            let rx_bytes = current.rx_bytes - previous.rx_bytes;
            let tx_bytes = current.tx_bytes - previous.tx_bytes;
            if rx_bytes == 0 && tx_bytes == 0 {
                continue;
            }

            buckets.push(SummaryBucket {
                rx_bytes,
                tx_bytes,
                start: previous.read_at.max(start),
                end,
                state: STATE_ALL,
                uid,
                tag: TAG_NONE,
            });
        }

        Ok(buckets)
    }
}

/// Parse the contents of a `net/dev` file.
///
/// Malformed lines are skipped.
pub fn parse_net_dev(content: &str) -> Vec<InterfaceCounters> {
    content
        .lines()
        .skip(2)
        .filter_map(|line| {
            let (name, stats) = line.split_once(':')?;
            let fields: Vec<u64> = stats
                .split_whitespace()
                .map(str::parse)
                .collect::<Result<_, _>>()
                .ok()?;
            if fields.len() < 16 {
                return None;
            }
            Some(InterfaceCounters {
                name: name.trim().to_string(),
                rx_bytes: fields[0],
                tx_bytes: fields[8],
            })
        })
        .collect()
}

/// Extract the real uid from the `Uid:` line of a `status` file.
pub fn parse_status_uid(content: &str) -> Option<u32> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|uid| uid.parse().ok())
}
