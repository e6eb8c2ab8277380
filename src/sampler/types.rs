//! Core data types for the usage sampler.
//!
//! - [`TransportKind`]: Network transport a bucket was measured on
//! - [`SummaryBucket`]: Raw bucket as reported by a [`UsageSource`](super::UsageSource)
//! - [`UsageBucket`]: Normalized bucket owned by one poll cycle
//! - [`UsageAggregate`] / [`UsageSample`]: Per-cycle totals handed to attribution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Foreground state code for sources that do not split usage by state.
pub const STATE_ALL: i32 = -1;

/// Tag code for traffic without a socket tag.
pub const TAG_NONE: i32 = 0;

/// Network transport kind.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TransportKind {
    /// Wireless LAN interfaces.
    Wifi,
    /// Mobile data interfaces.
    Cellular,
    /// Wired interfaces.
    Ethernet,
    /// Tunnel interfaces.
    Vpn,
}

impl TransportKind {
    /// Classify a kernel interface name.
    ///
    /// Returns `None` for loopback and unrecognized interfaces.
    pub fn classify(interface: &str) -> Option<Self> {
        const PREFIXES: &[(&str, TransportKind)] = &[
            ("wl", TransportKind::Wifi),
            ("rmnet", TransportKind::Cellular),
            ("wwan", TransportKind::Cellular),
            ("ccmni", TransportKind::Cellular),
            ("ppp", TransportKind::Cellular),
            ("eth", TransportKind::Ethernet),
            ("en", TransportKind::Ethernet),
            ("tun", TransportKind::Vpn),
            ("tap", TransportKind::Vpn),
            ("wg", TransportKind::Vpn),
        ];

        PREFIXES
            .iter()
            .find(|(prefix, _)| interface.starts_with(prefix))
            .map(|(_, kind)| *kind)
    }
}

/// A bucket exactly as the usage facility reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryBucket {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub state: i32,
    pub uid: u32,
    pub tag: i32,
}

/// One interval of network usage, normalized for a single poll cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageBucket {
    pub byte_count: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub window_start: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub window_end: DateTime<Utc>,
    pub state: i32,
    pub owner_id: u32,
    pub transport_kind: TransportKind,
    pub tag: i32,
}

impl UsageBucket {
    /// Normalize a raw bucket returned for `transport_kind`.
    pub fn from_summary(summary: &SummaryBucket, transport_kind: TransportKind) -> Self {
        Self {
            byte_count: summary.rx_bytes.saturating_add(summary.tx_bytes),
            window_start: summary.start,
            window_end: summary.end,
            state: summary.state,
            owner_id: summary.uid,
            transport_kind,
            tag: summary.tag,
        }
    }
}

/// Totals shared by every event of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageAggregate {
    pub total_bytes: u64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

/// Output of one non-empty sampling pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageSample {
    pub aggregate: UsageAggregate,
    pub buckets: Vec<UsageBucket>,
}

/// Aggregate buckets in enumeration order.
///
/// The window bounds come from the first bucket; later buckets only add to
/// the byte total. Returns `None` when there is nothing to aggregate.
pub fn aggregate(buckets: &[UsageBucket]) -> Option<UsageAggregate> {
    let first = buckets.first()?;
    let total_bytes = buckets
        .iter()
        .fold(0u64, |acc, b| acc.saturating_add(b.byte_count));

    Some(UsageAggregate {
        total_bytes,
        window_start: first.window_start,
        window_end: first.window_end,
    })
}
