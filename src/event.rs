//! Attributed events: the unit handed to the reporting sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attribution::AttributionRecord;
use crate::sampler::UsageAggregate;

/// Network usage attributed to one call site.
///
/// All events of a cycle share the window bounds and byte total of that
/// cycle's aggregate; only the attribution fields differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributedEvent {
    /// `declaringUnit.entryPoint`.
    pub fully_qualified_name: String,
    pub entry_point: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub window_start: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub window_end: DateTime<Utc>,
    pub total_bytes: u64,
    pub call_stack_text: String,
}

impl AttributedEvent {
    pub fn new(aggregate: &UsageAggregate, record: &AttributionRecord) -> Self {
        Self {
            fully_qualified_name: format!("{}.{}", record.declaring_unit, record.entry_point),
            entry_point: record.entry_point.clone(),
            window_start: aggregate.window_start,
            window_end: aggregate.window_end,
            total_bytes: aggregate.total_bytes,
            call_stack_text: record.call_stack_text.clone(),
        }
    }
}

/// Join a cycle's aggregate with its attribution records.
///
/// Pure: one event per record, in record order. No records, no events.
pub fn assemble(aggregate: &UsageAggregate, records: &[AttributionRecord]) -> Vec<AttributedEvent> {
    records
        .iter()
        .map(|record| AttributedEvent::new(aggregate, record))
        .collect()
}
