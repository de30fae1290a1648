use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::{ProtocolMetric, TokenRecord, TokenSupply};

/// Records for a single day, gathered across every source.
///
/// Lives only for the duration of one aggregation call.
#[derive(Debug, Clone, Default)]
pub struct RecordContainer {
    pub token_records: Vec<TokenRecord>,
    pub token_supplies: Vec<TokenSupply>,
    pub protocol_metrics: Vec<ProtocolMetric>,
}

impl RecordContainer {
    /// True when every record kind has at least one entry for the day.
    pub fn is_complete(&self) -> bool {
        !self.token_records.is_empty()
            && !self.token_supplies.is_empty()
            && !self.protocol_metrics.is_empty()
    }

    /// Short description of which record kinds are missing, for logging.
    pub fn missing_kinds(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.token_records.is_empty() {
            missing.push("token records");
        }
        if self.token_supplies.is_empty() {
            missing.push("token supplies");
        }
        if self.protocol_metrics.is_empty() {
            missing.push("protocol metrics");
        }
        missing
    }
}

/// Group flattened records by day. Relative order within each day is preserved.
pub fn group_by_date(
    token_records: Vec<TokenRecord>,
    token_supplies: Vec<TokenSupply>,
    protocol_metrics: Vec<ProtocolMetric>,
) -> BTreeMap<NaiveDate, RecordContainer> {
    let mut by_date: BTreeMap<NaiveDate, RecordContainer> = BTreeMap::new();

    for record in token_records {
        by_date.entry(record.date).or_default().token_records.push(record);
    }

    for supply in token_supplies {
        by_date.entry(supply.date).or_default().token_supplies.push(supply);
    }

    for metric in protocol_metrics {
        by_date.entry(metric.date).or_default().protocol_metrics.push(metric);
    }

    by_date
}
