//! Flattens per-source record arrays into one ordered sequence.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::{SourceRecord, SourceRecords};

/// Normalization switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Stamp each record with its source if the upstream left it blank.
    pub tag_blockchain: bool,
    /// Keep only the records at the highest block of each day, per source.
    pub latest_block: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            tag_blockchain: true,
            latest_block: true,
        }
    }
}

/// Flatten `sources` in map order. Order within a source is preserved.
pub fn flatten_records<T>(sources: SourceRecords<T>, options: NormalizeOptions) -> Vec<T>
where
    T: SourceRecord,
{
    let capacity = sources.values().map(Vec::len).sum();
    let mut flattened = Vec::with_capacity(capacity);

    for (blockchain, records) in sources {
        let records = if options.latest_block {
            filter_latest_block_by_day(records)
        } else {
            records
        };

        for mut record in records {
            if options.tag_blockchain && record.blockchain().is_none() {
                record.set_blockchain(blockchain);
            }
            flattened.push(record);
        }
    }

    flattened
}

/// Keep, for every day, only the records at that day's maximum block.
///
/// Subgraphs can index several snapshots in one day; the last one wins.
/// Records sharing the maximum block are all kept.
pub fn filter_latest_block_by_day<T>(records: Vec<T>) -> Vec<T>
where
    T: SourceRecord,
{
    let mut latest_blocks: HashMap<NaiveDate, u64> = HashMap::new();
    for record in &records {
        let block = latest_blocks.entry(record.date()).or_insert(record.block());
        if record.block() > *block {
            *block = record.block();
        }
    }

    records
        .into_iter()
        .filter(|record| latest_blocks.get(&record.date()) == Some(&record.block()))
        .collect()
}
