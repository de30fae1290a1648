//! Cross-chain date consistency.
//!
//! Subgraphs index at different speeds. Without trimming, the newest day can
//! contain one chain's records and not another's, which produces one-sided
//! metrics. The filter finds the most recent day both reference sources have
//! reported and drops everything after it.

use std::collections::{BTreeSet, HashSet};

use chrono::NaiveDate;
use log::debug;

use crate::models::{Blockchain, SourceRecord, SourceRecords};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletenessFilter {
    primary: Blockchain,
    secondary: Blockchain,
}

impl Default for CompletenessFilter {
    /// Ethereum and Arbitrum carry the native token supply.
    fn default() -> Self {
        Self::new(Blockchain::Ethereum, Blockchain::Arbitrum)
    }
}

impl CompletenessFilter {
    pub fn new(primary: Blockchain, secondary: Blockchain) -> Self {
        Self { primary, secondary }
    }

    pub fn sources(&self) -> (Blockchain, Blockchain) {
        (self.primary, self.secondary)
    }

    /// Most recent day present in both reference sources, if any.
    pub fn latest_complete_date<T>(&self, sources: &SourceRecords<T>) -> Option<NaiveDate>
    where
        T: SourceRecord,
    {
        let primary_days: BTreeSet<NaiveDate> = sources
            .get(&self.primary)
            .map(|records| records.iter().map(SourceRecord::date).collect())
            .unwrap_or_default();

        let secondary_days: HashSet<NaiveDate> = sources
            .get(&self.secondary)
            .map(|records| records.iter().map(SourceRecord::date).collect())
            .unwrap_or_default();

        primary_days
            .iter()
            .rev()
            .find(|day| secondary_days.contains(day))
            .copied()
    }

    /// Trim every source to the latest complete day.
    ///
    /// When the reference sources share no day (including when either is
    /// empty) every source comes back empty.
    pub fn apply<T>(&self, sources: SourceRecords<T>) -> SourceRecords<T>
    where
        T: SourceRecord,
    {
        let cutoff = self.latest_complete_date(&sources);
        debug!(
            "Latest complete date for {}/{}: {:?}",
            self.primary, self.secondary, cutoff
        );
        trim_to_cutoff(sources, cutoff)
    }
}

/// Drop every record dated after `cutoff`. `None` empties every source.
pub fn trim_to_cutoff<T>(sources: SourceRecords<T>, cutoff: Option<NaiveDate>) -> SourceRecords<T>
where
    T: SourceRecord,
{
    sources
        .into_iter()
        .map(|(blockchain, records)| {
            let kept = match cutoff {
                Some(cutoff) => records
                    .into_iter()
                    .filter(|record| record.date() <= cutoff)
                    .collect(),
                None => Vec::new(),
            };
            (blockchain, kept)
        })
        .collect()
}
