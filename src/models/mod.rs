use std::collections::BTreeMap;

use chrono::NaiveDate;

pub mod blockchain;
pub mod container;
pub mod metric;
pub mod protocol_metric;
pub mod token_record;
pub mod token_supply;

pub use blockchain::Blockchain;
pub use container::{group_by_date, RecordContainer};
pub use metric::{ChainValues, Metric, MetricRecords};
pub use protocol_metric::ProtocolMetric;
pub use token_record::{TokenCategory, TokenRecord};
pub use token_supply::{SupplyCategory, TokenSupply};

/// Per-source record arrays as returned by the upstream, one entry per blockchain.
pub type SourceRecords<T> = BTreeMap<Blockchain, Vec<T>>;

/// Common view over the dated, block-stamped records every subgraph publishes.
pub trait SourceRecord {
    fn date(&self) -> NaiveDate;
    fn block(&self) -> u64;
    fn blockchain(&self) -> Option<Blockchain>;
    fn set_blockchain(&mut self, blockchain: Blockchain);
}
