pub mod aggregator;
pub mod completeness;
pub mod composer;
pub mod normalizer;
pub mod paginator;
pub mod supply;

pub use aggregator::{Aggregator, MetricsQuery, RecordsQuery, SnapshotQuery};
pub use completeness::CompletenessFilter;
pub use composer::{ComposeOptions, MetricComposer};
pub use normalizer::{flatten_records, NormalizeOptions};
pub use paginator::{DateWindow, DateWindowPaginator};
pub use supply::{SupplyClassifier, TokenIdentities};
