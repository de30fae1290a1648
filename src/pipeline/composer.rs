//! Builds one canonical [`Metric`] from a day's records.

use std::collections::BTreeMap;

use crate::error::MetricsError;
use crate::models::{
    Blockchain, ChainValues, Metric, MetricRecords, ProtocolMetric, TokenRecord, TokenSupply,
};

use super::supply::SupplyClassifier;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComposeOptions {
    /// Attach the source records to the metric.
    pub include_records: bool,
}

#[derive(Debug, Clone)]
pub struct MetricComposer {
    classifier: SupplyClassifier,
}

impl MetricComposer {
    pub fn new(classifier: SupplyClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &SupplyClassifier {
        &self.classifier
    }

    /// Compose the metric for one day.
    ///
    /// All three inputs must be non-empty. The rebase index and price come
    /// from the first protocol metric; the metric's date is that record's date.
    pub fn compose(
        &self,
        token_records: &[TokenRecord],
        token_supplies: &[TokenSupply],
        protocol_metrics: &[ProtocolMetric],
        options: ComposeOptions,
    ) -> Result<Metric, MetricsError> {
        let protocol = match (
            token_records.is_empty(),
            token_supplies.is_empty(),
            protocol_metrics.first(),
        ) {
            (false, false, Some(protocol)) => protocol,
            _ => {
                return Err(MetricsError::upstream(format!(
                    "cannot compose metric from partial data: {} token records, {} token supplies, {} protocol metrics",
                    token_records.len(),
                    token_supplies.len(),
                    protocol_metrics.len()
                )))
            },
        };

        let ohm_index = protocol.current_index;
        let ohm_price = protocol.ohm_price;

        let supply = self.classifier.aggregates(token_supplies, ohm_index)?;

        let (treasury_market_value, treasury_market_value_components) =
            sum_by_chain(token_records, |record| {
                record.category.is_treasury_asset().then_some(record.value)
            });

        let (treasury_liquid_backing, treasury_liquid_backing_components) =
            sum_by_chain(token_records, |record| {
                (record.category.is_treasury_asset() && record.is_liquid)
                    .then_some(record.value_excluding_ohm)
            });

        let g_ohm_backed_supply = safe_ratio(supply.backed.value, ohm_index).unwrap_or(0.0);
        let g_ohm_price = if protocol.g_ohm_price > 0.0 {
            protocol.g_ohm_price
        } else {
            ohm_price * ohm_index
        };

        let (blocks, timestamps) = chain_positions(token_records, token_supplies, protocol_metrics);

        let records = options.include_records.then(|| MetricRecords {
            token_records: token_records.to_vec(),
            token_supplies: token_supplies.to_vec(),
            protocol_metrics: protocol_metrics.to_vec(),
        });

        Ok(Metric {
            date: protocol.date,
            blocks,
            timestamps,
            ohm_index,
            ohm_apy: protocol.current_apy,
            ohm_price,
            g_ohm_price,
            ohm_total_supply: supply.total.value,
            ohm_total_supply_components: supply.total.components,
            ohm_circulating_supply: supply.circulating.value,
            ohm_circulating_supply_components: supply.circulating.components,
            ohm_floating_supply: supply.floating.value,
            ohm_floating_supply_components: supply.floating.components,
            ohm_backed_supply: supply.backed.value,
            ohm_backed_supply_components: supply.backed.components,
            g_ohm_backed_supply,
            s_ohm_circulating_supply: protocol.s_ohm_circulating_supply,
            s_ohm_total_value_locked: protocol.s_ohm_circulating_supply * ohm_price,
            market_cap: ohm_price * supply.circulating.value,
            treasury_market_value,
            treasury_market_value_components,
            treasury_liquid_backing,
            treasury_liquid_backing_components,
            treasury_liquid_backing_per_ohm_floating: safe_ratio(
                treasury_liquid_backing,
                supply.floating.value,
            ),
            treasury_liquid_backing_per_ohm_backed: safe_ratio(
                treasury_liquid_backing,
                supply.backed.value,
            ),
            treasury_liquid_backing_per_g_ohm_backed: safe_ratio(
                treasury_liquid_backing,
                g_ohm_backed_supply,
            ),
            records,
        })
    }
}

/// `numerator / denominator`, or `None` when the denominator is zero or not finite.
pub fn safe_ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 || !denominator.is_finite() {
        return None;
    }
    Some(numerator / denominator)
}

fn sum_by_chain<F>(records: &[TokenRecord], value_of: F) -> (f64, ChainValues)
where
    F: Fn(&TokenRecord) -> Option<f64>,
{
    let mut total = 0.0;
    let mut components = ChainValues::new();

    for record in records {
        let Some(value) = value_of(record) else {
            continue;
        };
        total += value;
        if let Some(blockchain) = record.blockchain {
            *components.entry(blockchain).or_insert(0.0) += value;
        }
    }

    (total, components)
}

/// Highest block and timestamp seen per chain across all record kinds.
fn chain_positions(
    token_records: &[TokenRecord],
    token_supplies: &[TokenSupply],
    protocol_metrics: &[ProtocolMetric],
) -> (BTreeMap<Blockchain, u64>, BTreeMap<Blockchain, u64>) {
    let mut blocks = BTreeMap::new();
    let mut timestamps = BTreeMap::new();

    let positions = token_records
        .iter()
        .map(|r| (r.blockchain, r.block, r.timestamp))
        .chain(token_supplies.iter().map(|s| (s.blockchain, s.block, s.timestamp)))
        .chain(protocol_metrics.iter().map(|m| (m.blockchain, m.block, m.timestamp)));

    for (blockchain, block, timestamp) in positions {
        let Some(blockchain) = blockchain else {
            continue;
        };
        let entry = blocks.entry(blockchain).or_insert(block);
        *entry = (*entry).max(block);
        let entry = timestamps.entry(blockchain).or_insert(timestamp);
        *entry = (*entry).max(timestamp);
    }

    (blocks, timestamps)
}
