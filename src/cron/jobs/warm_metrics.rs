//! Job to keep the metrics cache warm.
//!
//! Recomputes the paginated metrics for the configured range and the latest
//! metric, bypassing any cached copy, so that readers always find an entry
//! younger than the cache TTL.

use anyhow::{Context, Result};
use log::info;

use crate::config::WarmerSettings;
use crate::pipeline::{Aggregator, MetricsQuery, SnapshotQuery};
use crate::utils::{format_date, sub_days, today_utc};

pub async fn run(aggregator: &Aggregator, settings: &WarmerSettings) -> Result<()> {
    info!("Starting warm_metrics job...");

    let start = std::time::Instant::now();
    let start_date = start_date(settings);

    let query = MetricsQuery {
        start_date: start_date.clone(),
        date_offset: None,
        cross_chain_data_complete: settings.cross_chain_data_complete,
        include_records: false,
        ignore_cache: true,
    };
    let metrics = aggregator
        .paginated_metrics(&query)
        .await
        .with_context(|| format!("Failed to compute metrics from {}", start_date))?;

    let latest = aggregator
        .latest_metric(&SnapshotQuery {
            include_records: false,
            ignore_cache: true,
        })
        .await
        .context("Failed to compute latest metric")?;

    info!(
        "Completed warm_metrics job in {:?} ({} days from {}, latest {})",
        start.elapsed(),
        metrics.len(),
        start_date,
        latest.date
    );
    Ok(())
}

/// Configured start date, or `lookback_days` before today.
fn start_date(settings: &WarmerSettings) -> String {
    match &settings.start_date {
        Some(date) => date.clone(),
        None => format_date(sub_days(today_utc(), settings.lookback_days)),
    }
}
