//! Cron scheduler for periodic background tasks.
//!
//! Runs jobs like:
//! - Recomputing the paginated and latest metrics into the cache

use std::sync::Arc;

use anyhow::Result;
use log::{error, info};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::config::WarmerSettings;
use crate::pipeline::Aggregator;

use super::jobs;

/// Cron scheduler that manages periodic background jobs.
pub struct CronScheduler {
    aggregator: Arc<Aggregator>,
    settings: Arc<WarmerSettings>,
}

impl CronScheduler {
    pub fn new(aggregator: Arc<Aggregator>, settings: WarmerSettings) -> Self {
        Self {
            aggregator,
            settings: Arc::new(settings),
        }
    }

    /// Starts the cron scheduler and runs until cancellation.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        // Register all jobs
        let registered = self.register_jobs(&scheduler).await?;
        if registered == 0 {
            info!("No cron jobs enabled, cron scheduler idle");
            cancellation_token.cancelled().await;
            return Ok(());
        }

        // Start the scheduler
        scheduler.start().await?;
        info!("Cron scheduler started with {} jobs", registered);

        // Wait for cancellation
        cancellation_token.cancelled().await;
        info!("Cron scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }

    /// Adds every enabled job to `scheduler` and returns how many were added.
    async fn register_jobs(&self, scheduler: &JobScheduler) -> Result<usize> {
        let mut registered = 0;

        if self.settings.enabled {
            self.register_warm_metrics_job(scheduler).await?;
            registered += 1;
        } else {
            info!("Cache warming disabled, warm_metrics job not registered");
        }

        Ok(registered)
    }

    async fn register_warm_metrics_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let aggregator = self.aggregator.clone();
        let settings = self.settings.clone();
        let interval = self.settings.interval_secs;

        let job = Job::new_repeated_async(
            std::time::Duration::from_secs(interval),
            move |_uuid, _lock| {
                let aggregator = aggregator.clone();
                let settings = settings.clone();
                Box::pin(async move {
                    if let Err(e) = jobs::warm_metrics::run(&aggregator, &settings).await {
                        error!("Failed to warm metrics cache: {:#}", e);
                    }
                })
            },
        )?;

        scheduler.add(job).await?;
        info!("Registered warm_metrics job (every {}s)", interval);
        Ok(())
    }
}
