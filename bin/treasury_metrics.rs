use std::sync::Arc;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use treasury_metrics::{
    Aggregator, CronScheduler, HttpUpstream, KeyValueStore, MemoryStore, RedisStore, Settings,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .context("Failed to initialize logger")?;

    // Load configuration
    let settings = Settings::new()
        .context("Failed to load config. Please ensure upstream.url is set")?;

    let upstream = HttpUpstream::new(&settings.upstream)
        .with_context(|| format!("Invalid upstream url {}", settings.upstream.url))?;

    let store: Arc<dyn KeyValueStore> = match &settings.cache.url {
        Some(url) => Arc::new(
            RedisStore::connect(url, settings.cache.password.as_deref())
                .await
                .context("Failed to connect to cache store")?,
        ),
        None => {
            info!(
                "No cache.url configured, caching in process (max {} keys)",
                settings.cache.max_entries
            );
            Arc::new(MemoryStore::with_capacity(settings.cache.max_entries))
        },
    };

    let aggregator = Arc::new(Aggregator::from_settings(&settings, Arc::new(upstream), store));

    info!(
        "Serving metrics from {} (cache TTL {:?})",
        settings.upstream.url,
        settings.cache_ttl()
    );

    let cancellation_token = CancellationToken::new();

    // Create and spawn cron scheduler for background jobs (cache warming)
    let cron_scheduler = CronScheduler::new(aggregator.clone(), settings.warmer.clone());

    let cron_token = cancellation_token.child_token();
    let cron_handle = tokio::spawn(async move {
        if let Err(e) = cron_scheduler.run(cron_token).await {
            error!("Cron scheduler failed: {:#}", e);
        }
    });

    info!("Cron scheduler started - cache will be warmed periodically");

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Metrics service running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    cancellation_token.cancel();

    // Wait for cron scheduler to stop
    info!("Waiting for cron scheduler to stop...");
    let _ = cron_handle.await;

    info!("Shutdown complete");
    Ok(())
}
