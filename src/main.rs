//! Local Cache demo runner
//!
//! Starts a cache with its background sweeper, seeds expiring entries and
//! logs removals and stats until Ctrl+C or SIGTERM.

use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use local_cache::{with_on_remove, with_ttl, Config, LocalCache, RemovalReason};

/// Main entry point for the demo.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache and start its sweeper
/// 4. Seed entries with staggered TTLs
/// 5. Log stats periodically until a shutdown signal arrives
/// 6. Stop the sweeper and wait for it to exit
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "local_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        "Configuration loaded: sweep_interval={}ms, queue={}, seed_entries={}, seed_ttl={}ms",
        config.sweep_interval_ms, config.eviction_queue, config.seed_entries, config.seed_ttl_ms
    );

    let cache: LocalCache<String, u64> = LocalCache::from_config(&config);
    cache.start().context("starting sweeper")?;
    cache.notify_started().wait().await;
    info!("Sweeper started");

    seed(&cache, &config);

    let (value, hit) = cache
        .get_or_set("answer".to_string(), || Ok::<_, anyhow::Error>(42), [])
        .context("computing answer")?;
    info!(value, hit, "get_or_set");

    let mut ticker = tokio::time::interval(Duration::from_secs(config.stats_interval_secs.max(1)));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let stats = serde_json::to_string(&cache.stats())?;
                info!("Stats: {}", stats);
            }
        }
    }

    cache.stop().context("stopping sweeper")?;
    cache.notify_stopped().wait().await;
    info!("Sweeper stopped");

    info!("Final stats: {}", serde_json::to_string(&cache.stats())?);
    Ok(())
}

/// Inserts `seed_entries` values expiring at evenly spaced points up to `seed_ttl_ms`.
fn seed(cache: &LocalCache<String, u64>, config: &Config) {
    let count = config.seed_entries.max(1) as u64;
    for i in 0..config.seed_entries as u64 {
        let ttl = Duration::from_millis(config.seed_ttl_ms * (i + 1) / count);
        cache.set(
            format!("seed-{}", i),
            i,
            [
                with_ttl(ttl),
                with_on_remove(|key: &String, reason| {
                    if reason == RemovalReason::Expired {
                        info!(key = %key, %reason, "Entry left the cache");
                    }
                }),
            ],
        );
    }
    cache.set("pinned".to_string(), u64::MAX, []);
    info!("Seeded {} entries", cache.len());
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
