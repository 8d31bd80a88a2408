use exchange_match::config::{LoggingSettings, Settings};
use exchange_match::services::{CacheStore, MatchCache, MatchingEngine, MemoryStore, PgRepository, RedisStore};
use exchange_match::{Clock, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(logging: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if logging.format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.init();
    }
}

fn startup_error(message: String) -> std::io::Error {
    error!("{}", message);
    std::io::Error::new(std::io::ErrorKind::Other, message)
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            init_logging(&LoggingSettings::default());
            return Err(startup_error(format!("Configuration error: {}", e)));
        }
    };
    init_logging(&settings.logging);

    info!("Starting exchange matching worker...");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Redis is optional; without it each worker keeps its own cache
    let store: Arc<dyn CacheStore> = match &settings.cache.redis_url {
        Some(url) => match RedisStore::connect(url).await {
            Ok(store) => {
                info!("Redis cache backend connected");
                Arc::new(store)
            }
            Err(e) => {
                warn!("Failed to connect to Redis ({}), falling back to in-process cache", e);
                Arc::new(MemoryStore::new(clock.clone()))
            }
        },
        None => Arc::new(MemoryStore::new(clock.clone())),
    };

    let cache = Arc::new(MatchCache::new(
        store,
        clock.clone(),
        settings.cache.l1_size(),
        settings.cache.ttl(),
    ));
    info!(
        "Match cache initialized (L1: {} entries, TTL: {}s)",
        settings.cache.l1_size(),
        settings.cache.ttl().as_secs()
    );

    let repository = Arc::new(
        PgRepository::from_settings(
            &settings.database.url,
            settings.database.max_connections,
            settings.database.min_connections,
        )
        .await
        .map_err(|e| startup_error(format!("PostgreSQL connection error: {}", e)))?,
    );
    info!("PostgreSQL repository initialized");

    let scoring = settings.scoring.to_scoring_config();
    let engine = MatchingEngine::new(scoring, repository.clone(), repository, cache, clock)
        .map_err(|e| startup_error(format!("Refusing to start: {}", e)))?;
    info!("Matching engine initialized with weights: {:?}", engine.get_config().weights);

    let maintenance = settings.maintenance;
    if maintenance.tenants.is_empty() {
        warn!("No tenants configured for maintenance, only expiry sweeps will run");
    }

    let mut interval = tokio::time::interval(Duration::from_secs(maintenance.interval_secs.max(1)));

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }

        for tenant in &maintenance.tenants {
            match engine.warm_up_cache(*tenant, maintenance.warm_up_batch).await {
                Ok(report) => info!(
                    tenant = *tenant,
                    processed = report.processed,
                    cached = report.cached,
                    "warm-up complete"
                ),
                Err(e) => warn!("Warm-up failed for tenant {}: {}", tenant, e),
            }
        }

        let expired = engine.clear_expired_cache().await;
        let stats = engine.cache_stats();
        info!(
            expired,
            l1_size = stats.l1_size,
            backend = %stats.backend,
            "maintenance pass complete"
        );
    }

    Ok(())
}
