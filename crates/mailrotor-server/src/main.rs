//! mailrotor - delivery service entry point

use anyhow::Result;
use mailrotor_common::config::Config;
use mailrotor_core::{
    AdapterRegistry, DeliveryService, HookBus, MemoryCache, ParamsAssembler, PickerConfig,
    QuotaCounter, ServerPicker, TransactionalWorker,
};
use mailrotor_storage::db::DatabasePool;
use mailrotor_storage::repository::{
    CustomerRepository, CustomerRepositoryTrait, DeliveryServerRepository,
    DeliveryServerRepositoryTrait, SendingDomainRepository, SendingDomainRepositoryTrait,
    TrackingDomainRepository, TrackingDomainRepositoryTrait, TransactionalEmailRepository,
    TransactionalEmailRepositoryTrait, UsageLogRepository, UsageLogRepositoryTrait,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting mailrotor delivery service...");

    let config = Config::load()?;

    let db_pool = DatabasePool::new(&config.database).await?;
    db_pool.migrate().await?;

    // Repositories
    let servers: Arc<dyn DeliveryServerRepositoryTrait> =
        Arc::new(DeliveryServerRepository::new(db_pool.clone()));
    let customers: Arc<dyn CustomerRepositoryTrait> =
        Arc::new(CustomerRepository::new(db_pool.clone()));
    let usage: Arc<dyn UsageLogRepositoryTrait> =
        Arc::new(UsageLogRepository::new(db_pool.clone()));
    let signing_domains: Arc<dyn SendingDomainRepositoryTrait> =
        Arc::new(SendingDomainRepository::new(db_pool.clone()));
    let tracking_domains: Arc<dyn TrackingDomainRepositoryTrait> =
        Arc::new(TrackingDomainRepository::new(db_pool.clone()));
    let transactional: Arc<dyn TransactionalEmailRepositoryTrait> =
        Arc::new(TransactionalEmailRepository::new(db_pool.clone()));

    // Quota counting over the usage log
    let cache = Arc::new(MemoryCache::new());
    let quota = Arc::new(QuotaCounter::new(
        usage.clone(),
        cache.clone(),
        Duration::from_secs(config.delivery.quota_cache_ttl_secs),
        Duration::from_millis(config.delivery.quota_lock_timeout_ms),
    ));

    // Transports
    let adapters = Arc::new(AdapterRegistry::builtin(&config.transports)?);
    if adapters.is_empty() {
        anyhow::bail!("no transport is available, check [transports] configuration");
    }

    // Picker and delivery pipeline
    let picker = ServerPicker::new(
        servers.clone(),
        customers.clone(),
        quota.clone(),
        PickerConfig {
            max_attempts: config.delivery.picker_max_attempts as usize,
        },
    );
    let assembler = ParamsAssembler::new(
        signing_domains,
        tracking_domains,
        &config.delivery.app_url,
    );
    let service = Arc::new(DeliveryService::new(
        picker,
        quota,
        adapters,
        assembler,
        usage.clone(),
        customers,
        servers.clone(),
        HookBus::new(),
    ));

    // Transactional worker
    let worker = TransactionalWorker::new(
        service.clone(),
        transactional,
        Duration::from_secs(config.delivery.worker_interval_secs),
        config.delivery.worker_batch_size,
        config.delivery.send_attempts,
    );
    let worker_handle = tokio::spawn(async move {
        worker.run().await;
    });

    // Housekeeping: expired cache entries, old usage rows, servers whose
    // soft delete has aged out.
    let housekeeping_handle = {
        let retention = config.delivery.purge_retention_days;
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(3600));
            loop {
                ticker.tick().await;

                cache.purge_expired().await;
                match usage.prune(retention).await {
                    Ok(pruned) if pruned > 0 => info!(pruned, "pruned usage-log rows"),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "usage-log prune failed"),
                }
                match servers.purge_deletable(retention).await {
                    Ok(purged) if purged > 0 => info!(purged, "purged deleted servers"),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "server purge failed"),
                }
            }
        })
    };

    info!("mailrotor started successfully");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    worker_handle.abort();
    housekeeping_handle.abort();

    info!("mailrotor shutdown complete");

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mailrotor=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .init();
}
