//! SendFlow daemon - composition root
//!
//! Wires the SQLite store, the messaging gateway and the broadcast service,
//! runs crash recovery, then serves operator controls over JSON-RPC.

mod config;
mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use config::DaemonConfig;
use sendflow_api_rpc::RpcServer;
use sendflow_core::application::{BroadcastService, RecoveryService};
use sendflow_core::domain::JobType;
use sendflow_core::port::id_provider::UuidProvider;
use sendflow_core::port::time_provider::SystemTimeProvider;
use sendflow_core::port::{MessagingGateway, PlaceholderRenderer};
use sendflow_infra_gateway::{DryRunGateway, HttpMessagingGateway};
use sendflow_infra_sqlite::{
    create_pool, database_url_for_path, run_migrations, SqliteCatalog, SqliteJobStore,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upper bound for halting local loops on shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration + logging
    let config = DaemonConfig::from_env();
    telemetry::init_tracing(config.log_format)?;

    info!("SendFlow daemon v{} starting...", VERSION);

    // 2. Database
    let database_url = database_url_for_path(&config.db_path)
        .with_context(|| format!("Cannot prepare {}", config.db_path.display()))?;
    info!(db_path = %config.db_path.display(), "Initializing database...");

    let pool = create_pool(&database_url)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 3. Adapters
    let store = Arc::new(SqliteJobStore::new(
        pool.clone(),
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
    ));
    let catalog = Arc::new(SqliteCatalog::new(pool.clone()));

    let gateway: Arc<dyn MessagingGateway> = match &config.gateway_url {
        Some(url) => {
            info!(gateway_url = %url, "Using HTTP messaging gateway");
            Arc::new(HttpMessagingGateway::new(url.clone())?)
        }
        None => {
            warn!("SENDFLOW_GATEWAY_URL not set, messages will only be logged (dry run)");
            Arc::new(DryRunGateway::new())
        }
    };

    // 4. Crash recovery: no record may claim to be running without a loop
    let recovery = RecoveryService::new(store.clone(), JobType::broadcast());
    match recovery.recover_interrupted().await {
        Ok(count) => info!(recovered_jobs = count, "Crash recovery completed"),
        Err(e) => error!(error = %e, "Crash recovery failed"),
    }

    // 5. Broadcast service
    let service = Arc::new(BroadcastService::new(
        store,
        catalog,
        gateway,
        Arc::new(PlaceholderRenderer),
        config.dispatch.clone(),
    ));

    // 6. JSON-RPC server
    let (addr, rpc_handle) = RpcServer::new(config.rpc.clone(), service.clone())
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!(addr = %addr, "System ready. Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown: stop accepting calls, then halt local loops (left paused)
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, service.shutdown()).await {
        Ok(halted) => info!(halted_runs = halted, "Dispatch loops halted"),
        Err(_) => warn!("Timed out waiting for dispatch loops; they will be recovered on restart"),
    }

    pool.close().await;
    telemetry::shutdown();
    info!("Shutdown complete.");

    Ok(())
}
