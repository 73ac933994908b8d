//! fleetwatch Binary Entry Point
//!
//! Runs the poller, the live update notifier and the web server.
//! Core functionality is provided by the `fleetwatch` library crate.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fleetwatch::{
    ChangeNotifier, DevicePoller, FleetStore, LoopHandle, PollScheduler, SnmpClient,
    StorageBuilder, SubscriberRegistry,
    config::{AppConfig, parse_duration},
    server::{AppState, create_router},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// fleetwatch - SNMP Fleet Poller
#[derive(Parser, Debug)]
#[command(name = "fleetwatch", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "FLEETWATCH_CONFIG"
    )]
    config: String,

    /// Server bind address (overrides config file)
    #[arg(long, env = "FLEETWATCH_SERVER_BIND")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "FLEETWATCH_SERVER_PORT")]
    server_port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(long, env = "FLEETWATCH_DB_URL")]
    db_url: Option<String>,

    /// Polling interval, e.g. `5s` (overrides config file)
    #[arg(long, env = "FLEETWATCH_POLL_INTERVAL", value_parser = parse_duration)]
    poll_interval: Option<Duration>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fleetwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("fleetwatch - SNMP Fleet Poller");

    let cli = Cli::parse();

    tracing::info!(path = %cli.config, "Loading configuration");
    let mut config = AppConfig::load_with_device_path(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(bind) = cli.server_bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    if let Some(url) = cli.db_url {
        config.database.url = url;
    }
    if let Some(interval) = cli.poll_interval {
        config.poller.interval = interval;
    }
    config.validate()?;

    tracing::info!(
        bind = %config.server.bind,
        port = config.server.port,
        database = %config.database.url,
        poll_interval = ?config.poller.interval,
        "Configuration loaded"
    );

    // Build storage layer
    let mut builder = StorageBuilder::new(&config.database.url);
    if let Some(max_connections) = config.database.max_connections {
        builder = builder.max_connections(max_connections);
    }
    let store = builder.build().await?;
    tracing::info!("Storage initialized");

    seed_devices(&config, &store).await?;

    // Polling loop
    let shared: Arc<FleetStore> = Arc::new(store.clone());
    let client = Arc::new(SnmpClient::new(config.poller.client_config()));
    let poller = DevicePoller::new(client, shared.clone(), config.poller.interval);
    let mut scheduler = PollScheduler::new(poller, shared.clone(), config.poller.interval);
    if let Some(limit) = config.poller.max_concurrent_polls {
        scheduler = scheduler.with_max_concurrency(limit);
    }
    let poll_handle = scheduler.spawn();

    // Live updates
    let subscribers = SubscriberRegistry::new();
    let notify_handle =
        ChangeNotifier::new(shared, subscribers.clone(), config.notifier.interval).spawn();

    let app = create_router(AppState {
        store: store.clone(),
        subscribers,
        channel_capacity: config.notifier.channel_capacity,
    });

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    tracing::info!("Web server listening on: http://{}", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down loops...");
    for handle in [poll_handle, notify_handle] {
        stop_loop(handle).await;
    }

    tracing::info!("Closing storage...");
    store.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Insert configured devices whose address is not yet in the directory.
async fn seed_devices(
    config: &AppConfig,
    store: &FleetStore,
) -> Result<(), Box<dyn std::error::Error>> {
    if config.devices.is_empty() {
        return Ok(());
    }

    let mut inserted = 0;
    let mut skipped = 0;
    for device in config.to_new_devices()? {
        match store.insert_device_if_not_exists(&device).await? {
            Some(id) => {
                tracing::info!(device = %device.hostname, ip = %device.ip_address, id, "Seeded device");
                inserted += 1;
            }
            None => {
                tracing::debug!(device = %device.hostname, ip = %device.ip_address, "Device already known, skipping");
                skipped += 1;
            }
        }
    }

    tracing::info!(inserted, skipped, "Device seeding complete");
    Ok(())
}

async fn stop_loop(handle: LoopHandle) {
    let name = handle.name();
    let outcome = handle.shutdown().await;
    tracing::info!(task = name, outcome = ?outcome, "Loop stopped");
}

/// Setup graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
