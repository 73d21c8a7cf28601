use sentinel_watch::Result;
use sentinel_watch::SentinelWatcher;
use sentinel_watch::WatcherConfig;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tracing::error;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = WatcherConfig::new()?.validate()?;

    // Initializing Logs
    init_observability();

    let master_name = settings.failover.master_name.clone();
    let mut watcher = SentinelWatcher::new(move |addr: &str| {
        info!("master={:?} switched to {:?}", master_name, addr);
    });

    watcher.initialize(settings.failover).await?;
    info!(
        "Watching master {:?} via {} sentinels. Waiting for CTRL+C signal...",
        watcher.current_master(),
        watcher.sentinel_addrs().len()
    );

    if let Err(e) = graceful_shutdown().await {
        error!("Failed to wait for shutdown signal: {:?}", e);
    }

    if let Err(e) = watcher.close().await {
        error!("watcher close failed: {:?}", e);
    }

    info!("Shutdown completed");
    Ok(())
}

async fn graceful_shutdown() -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    info!("Shutdown watcher..");
    Ok(())
}

fn init_observability() {
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    tracing_subscriber::registry().with(base_subscriber).init();
}
