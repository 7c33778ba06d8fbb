use anyhow::Context;
use kenuts::cache::{ContentCache, FileWatch, spawn_reload_task};
use kenuts::config::Config;
use kenuts::server::Server;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kenuts=info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load().context("Invalid configuration")?;

    let cache = ContentCache::new();
    cache
        .load(&cfg.index_file)
        .context("Failed to load index")?;

    // Held for the life of the process; dropping it ends the reload task.
    let (_watch, events) = FileWatch::start(&cfg.index_file).context("Failed to watch index")?;
    spawn_reload_task(cache.clone(), cfg.index_file.clone(), events);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server = Server::new(cfg.clone(), cache);
    server
        .start(shutdown_rx)
        .await
        .context("Failed to start server")?;

    wait_for_signal().await;
    tracing::info!("Shutdown requested");

    shutdown_tx.send_replace(true);
    server.stop();
    server.wait().await;

    tokio::time::sleep(cfg.shutdown_timeout()).await;
    tracing::info!("Server stopped");

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot listen for SIGTERM, waiting for Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
