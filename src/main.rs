//! slsvcd - Straylight Services Daemon
//!
//! Single-threaded: one uplink at a time, one `select!` loop per connection.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use anyhow::Context;
use slsvcd::config::{self, Config};
use slsvcd::sync::Uplink;
use slsvcd::telemetry;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

fn main() -> anyhow::Result<()> {
    telemetry::init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "slsvcd.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {config_path}", errors.len());
    }

    info!(
        server = %config.server.name,
        sid = config.server.sid.as_deref().unwrap_or("-"),
        uplinks = config.uplinks.len(),
        "Starting {} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let pidfile = config.server.pidfile.clone();
    if let Some(path) = &pidfile {
        write_pidfile(path)?;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building the runtime")?;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| runtime.block_on(run(config))));

    if let Some(path) = &pidfile {
        remove_pidfile(path);
    }
    if outcome.is_err() {
        error!("Uplink loop panicked");
        anyhow::bail!("uplink loop panicked");
    }
    info!("Shutdown complete");
    Ok(())
}

async fn run(config: Config) {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Signal received, shutting down");
        let _ = shutdown_tx.send(());
    });

    let mut uplink = Uplink::new(config);
    uplink.run(shutdown_rx).await;
}

/// Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn write_pidfile(path: &Path) -> anyhow::Result<()> {
    std::fs::write(path, format!("{}\n", std::process::id()))
        .with_context(|| format!("writing pid file {}", path.display()))
}

fn remove_pidfile(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "Failed to remove pid file");
    }
}
