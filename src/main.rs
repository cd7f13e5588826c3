//! Buildhook: Bitbucket push webhooks in, live satis build output out.
//!
//! Main entry point for the buildhook server. Loads configuration,
//! initializes logging and coordinates graceful startup and shutdown.

use std::time::Duration;

use anyhow::{Context, Result};
use buildhook_api::{AppState, Config};
use tracing::{error, info};

const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    init_tracing(&config.rust_log)?;

    info!("Starting buildhook webhook receiver");

    let addr = config.parse_server_addr()?;
    let state = AppState::from_config(&config)?;
    info!(
        server_addr = %addr,
        project_dir = %config.project_dir.display(),
        trusted_ranges = state.trusted.len(),
        behind_proxy = config.behind_proxy,
        build_timeout_seconds = config.build_timeout_seconds,
        "Configuration loaded"
    );

    let mut server_handle = tokio::spawn(async move {
        if let Err(e) = buildhook_api::start_server(state, addr).await {
            error!(error = %e, "Server failed");
        }
    });

    info!(addr = %addr, "Buildhook is ready to receive webhooks");

    tokio::select! {
        _ = &mut server_handle => {
            info!("Server stopped");
            return Ok(());
        },
        () = shutdown_signal() => {
            info!("Shutdown signal received, starting graceful shutdown");
        },
    }

    // Builds still streaming get a bounded amount of time to finish.
    tokio::select! {
        () = tokio::time::sleep(SHUTDOWN_GRACE_PERIOD) => {
            info!("Shutdown grace period expired");
        },
        _ = server_handle => {
            info!("Server stopped");
        },
    }

    info!("Buildhook shutdown complete");
    Ok(())
}

/// Initializes tracing; `RUST_LOG` takes precedence over `fallback`.
fn init_tracing(fallback: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .context("Invalid log filter")?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    Ok(())
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C signal");
        },
        () = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
