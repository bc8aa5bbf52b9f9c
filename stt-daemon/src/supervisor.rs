//! Supervisor (C9): signal handling and cooperative shutdown.
//!
//! Waits for SIGINT/SIGTERM and fires a `CancellationToken` so every
//! cancellation-aware task can unwind. It does not itself wait out the
//! shutdown budget — the caller races the actual task joins against
//! `shutdown_timeout` and forces exit if they overrun it (§8 invariant 7).

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Blocks until SIGINT or SIGTERM, then cancels `token` and returns.
pub async fn wait_for_shutdown(token: CancellationToken) {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to install SIGTERM handler: {e}");
            token.cancel();
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to install SIGINT handler: {e}");
            token.cancel();
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }

    info!("shutting down");
    token.cancel();
}
