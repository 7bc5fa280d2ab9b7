//! Termination signal handling.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Resolves on the first interrupt or terminate signal.
///
/// A handler that cannot be installed is logged and never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for interrupt");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received interrupt signal"),
        _ = terminate => info!("received SIGTERM"),
    }
}

/// Spawns a task that cancels `token` on the first termination signal.
pub fn spawn_signal_listener(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => {
                info!("shutdown requested; finishing the current poll");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}
