//! OS signal handling.
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers config reload, not shutdown
//! - Reload notifications coalesce: a burst of SIGHUPs while one reload is
//!   pending yields a single extra reload

use std::io;

use tokio::sync::mpsc;

/// Channel that yields one item per reload request.
#[cfg(unix)]
pub fn reload_notifications() -> io::Result<mpsc::Receiver<()>> {
    use tokio::signal::unix::{signal, SignalKind};
    use tokio::sync::mpsc::error::TrySendError;

    let mut hangup = signal(SignalKind::hangup())?;
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            tracing::info!("SIGHUP received, reloading configuration");
            match tx.try_send(()) {
                Ok(()) | Err(TrySendError::Full(())) => {}
                Err(TrySendError::Closed(())) => break,
            }
        }
    });

    Ok(rx)
}

/// Channel that yields one item per reload request.
///
/// There is no hang-up signal here, so it never fires.
#[cfg(not(unix))]
pub fn reload_notifications() -> io::Result<mpsc::Receiver<()>> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        tx.closed().await;
    });
    Ok(rx)
}

/// Resolve on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
}
