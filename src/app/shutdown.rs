use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Input reached end of file
    InputClosed,
    Interrupt,
    Terminate,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::InputClosed => "input closed",
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        };
        f.write_str(name)
    }
}

/// Resolves on the first SIGINT or SIGTERM. If no handler can be installed
/// this never resolves and shutdown is left to end of input.
#[cfg(unix)]
pub async fn wait_for_signal() -> ShutdownReason {
    let mut sigterm = match unix_signal(SignalKind::terminate()) {
        Ok(sigterm) => Some(sigterm),
        Err(err) => {
            error!("Failed to create SIGTERM handler: {}", err);
            None
        }
    };

    tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                ShutdownReason::Interrupt
            }
            Err(err) => {
                error!("Failed to listen for SIGINT: {}", err);
                std::future::pending::<ShutdownReason>().await
            }
        },
        Some(()) = async {
            match sigterm.as_mut() {
                Some(sigterm) => sigterm.recv().await,
                None => std::future::pending::<Option<()>>().await,
            }
        } => {
            info!("Received SIGTERM, initiating graceful shutdown");
            ShutdownReason::Terminate
        }
    }
}

#[cfg(not(unix))]
pub async fn wait_for_signal() -> ShutdownReason {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
            ShutdownReason::Interrupt
        }
        Err(err) => {
            error!("Failed to listen for SIGINT: {}", err);
            std::future::pending::<ShutdownReason>().await
        }
    }
}
