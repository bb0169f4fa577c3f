//! Termination signals shared by the worker and API binaries.

use std::future::Future;

/// Which signal asked the process to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT (Ctrl-C).
    Interrupt,
    /// SIGTERM, as sent by `docker stop` and Kubernetes.
    Terminate,
}

/// Wait for SIGINT or SIGTERM (SIGTERM on Unix only).
pub async fn shutdown_signal() -> ShutdownSignal {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = first_signal(ctrl_c, terminate).await;
    match signal {
        ShutdownSignal::Interrupt => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        ShutdownSignal::Terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
    signal
}

async fn first_signal(
    interrupt: impl Future<Output = ()>,
    terminate: impl Future<Output = ()>,
) -> ShutdownSignal {
    tokio::select! {
        () = interrupt => ShutdownSignal::Interrupt,
        () = terminate => ShutdownSignal::Terminate,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn terminate_alone_triggers_shutdown() {
        let signal = first_signal(std::future::pending(), async {}).await;
        assert_eq!(signal, ShutdownSignal::Terminate);
    }

    #[tokio::test]
    async fn interrupt_alone_triggers_shutdown() {
        let signal = first_signal(async {}, std::future::pending()).await;
        assert_eq!(signal, ShutdownSignal::Interrupt);
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_signal_wins() {
        let signal = first_signal(
            tokio::time::sleep(Duration::from_secs(5)),
            tokio::time::sleep(Duration::from_secs(1)),
        )
        .await;
        assert_eq!(signal, ShutdownSignal::Terminate);
    }
}
