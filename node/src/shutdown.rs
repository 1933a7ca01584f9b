//! Graceful shutdown.
//!
//! One broadcast channel fans a stop signal out to the rpc server and the
//! auto-flusher. The signal comes from SIGINT/SIGTERM or from
//! [`ShutdownController::shutdown`].

use std::future::Future;

use tokio::signal;
use tokio::sync::broadcast;

pub struct ShutdownController {
    tx: broadcast::Sender<()>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// A future that resolves once shutdown is triggered, for
    /// `axum::serve(..).with_graceful_shutdown`.
    pub fn signalled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            // A closed channel means the controller is gone: stop as well.
            let _ = rx.recv().await;
        }
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }

    /// Block until SIGINT or SIGTERM, then trigger shutdown.
    pub async fn wait_for_signal(&self) {
        tokio::select! {
            _ = signal::ctrl_c() => tracing::info!("received SIGINT, shutting down"),
            _ = terminate() => tracing::info!("received SIGTERM, shutting down"),
        }
        self.shutdown();
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "cannot install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn every_subscriber_is_notified() {
        let controller = ShutdownController::new();
        let mut flusher = controller.subscribe();
        let server = controller.signalled();
        controller.shutdown();
        assert!(flusher.recv().await.is_ok());
        tokio::time::timeout(Duration::from_secs(1), server)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn signalled_waits_for_shutdown() {
        let controller = ShutdownController::new();
        let pending = tokio::time::timeout(Duration::from_millis(20), controller.signalled()).await;
        assert!(pending.is_err());
    }
}
