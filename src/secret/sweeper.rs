//! Background expiry sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::SecretService;

/// Sweep interval used when serving requests.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Periodically purges expired secrets until shut down.
///
/// A failed sweep is logged and retried on the next tick; it never stops
/// the loop.
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ExpirySweeper {
    pub fn start(service: Arc<SecretService>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            tracing::info!(interval = ?interval, "expiry sweeper started");
            loop {
                tokio::select! {
                    biased;

                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }

                    _ = tokio::time::sleep(interval) => {
                        match service.delete_expired().await {
                            Ok(0) => tracing::trace!("sweep found nothing to delete"),
                            Ok(count) => tracing::info!(count, "deleted expired secrets"),
                            Err(e) => tracing::error!(error = %e, "expiry sweep failed"),
                        }
                    }
                }
            }
            tracing::info!("expiry sweeper stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signal the loop to stop and wait for it to finish. A sweep in
    /// flight completes before this returns.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "expiry sweeper task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::{Secret, SecretRepository};
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn sweeps_expired_secrets_and_stops() {
        let store = Arc::new(MemoryStore::new());
        let repo = SecretRepository::new(store.clone());
        let service = Arc::new(SecretService::new(repo, "key").unwrap());

        service
            .create(Secret::new("gone").with_ttl(chrono::Duration::seconds(-1)))
            .await
            .unwrap();
        service.create(Secret::new("kept")).await.unwrap();
        assert_eq!(store.len(), 2);

        let sweeper = ExpirySweeper::start(service.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        sweeper.shutdown().await;

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_returns_promptly_with_long_interval() {
        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(SecretService::new(SecretRepository::new(store), "key").unwrap());

        let sweeper = ExpirySweeper::start(service, Duration::from_secs(3600));
        tokio::time::timeout(Duration::from_secs(1), sweeper.shutdown())
            .await
            .expect("sweeper did not stop");
    }
}
