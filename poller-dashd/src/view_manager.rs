use std::sync::Arc;
use anyhow::Result;
use shared::types::RegistrySnapshot;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use crate::view::hash;

/// View manager event loop - republishes the snapshot fingerprint whenever
/// the sync engine publishes a new snapshot
pub async fn run(
    mut snapshots: watch::Receiver<Arc<RegistrySnapshot>>,
    hash_tx: watch::Sender<String>,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    tracing::info!("Sync engine gone, view manager stopping");
                    break;
                }

                let snapshot = snapshots.borrow_and_update().clone();
                let new_hash = hash::compute_hash(&snapshot);
                // Only wake hash readers when the view really changed
                let changed = hash_tx.send_if_modified(|current| {
                    if *current == new_hash {
                        return false;
                    }
                    *current = new_hash;
                    true
                });
                if changed {
                    tracing::debug!("Snapshot of {} services, hash {}", snapshot.len(), *hash_tx.borrow());
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("View manager shutting down");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use chrono::Utc;
    use shared::types::{ServiceEntry, ServiceStatus};

    #[tokio::test]
    async fn test_hash_follows_snapshots() {
        let empty = Arc::new(RegistrySnapshot::default());
        let (snapshot_tx, snapshot_rx) = watch::channel(empty.clone());
        let (hash_tx, mut hash_rx) = watch::channel(hash::compute_hash(&empty));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run(snapshot_rx, hash_tx, cancel.clone()));

        let next = RegistrySnapshot::new(vec![ServiceEntry {
            id: 1,
            name: "auth".to_string(),
            url: "http://auth.local".to_string(),
            created_at: Utc::now(),
            current_status: ServiceStatus::Ok,
        }]);
        let expected = hash::compute_hash(&next);
        snapshot_tx.send(Arc::new(next)).unwrap();

        tokio::time::timeout(Duration::from_secs(5), hash_rx.wait_for(|h| *h == expected))
            .await
            .unwrap()
            .unwrap();

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stops_when_engine_is_gone() {
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(RegistrySnapshot::default()));
        let (hash_tx, _hash_rx) = watch::channel(String::new());

        let task = tokio::spawn(run(snapshot_rx, hash_tx, CancellationToken::new()));
        drop(snapshot_tx);

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
