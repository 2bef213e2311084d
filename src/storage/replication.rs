//! Asynchronous Primary -> Backup Mirroring
//!
//! After every successful mutation the primary schedules a background task
//! that waits a fixed settle delay and then overwrites the backup's snapshot
//! with a full copy of the catalog. Coarse and non-incremental: there is no
//! acknowledgement, no retry and no conflict detection.
//!
//! Snapshots are numbered locally; a task whose snapshot has been superseded
//! by a newer mutation during its settle delay skips the write, so the
//! mirror never moves backwards.

use super::catalog::Catalog;
use super::snapshot::SnapshotStore;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Delay between a primary mutation and its mirror write.
pub const REPLICATION_SETTLE_DELAY: Duration = Duration::from_millis(500);

pub struct Replicator {
    mirror: Arc<dyn SnapshotStore>,
    settle_delay: Duration,
    generation: Arc<AtomicU64>,
}

impl Replicator {
    pub fn new(mirror: Arc<dyn SnapshotStore>, settle_delay: Duration) -> Self {
        Self {
            mirror,
            settle_delay,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawns the mirror write for `snapshot` and returns immediately.
    pub fn schedule(&self, snapshot: Catalog) -> JoinHandle<bool> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let latest = self.generation.clone();
        let mirror = self.mirror.clone();
        let delay = self.settle_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if latest.load(Ordering::SeqCst) != generation {
                tracing::debug!("Replication #{} superseded, skipping", generation);
                return false;
            }

            match mirror.save(&snapshot).await {
                Ok(()) => {
                    tracing::info!(
                        "Replica {} updated ({} books, #{})",
                        mirror.describe(),
                        snapshot.len(),
                        generation
                    );
                    true
                }
                Err(e) => {
                    tracing::error!("Replication #{} to {} failed: {:#}", generation, mirror.describe(), e);
                    false
                }
            }
        })
    }
}
