//! Storage process wiring: bootstrap, engine task, liveness responder and the
//! HTTP endpoint, for either instance role.

use super::engine::{InstanceRole, StorageEngine};
use super::handlers;
use super::liveness::LivenessResponder;
use super::replication::Replicator;
use super::snapshot::{FileSnapshotStore, SnapshotStore, bootstrap};
use crate::config::StorageConfig;

use anyhow::{Context, Result};
use std::sync::Arc;

pub async fn run(role: InstanceRole, config: StorageConfig) -> Result<()> {
    let (own_path, peer_path, http_addr, liveness_addr) = match role {
        InstanceRole::Primary => (
            config.primary_snapshot.clone(),
            Some(config.backup_snapshot.clone()),
            config.primary_addr,
            config.primary_liveness_addr,
        ),
        // The backup never writes to or reconciles with the primary's store.
        InstanceRole::Backup => (
            config.backup_snapshot.clone(),
            None,
            config.backup_addr,
            config.backup_liveness_addr,
        ),
    };

    let own: Arc<dyn SnapshotStore> = Arc::new(FileSnapshotStore::new(own_path));
    let peer: Option<Arc<dyn SnapshotStore>> =
        peer_path.map(|path| Arc::new(FileSnapshotStore::new(path)) as Arc<dyn SnapshotStore>);

    let catalog = bootstrap(
        own.as_ref(),
        config.seed_path.as_deref(),
        peer.as_deref(),
        config.reconcile_on_start,
    )
    .await
    .context("loading catalog")?;
    tracing::info!("Storage {}: catalog loaded with {} books ({})", role, catalog.len(), own.describe());

    let replicator = peer.map(|mirror| Replicator::new(mirror, config.settle_delay));
    let engine = StorageEngine::new(role, catalog, own, replicator).spawn();

    let liveness = LivenessResponder::bind(liveness_addr).await?;
    tokio::spawn(liveness.run());

    let app = handlers::router(engine);
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!("Storage {} listening on {}", role, listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
