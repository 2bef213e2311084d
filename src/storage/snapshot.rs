//! Durable Catalog Snapshots
//!
//! Each Storage Engine instance loads its catalog from its own snapshot at
//! start-up and rewrites the whole snapshot after every successful mutation.
//! The primary also writes the backup's snapshot (see `replication`).
//!
//! `FileSnapshotStore` is the default store: one pretty-printed JSON document,
//! replaced atomically via a temporary file and a rename. The file's
//! modification time is the snapshot's `written_at`, which drives the
//! start-up reconciliation between primary and backup. An unreadable file is
//! moved aside as `<name>.corrupt-<time>` and the store reports no snapshot.

use super::catalog::Catalog;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub catalog: Catalog,
    /// When the snapshot was last written, if the store can tell.
    pub written_at: Option<SystemTime>,
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` when no snapshot has been written yet.
    async fn load(&self) -> Result<Option<Snapshot>>;

    /// Replaces the stored snapshot with `catalog`.
    async fn save(&self, catalog: &Catalog) -> Result<()>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string())
    }

    /// Keeps an unreadable snapshot for inspection instead of letting the next
    /// save replace it.
    async fn quarantine(&self) {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let aside = self
            .path
            .with_file_name(format!("{}.corrupt-{}", self.file_name(), stamp));

        match tokio::fs::rename(&self.path, &aside).await {
            Ok(()) => tracing::warn!("Moved unreadable snapshot to {}", aside.display()),
            Err(e) => tracing::error!("Could not move {} aside: {}", self.path.display(), e),
        }
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self) -> Result<Option<Snapshot>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading snapshot {}", self.path.display()));
            }
        };

        let catalog: Catalog = match serde_json::from_slice(&raw) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!(
                    "Snapshot {} is unreadable ({}), treating it as absent",
                    self.path.display(),
                    e
                );
                self.quarantine().await;
                return Ok(None);
            }
        };

        let written_at = tokio::fs::metadata(&self.path)
            .await
            .ok()
            .and_then(|meta| meta.modified().ok());

        Ok(Some(Snapshot { catalog, written_at }))
    }

    async fn save(&self, catalog: &Catalog) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let encoded = serde_json::to_vec_pretty(catalog)?;
        let tmp = self
            .path
            .with_file_name(format!(".{}.{}.tmp", self.file_name(), uuid::Uuid::new_v4()));

        tokio::fs::write(&tmp, &encoded)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("replacing snapshot {}", self.path.display()));
        }

        tracing::debug!("Saved {} books to {}", catalog.len(), self.path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Volatile store, for tests and ephemeral instances.
#[derive(Default)]
pub struct MemorySnapshotStore {
    inner: RwLock<Option<Snapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(catalog: Catalog, written_at: SystemTime) -> Self {
        Self {
            inner: RwLock::new(Some(Snapshot {
                catalog,
                written_at: Some(written_at),
            })),
        }
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Result<Option<Snapshot>> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, catalog: &Catalog) -> Result<()> {
        *self.inner.write().await = Some(Snapshot {
            catalog: catalog.clone(),
            written_at: Some(SystemTime::now()),
        });
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Reads the read-only seed dataset shared by both instances.
pub async fn load_seed(path: &Path) -> Result<Catalog> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("seed dataset {} is missing", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parsing seed dataset {}", path.display()))
}

/// Produces the catalog an instance starts serving with.
///
/// 1. Own snapshot absent or unreadable and `peer` holds one: adopt the peer's
///    catalog and persist it as the own snapshot.
/// 2. Neither has one: load the seed (empty catalog if none is configured) and
///    persist it as the own snapshot and, when `peer` is given, as the peer's.
/// 3. Own snapshot present and `reconcile` set: if the peer's snapshot was
///    written strictly later, adopt it (last writer wins) and persist it.
pub async fn bootstrap(
    own: &dyn SnapshotStore,
    seed: Option<&Path>,
    peer: Option<&dyn SnapshotStore>,
    reconcile: bool,
) -> Result<Catalog> {
    let own_snapshot = own.load().await?;
    let peer_snapshot = match peer {
        Some(peer) => peer.load().await.inspect_err(|e| {
            tracing::warn!("Could not read peer snapshot {}: {:#}", peer.describe(), e);
        }),
        None => Ok(None),
    };

    let Some(snapshot) = own_snapshot else {
        if let Some(peer) = peer
            && let Ok(Some(peer_snapshot)) = peer_snapshot
        {
            tracing::warn!(
                "No usable snapshot at {}, adopting peer snapshot {}",
                own.describe(),
                peer.describe()
            );
            own.save(&peer_snapshot.catalog).await?;
            return Ok(peer_snapshot.catalog);
        }

        let catalog = match seed {
            Some(path) => {
                tracing::info!("Initialising {} from seed {}", own.describe(), path.display());
                load_seed(path).await?
            }
            None => {
                tracing::warn!("No snapshot at {} and no seed configured", own.describe());
                Catalog::new()
            }
        };

        own.save(&catalog).await?;

        // A peer that failed to load is left untouched.
        if let Some(peer) = peer
            && matches!(peer_snapshot, Ok(None))
        {
            tracing::info!("Initialising peer snapshot {}", peer.describe());
            peer.save(&catalog).await?;
        }

        return Ok(catalog);
    };

    if reconcile
        && let Some(peer) = peer
        && let Ok(Some(peer_snapshot)) = peer_snapshot
        && let (Some(own_at), Some(peer_at)) = (snapshot.written_at, peer_snapshot.written_at)
        && peer_at > own_at
    {
        tracing::warn!(
            "Peer snapshot {} is newer than {}, adopting it",
            peer.describe(),
            own.describe()
        );
        own.save(&peer_snapshot.catalog).await?;
        return Ok(peer_snapshot.catalog);
    }

    Ok(snapshot.catalog)
}
