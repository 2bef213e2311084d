//! Storage Engine
//!
//! Owns one in-memory `Catalog` behind a single-writer boundary: the catalog
//! lives inside one task and every request reaches it through a channel, so
//! intents are applied strictly one at a time whatever the number of
//! concurrent HTTP connections.
//!
//! ## Per intent
//! 1. Apply the mutation to the catalog (business errors are normal replies).
//! 2. On success, persist the full catalog to the instance's own store before
//!    replying. If that write fails the mutation is rolled back.
//! 3. On the primary, schedule the asynchronous mirror write to the backup.

use super::catalog::{BookRecord, Catalog};
use super::replication::Replicator;
use super::snapshot::SnapshotStore;
use crate::protocol::{StandardResult, WorkerIntent};

use anyhow::{Result, anyhow};
use chrono::Local;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

const COMMAND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceRole {
    Primary,
    Backup,
}

impl InstanceRole {
    /// Generic failure reply of this instance.
    pub fn internal_error_message(&self) -> &'static str {
        match self {
            InstanceRole::Primary => "Error interno en GA",
            InstanceRole::Backup => "Error interno en GA Respaldo",
        }
    }
}

impl fmt::Display for InstanceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceRole::Primary => f.write_str("primary"),
            InstanceRole::Backup => f.write_str("backup"),
        }
    }
}

impl FromStr for InstanceRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "primary" => Ok(InstanceRole::Primary),
            "backup" => Ok(InstanceRole::Backup),
            other => Err(anyhow!("unknown storage role: {}", other)),
        }
    }
}

enum Command {
    Apply {
        intent: WorkerIntent,
        reply: oneshot::Sender<StandardResult>,
    },
    Lookup {
        code: String,
        reply: oneshot::Sender<Option<BookRecord>>,
    },
}

pub struct StorageEngine {
    role: InstanceRole,
    catalog: Catalog,
    store: Arc<dyn SnapshotStore>,
    replicator: Option<Replicator>,
}

impl StorageEngine {
    /// `replicator` is only meaningful on the primary; the backup never mirrors.
    pub fn new(
        role: InstanceRole,
        catalog: Catalog,
        store: Arc<dyn SnapshotStore>,
        replicator: Option<Replicator>,
    ) -> Self {
        let replicator = match role {
            InstanceRole::Primary => replicator,
            InstanceRole::Backup => None,
        };

        Self {
            role,
            catalog,
            store,
            replicator,
        }
    }

    pub fn role(&self) -> InstanceRole {
        self.role
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub async fn apply(&mut self, intent: &WorkerIntent) -> StandardResult {
        let previous = self.catalog.get(&intent.book_code).cloned();
        let now = Local::now().naive_local();

        let applied = match self.catalog.apply(intent, now) {
            Ok(applied) => applied,
            Err(e) => {
                tracing::info!(
                    "{} {} {} rejected: {}",
                    intent.kind,
                    intent.book_code,
                    intent.borrower,
                    e
                );
                return StandardResult::failure(e.to_string());
            }
        };

        if let Err(e) = self.store.save(&self.catalog).await {
            tracing::error!("Persisting to {} failed, rolling back: {:#}", self.store.describe(), e);
            self.catalog.restore(&intent.book_code, previous);
            return StandardResult::failure(self.role.internal_error_message());
        }

        if let Some(replicator) = &self.replicator {
            let _ = replicator.schedule(self.catalog.clone());
        }

        tracing::info!(
            "{} {} {} applied on {}",
            intent.kind,
            intent.book_code,
            intent.borrower,
            self.role
        );
        applied.into_result()
    }

    /// Moves the engine into its own task and returns the handle to reach it.
    pub fn spawn(self) -> EngineHandle {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let role = self.role;
        tokio::spawn(self.run(rx));
        EngineHandle { role, tx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        tracing::info!("Storage engine ({}) serving {} books", self.role, self.catalog.len());

        while let Some(command) = rx.recv().await {
            match command {
                Command::Apply { intent, reply } => {
                    let result = self.apply(&intent).await;
                    if reply.send(result).is_err() {
                        tracing::warn!("Requester went away before the reply for {}", intent.book_code);
                    }
                }
                Command::Lookup { code, reply } => {
                    let _ = reply.send(self.catalog.get(&code).cloned());
                }
            }
        }

        tracing::info!("Storage engine ({}) stopped", self.role);
    }
}

/// Cloneable entry point to a running [`StorageEngine`].
#[derive(Clone)]
pub struct EngineHandle {
    role: InstanceRole,
    tx: mpsc::Sender<Command>,
}

impl EngineHandle {
    pub fn role(&self) -> InstanceRole {
        self.role
    }

    pub async fn apply(&self, intent: WorkerIntent) -> Result<StandardResult> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Apply { intent, reply })
            .await
            .map_err(|_| anyhow!("storage engine is not running"))?;
        rx.await.map_err(|_| anyhow!("storage engine dropped the request"))
    }

    pub async fn lookup(&self, code: &str) -> Result<Option<BookRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Lookup {
                code: code.to_string(),
                reply,
            })
            .await
            .map_err(|_| anyhow!("storage engine is not running"))?;
        rx.await.map_err(|_| anyhow!("storage engine dropped the request"))
    }
}
