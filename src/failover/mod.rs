//! Failover Protocol
//!
//! Primary-then-backup delivery of an intent to the Storage Engine, shared by
//! every worker.
//!
//! ## Per call
//! 1. Send to the primary. The connection is bounded by the send timeout (in the
//!    transport) and the wait for the reply by the receive timeout.
//! 2. On any transport error or timeout, send the same intent to the backup
//!    under the same bounds.
//! 3. If both fail, synthesize a failure result.
//!
//! Stateless: no circuit breaker and no sticky routing, so every call pays the
//! full primary budget while the primary is down.

pub mod transport;

pub use transport::{HttpTransport, IntentTransport};

use crate::config::FailoverConfig;
use crate::protocol::{StandardResult, WorkerIntent};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const JOINT_FAILURE_MESSAGE: &str = "Error al comunicarse con GA primario y GA respaldo.";

/// Which instance produced a delivery's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Primary,
    Backup,
    None,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Primary => f.write_str("primary"),
            Origin::Backup => f.write_str("backup"),
            Origin::None => f.write_str("none"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub result: StandardResult,
    pub origin: Origin,
}

#[derive(Clone)]
pub struct Failover {
    transport: Arc<dyn IntentTransport>,
    primary: String,
    backup: String,
    receive_timeout: Duration,
}

impl Failover {
    pub fn new(
        transport: Arc<dyn IntentTransport>,
        primary: impl Into<String>,
        backup: impl Into<String>,
        config: &FailoverConfig,
    ) -> Self {
        Self {
            transport,
            primary: primary.into(),
            backup: backup.into(),
            receive_timeout: config.receive_timeout,
        }
    }

    pub async fn deliver(&self, intent: &WorkerIntent) -> Delivery {
        if let Some(result) = self.attempt(&self.primary, intent).await {
            return Delivery {
                result,
                origin: Origin::Primary,
            };
        }

        tracing::warn!("Primary {} failed, retrying {} on backup {}", self.primary, intent.book_code, self.backup);

        if let Some(result) = self.attempt(&self.backup, intent).await {
            return Delivery {
                result,
                origin: Origin::Backup,
            };
        }

        tracing::error!("Both storage instances failed for {} {}", intent.kind, intent.book_code);
        Delivery {
            result: StandardResult::failure(JOINT_FAILURE_MESSAGE),
            origin: Origin::None,
        }
    }

    async fn attempt(&self, target: &str, intent: &WorkerIntent) -> Option<StandardResult> {
        match tokio::time::timeout(self.receive_timeout, self.transport.send(target, intent)).await {
            Ok(Ok(result)) => Some(result),
            Ok(Err(e)) => {
                tracing::warn!("Storage {} unreachable: {:#}", target, e);
                None
            }
            Err(_) => {
                tracing::warn!("Storage {} gave no reply within {:?}", target, self.receive_timeout);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests;
