//! Storage Engine Module
//!
//! Primary and backup instances of the catalog store.
//!
//! ## Core Concepts
//! - **Catalog**: book code -> available copies and active loans, owned by exactly one engine task.
//! - **Persistence**: the full catalog is rewritten to the instance's own snapshot after each mutation.
//! - **Replication**: the primary mirrors its snapshot to the backup's store asynchronously.
//! - **Reconciliation**: at start-up the primary adopts the backup's snapshot if it is newer.
//! - **Liveness**: a UDP `PING`/`PONG` responder for external monitoring.

pub mod catalog;
pub mod engine;
pub mod handlers;
pub mod liveness;
pub mod node;
pub mod replication;
pub mod snapshot;

#[cfg(test)]
mod tests;
