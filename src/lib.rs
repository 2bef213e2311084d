//! Distributed Library Circulation Cluster
//!
//! This library crate defines the modules every process of the cluster is
//! built from. The binary (`main.rs`) picks one role per process.
//!
//! ## Architecture Modules
//!
//! - **`router`**: The client-facing endpoint of a site. Runs the security gate
//!   and dispatches loans synchronously and returns/renewals through the bus.
//! - **`security`**: Integrity digest, static credential tables and the role
//!   whitelist.
//! - **`bus`**: Topic-keyed, at-most-once publish/subscribe over TCP for the
//!   deferred operations.
//! - **`workers`**: The loan worker and the deferred workers that relay intents
//!   to storage.
//! - **`failover`**: Primary-then-backup delivery shared by every worker.
//! - **`storage`**: The catalog engine (primary or backup), snapshots,
//!   asynchronous mirroring and the liveness responder.
//! - **`client`**: The request submitter that signs and sends operation files.

pub mod bus;
pub mod client;
pub mod config;
pub mod failover;
pub mod protocol;
pub mod router;
pub mod security;
pub mod storage;
pub mod workers;
