//! Operation Workers
//!
//! Relays between the router and the Storage Engine. Every worker reaches
//! storage through the shared [`crate::failover::Failover`] policy.
//!
//! - **`loan`**: synchronous, answers the router with the storage verdict.
//! - **`deferred`**: bus subscribers for returns and renewals; no reply path.

pub mod deferred;
pub mod loan;

pub use deferred::{DeferredWorker, WorkerStats};
pub use loan::LoanWorker;
