//! Request Router
//!
//! The client-facing endpoint of one site.
//!
//! ## Per request
//! 1. Parse the body; a malformed one is rejected with no side effect.
//! 2. Run the security gate (integrity, authentication, authorization).
//! 3. Dispatch by kind:
//!    - **Return / Renew**: publish on the bus and acknowledge at once. The
//!      reply means "accepted for processing", not "applied".
//!    - **Loan**: ask the Loan Worker and relay its verdict.
//!
//! Admission is either `Serial` (one request at a time) or `Concurrent`
//! (bounded by `pool_size`). Each in-flight request gets its own HTTP exchange
//! with the Loan Worker, so no reply channel is ever shared.

pub mod handlers;
pub mod service;

pub use service::{LoanClient, RouterService};

use crate::bus::BusPublisher;
use crate::config::{DispatchMode, FailoverConfig, RouterConfig, SiteConfig};
use crate::security::SecurityGate;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

pub const INTERNAL_ERROR_MESSAGE: &str = "Error interno en GC";

/// Slack on top of the loan worker's own failover budget.
const LOAN_REPLY_SLACK: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("Mensaje inválido: no es JSON.")]
    Malformed,
    #[error("Solicitud inválida: falta tipo_operacion o codigo_libro.")]
    InvalidRequest,
    #[error("Tipo de operación no soportado: {0}")]
    UnsupportedOperation(String),
}

/// How long the router waits for the Loan Worker's verdict. The worker applies
/// loans one at a time, so under `Concurrent` admission a loan can queue behind
/// `pool_size - 1` others, each taking up to a full failover delivery.
pub fn loan_reply_timeout(config: &RouterConfig, failover: &FailoverConfig) -> Duration {
    let queued = match config.mode {
        DispatchMode::Serial => 1,
        DispatchMode::Concurrent => u32::try_from(config.pool_size.max(1)).unwrap_or(u32::MAX),
    };

    failover.delivery_budget().saturating_mul(queued) + LOAN_REPLY_SLACK
}

pub async fn run(
    site: SiteConfig,
    config: RouterConfig,
    gate: SecurityGate,
    failover: FailoverConfig,
) -> Result<()> {
    let bus = BusPublisher::bind(site.bus_addr).await?;
    let loan_client = LoanClient::new(&site.loan_worker_addr.to_string(), loan_reply_timeout(&config, &failover))?;
    let service = Arc::new(RouterService::new(gate, bus, loan_client, &config));

    let listener = tokio::net::TcpListener::bind(site.router_addr).await?;
    tracing::info!(
        "Router for site {} listening on {} ({:?}, pool {})",
        site.site,
        listener.local_addr()?,
        config.mode,
        config.pool_size
    );

    axum::serve(listener, handlers::router(service)).await?;
    Ok(())
}
