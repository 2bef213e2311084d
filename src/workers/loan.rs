//! Loan Worker
//!
//! Synchronous relay between the router and the Storage Engine: receives one
//! loan intent per request and answers with the storage verdict.

use crate::failover::Failover;
use crate::protocol::{ENDPOINT_LOAN, StandardResult, WorkerIntent};

use anyhow::Result;
use axum::{Json, Router, body::Bytes, extract::Extension, routing::post};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const INTERNAL_ERROR_MESSAGE: &str = "Error interno en Actor de Préstamo";

pub struct LoanWorker {
    failover: Failover,
    // One intent in flight at a time.
    in_flight: Mutex<()>,
}

impl LoanWorker {
    pub fn new(failover: Failover) -> Self {
        Self {
            failover,
            in_flight: Mutex::new(()),
        }
    }

    pub async fn handle(&self, body: &[u8]) -> StandardResult {
        if serde_json::from_slice::<serde_json::Value>(body).is_err() {
            tracing::warn!("Loan worker received a non-JSON body");
            return StandardResult::failure(INTERNAL_ERROR_MESSAGE);
        }

        // Relay storage's own answer for incomplete intents.
        let intent = match WorkerIntent::decode(body) {
            Ok(intent) => intent,
            Err(e) => return StandardResult::failure(e.to_string()),
        };

        let _guard = self.in_flight.lock().await;
        let delivery = self.failover.deliver(&intent).await;
        tracing::info!(
            "Loan {} {} answered by {}: {}",
            intent.book_code,
            intent.borrower,
            delivery.origin,
            delivery.result.mensaje
        );

        delivery.result
    }
}

pub fn router(worker: Arc<LoanWorker>) -> Router {
    Router::new()
        .route(ENDPOINT_LOAN, post(handle_loan))
        .layer(Extension(worker))
}

pub async fn handle_loan(Extension(worker): Extension<Arc<LoanWorker>>, body: Bytes) -> Json<StandardResult> {
    Json(worker.handle(&body).await)
}

pub async fn run(addr: SocketAddr, worker: LoanWorker) -> Result<()> {
    let app = router(Arc::new(worker));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Loan worker listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
