use super::RequestError;
use crate::bus::{BusPublisher, Frame, Topic};
use crate::config::{DispatchMode, RouterConfig};
use crate::protocol::{ENDPOINT_LOAN, IntentKind, StandardResult, UNKNOWN_BORROWER, WorkerIntent};
use crate::security::gate::FIELD_OPERATION;
use crate::security::{SecurityEnvelope, SecurityGate};

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};

pub const LOAN_WORKER_UNREACHABLE: &str = "Error al comunicarse con el Actor de Préstamo.";

const FIELD_BOOK_CODE: &str = "codigo_libro";
const FIELD_BORROWER: &str = "usuario";

enum Admission {
    Serial(Mutex<()>),
    Concurrent(Semaphore),
}

/// Synchronous channel to the site's Loan Worker.
pub struct LoanClient {
    http_client: reqwest::Client,
    url: String,
}

impl LoanClient {
    /// `timeout` should cover the worker's full failover budget.
    pub fn new(worker_addr: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building loan worker HTTP client")?;

        Ok(Self {
            http_client,
            url: format!("http://{}{}", worker_addr, ENDPOINT_LOAN),
        })
    }

    pub async fn request(&self, intent: &WorkerIntent) -> Result<StandardResult> {
        let response = self.http_client.post(&self.url).json(intent).send().await?;
        response
            .json::<StandardResult>()
            .await
            .context("decoding loan worker reply")
    }
}

/// Per-site request pipeline: parse, gate, dispatch.
pub struct RouterService {
    gate: SecurityGate,
    bus: BusPublisher,
    loan_client: LoanClient,
    admission: Admission,
}

impl RouterService {
    pub fn new(gate: SecurityGate, bus: BusPublisher, loan_client: LoanClient, config: &RouterConfig) -> Self {
        let admission = match config.mode {
            DispatchMode::Serial => Admission::Serial(Mutex::new(())),
            DispatchMode::Concurrent => Admission::Concurrent(Semaphore::new(config.pool_size.max(1))),
        };

        Self {
            gate,
            bus,
            loan_client,
            admission,
        }
    }

    pub fn bus(&self) -> &BusPublisher {
        &self.bus
    }

    /// Handles one client request body under the configured admission policy.
    pub async fn handle(&self, body: &[u8]) -> StandardResult {
        match &self.admission {
            Admission::Serial(lock) => {
                let _guard = lock.lock().await;
                self.process(body).await
            }
            Admission::Concurrent(pool) => {
                let _permit = match pool.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return StandardResult::failure(super::INTERNAL_ERROR_MESSAGE),
                };
                self.process(body).await
            }
        }
    }

    async fn process(&self, body: &[u8]) -> StandardResult {
        let Some(envelope) = SecurityEnvelope::parse(body) else {
            tracing::warn!("Rejected request: not a JSON object");
            return StandardResult::failure(RequestError::Malformed.to_string());
        };

        if let Err(e) = self.gate.check(&envelope) {
            tracing::warn!("Rejected request from {:?}: {}", envelope.identity(), e);
            return StandardResult::failure(e.to_string());
        }

        let intent = match build_intent(&envelope) {
            Ok(intent) => intent,
            Err(e) => {
                tracing::warn!("Rejected request from {:?}: {}", envelope.identity(), e);
                return StandardResult::failure(e.to_string());
            }
        };

        match Topic::for_kind(intent.kind) {
            Some(topic) => self.defer(topic, intent),
            None => self.lend(intent).await,
        }
    }

    /// Publishes and acknowledges without waiting for the outcome.
    fn defer(&self, topic: Topic, intent: WorkerIntent) -> StandardResult {
        let delivered = self.bus.publish(&Frame::new(topic, intent.clone()));
        tracing::info!(
            "{} {} {} published to {} subscriber(s)",
            intent.kind,
            intent.book_code,
            intent.borrower,
            delivered
        );

        StandardResult::success(match topic {
            Topic::Return => "La devolución fue aceptada. La BD se actualizará en segundo plano.",
            Topic::Renew => "La renovación fue aceptada. La BD se actualizará en segundo plano.",
        })
    }

    async fn lend(&self, intent: WorkerIntent) -> StandardResult {
        match self.loan_client.request(&intent).await {
            Ok(result) => {
                tracing::info!("Loan {} {} -> {}", intent.book_code, intent.borrower, result.mensaje);
                result
            }
            Err(e) => {
                tracing::error!("Loan worker failed for {}: {:#}", intent.book_code, e);
                StandardResult::failure(LOAN_WORKER_UNREACHABLE)
            }
        }
    }
}

/// Extracts the intent from an envelope that already passed the gate.
pub fn build_intent(envelope: &SecurityEnvelope) -> Result<WorkerIntent, RequestError> {
    let (Some(operation), Some(book_code)) = (envelope.text(FIELD_OPERATION), envelope.text(FIELD_BOOK_CODE)) else {
        return Err(RequestError::InvalidRequest);
    };
    if operation.is_empty() || book_code.is_empty() {
        return Err(RequestError::InvalidRequest);
    }

    let kind: IntentKind = operation
        .parse()
        .map_err(|_| RequestError::UnsupportedOperation(operation.to_string()))?;
    let borrower = envelope.text(FIELD_BORROWER).unwrap_or(UNKNOWN_BORROWER);

    Ok(WorkerIntent::new(kind, book_code, borrower))
}
