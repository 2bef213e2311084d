//! Request Submitter
//!
//! Reads a plain-text operations file and submits each operation, signed, to a
//! site router, one at a time and in file order.
//!
//! ## File format
//! One `TIPO;CODIGO;USUARIO` per line. Blank lines and `#` comments are skipped;
//! lines with fewer than three fields are reported and skipped.

use crate::config::SecurityConfig;
use crate::protocol::{ENDPOINT_OPERATIONS, StandardResult};
use crate::security::SecurityEnvelope;
use crate::security::envelope::{FIELD_CREDENTIAL, FIELD_IDENTITY};
use crate::security::gate::FIELD_OPERATION;

use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOperation {
    /// Upper-cased as read; validated by the router, not here.
    pub kind: String,
    pub book_code: String,
    pub borrower: String,
}

pub fn parse_operations(text: &str) -> Vec<ClientOperation> {
    let mut operations = Vec::new();

    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split(';').collect();
        if parts.len() < 3 {
            tracing::warn!("Skipping invalid operation on line {}: {}", number + 1, line);
            continue;
        }

        operations.push(ClientOperation {
            kind: parts[0].trim().to_uppercase(),
            book_code: parts[1].trim().to_string(),
            borrower: parts[2].trim().to_string(),
        });
    }

    operations
}

pub fn read_operations(path: &Path) -> Result<Vec<ClientOperation>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading operations file {}", path.display()))?;
    Ok(parse_operations(&text))
}

pub struct LibraryClient {
    http_client: reqwest::Client,
    url: String,
    identity: String,
    token: String,
    secret: String,
}

impl LibraryClient {
    pub fn new(
        router_addr: &str,
        identity: impl Into<String>,
        token: impl Into<String>,
        secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building router HTTP client")?;

        Ok(Self {
            http_client,
            url: format!("http://{}{}", router_addr, ENDPOINT_OPERATIONS),
            identity: identity.into(),
            token: token.into(),
            secret: secret.into(),
        })
    }

    /// Takes the identity's token from the configured credential table.
    pub fn for_identity(router_addr: &str, identity: &str, security: &SecurityConfig, timeout: Duration) -> Result<Self> {
        let token = security
            .credentials
            .token_for(identity)
            .ok_or_else(|| anyhow!("no token configured for client '{}'", identity))?;

        Self::new(router_addr, identity, token, security.secret.clone(), timeout)
    }

    pub fn sign(&self, operation: &ClientOperation) -> SecurityEnvelope {
        let mut fields = Map::new();
        fields.insert(FIELD_IDENTITY.to_string(), Value::String(self.identity.clone()));
        fields.insert(FIELD_CREDENTIAL.to_string(), Value::String(self.token.clone()));
        fields.insert(FIELD_OPERATION.to_string(), Value::String(operation.kind.clone()));
        fields.insert("codigo_libro".to_string(), Value::String(operation.book_code.clone()));
        fields.insert("usuario".to_string(), Value::String(operation.borrower.clone()));

        SecurityEnvelope::sign(fields, &self.secret)
    }

    pub async fn send(&self, operation: &ClientOperation) -> Result<StandardResult> {
        let envelope = self.sign(operation);
        let response = self
            .http_client
            .post(&self.url)
            .json(&envelope.into_value())
            .send()
            .await
            .with_context(|| format!("sending to router at {}", self.url))?;

        response
            .json::<StandardResult>()
            .await
            .context("decoding router reply")
    }

    /// Sends every operation in order, waiting for each reply before the next.
    pub async fn submit(&self, operations: &[ClientOperation]) -> Result<Vec<StandardResult>> {
        let mut replies = Vec::with_capacity(operations.len());

        for operation in operations {
            tracing::info!(
                "Sending {} {} {}",
                operation.kind,
                operation.book_code,
                operation.borrower
            );
            let reply = self.send(operation).await?;
            tracing::info!("Router replied: ok={} {}", reply.ok, reply.mensaje);
            replies.push(reply);
        }

        Ok(replies)
    }
}
