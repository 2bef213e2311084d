//! Wire Protocol
//!
//! Message shapes shared by every process of the circulation cluster, plus the
//! HTTP endpoints they travel on. Field names are the wire contract and keep
//! the Spanish names used by existing clients and data files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// --- API Endpoints ---

/// Public endpoint of the Request Router (one per site).
pub const ENDPOINT_OPERATIONS: &str = "/operations";
/// Router -> Loan Worker synchronous exchange.
pub const ENDPOINT_LOAN: &str = "/internal/loan";
/// Worker -> Storage Engine intent application.
pub const ENDPOINT_INTENT: &str = "/internal/intent";
/// Read-only book lookup on a Storage Engine instance.
pub const ENDPOINT_BOOK: &str = "/internal/book";

/// Borrower recorded when a request omits `usuario`.
pub const UNKNOWN_BORROWER: &str = "desconocido";

/// The three catalog mutations a client may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentKind {
    #[serde(rename = "PRESTAMO")]
    Loan,
    #[serde(rename = "DEVOLUCION")]
    Return,
    #[serde(rename = "RENOVACION")]
    Renew,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::Loan => "PRESTAMO",
            IntentKind::Return => "DEVOLUCION",
            IntentKind::Renew => "RENOVACION",
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentKind {
    type Err = IntentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRESTAMO" => Ok(IntentKind::Loan),
            "DEVOLUCION" => Ok(IntentKind::Return),
            "RENOVACION" => Ok(IntentKind::Renew),
            other => Err(IntentError::Unsupported(other.to_string())),
        }
    }
}

/// An operation intent relayed from a worker to a Storage Engine instance.
///
/// Ephemeral: built by the router, carried over HTTP or the bus, applied to the
/// catalog and then dropped. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerIntent {
    #[serde(rename = "accion")]
    pub kind: IntentKind,
    #[serde(rename = "codigo_libro")]
    pub book_code: String,
    #[serde(rename = "usuario")]
    pub borrower: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IntentError {
    #[error("Mensaje inválido: falta acción o código.")]
    Missing,
    #[error("Acción no soportada: {0}")]
    Unsupported(String),
}

#[derive(Deserialize)]
struct RawIntent {
    accion: Option<String>,
    codigo_libro: Option<String>,
    usuario: Option<String>,
}

impl WorkerIntent {
    pub fn new(kind: IntentKind, book_code: impl Into<String>, borrower: impl Into<String>) -> Self {
        Self {
            kind,
            book_code: book_code.into(),
            borrower: borrower.into(),
        }
    }

    /// Lenient decoding used at every receiving end.
    ///
    /// Missing `accion`/`codigo_libro` and unknown actions are reported with the
    /// messages the storage processes answer with; a missing borrower falls
    /// back to [`UNKNOWN_BORROWER`].
    pub fn decode(bytes: &[u8]) -> Result<Self, IntentError> {
        let raw: RawIntent = serde_json::from_slice(bytes).map_err(|_| IntentError::Missing)?;

        let (Some(action), Some(book_code)) = (raw.accion, raw.codigo_libro) else {
            return Err(IntentError::Missing);
        };
        if action.is_empty() || book_code.is_empty() {
            return Err(IntentError::Missing);
        }

        Ok(Self {
            kind: action.parse()?,
            book_code,
            borrower: raw.usuario.unwrap_or_else(|| UNKNOWN_BORROWER.to_string()),
        })
    }
}

/// Reply shape shared by the router, the workers and the storage engines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardResult {
    pub ok: bool,
    pub mensaje: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha_fin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nueva_fecha_fin: Option<String>,
}

impl StandardResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            mensaje: message.into(),
            fecha_fin: None,
            nueva_fecha_fin: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            mensaje: message.into(),
            fecha_fin: None,
            nueva_fecha_fin: None,
        }
    }

    pub fn with_due_date(mut self, due: impl Into<String>) -> Self {
        self.fecha_fin = Some(due.into());
        self
    }

    pub fn with_new_due_date(mut self, due: impl Into<String>) -> Self {
        self.nueva_fecha_fin = Some(due.into());
        self
    }
}
