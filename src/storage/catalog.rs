//! Catalog Model
//!
//! The book catalog owned by one Storage Engine instance, and the three
//! mutations that operation intents apply to it.
//!
//! The serialized shape matches the on-disk snapshots and the seed dataset:
//! `{"LIB001": {"ejemplares_disponibles": 2, "prestamos": [...]}}`. Per-book
//! fields this module does not interpret (titles, authors, ...) are carried
//! through untouched.

use crate::protocol::{IntentKind, StandardResult, WorkerIntent};

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum number of renewals per loan.
pub const MAX_RENEWALS: u32 = 2;
/// Length of a loan (and of each renewal) in days.
pub const LOAN_PERIOD_DAYS: i64 = 14;

pub type BookCode = String;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("El libro no existe.")]
    NotFound,
    #[error("No hay ejemplares disponibles.")]
    Unavailable,
    #[error("El usuario no tiene este libro.")]
    NoActiveLoan,
    #[error("No se puede renovar más veces.")]
    RenewalLimitExceeded,
    #[error("El número de ejemplares del libro es inválido.")]
    CopyCountOverflow,
}

/// One active loan of one copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    #[serde(rename = "usuario")]
    pub borrower: String,
    #[serde(rename = "fecha_inicio", with = "timestamp")]
    pub started_at: NaiveDateTime,
    #[serde(rename = "fecha_fin", with = "timestamp")]
    pub due_at: NaiveDateTime,
    #[serde(rename = "renovaciones", default)]
    pub renewals: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    #[serde(rename = "ejemplares_disponibles")]
    pub available_copies: u32,
    #[serde(rename = "prestamos", default)]
    pub loans: Vec<Loan>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl BookRecord {
    pub fn with_copies(available_copies: u32) -> Self {
        Self {
            available_copies,
            loans: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// First loan held by `borrower`; authoritative for return and renewal.
    fn loan_index(&self, borrower: &str) -> Option<usize> {
        self.loans.iter().position(|loan| loan.borrower == borrower)
    }

    pub fn loan_of(&self, borrower: &str) -> Option<&Loan> {
        self.loan_index(borrower).map(|idx| &self.loans[idx])
    }
}

/// Outcome of a successfully applied intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Loaned { due_at: NaiveDateTime },
    Returned,
    Renewed { due_at: NaiveDateTime },
}

impl Applied {
    pub fn into_result(self) -> StandardResult {
        match self {
            Applied::Loaned { due_at } => {
                StandardResult::success("Préstamo registrado").with_due_date(timestamp::format(&due_at))
            }
            Applied::Returned => StandardResult::success("Devolución registrada"),
            Applied::Renewed { due_at } => StandardResult::success("Renovación realizada")
                .with_new_due_date(timestamp::format(&due_at)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    books: BTreeMap<BookCode, BookRecord>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, code: &str) -> Option<&BookRecord> {
        self.books.get(code)
    }

    pub fn insert(&mut self, code: impl Into<BookCode>, record: BookRecord) {
        self.books.insert(code.into(), record);
    }

    /// Puts a record back exactly as it was (`None` removes it).
    pub fn restore(&mut self, code: &str, previous: Option<BookRecord>) {
        match previous {
            Some(record) => {
                self.books.insert(code.to_string(), record);
            }
            None => {
                self.books.remove(code);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn apply(&mut self, intent: &WorkerIntent, now: NaiveDateTime) -> Result<Applied, CatalogError> {
        match intent.kind {
            IntentKind::Loan => self
                .lend(&intent.book_code, &intent.borrower, now)
                .map(|due_at| Applied::Loaned { due_at }),
            IntentKind::Return => self
                .return_copy(&intent.book_code, &intent.borrower)
                .map(|_| Applied::Returned),
            IntentKind::Renew => self
                .renew(&intent.book_code, &intent.borrower, now)
                .map(|due_at| Applied::Renewed { due_at }),
        }
    }

    pub fn lend(&mut self, code: &str, borrower: &str, now: NaiveDateTime) -> Result<NaiveDateTime, CatalogError> {
        let record = self.books.get_mut(code).ok_or(CatalogError::NotFound)?;
        if record.available_copies == 0 {
            return Err(CatalogError::Unavailable);
        }

        let due_at = now + Duration::days(LOAN_PERIOD_DAYS);
        record.available_copies -= 1;
        record.loans.push(Loan {
            borrower: borrower.to_string(),
            started_at: now,
            due_at,
            renewals: 0,
        });

        Ok(due_at)
    }

    pub fn return_copy(&mut self, code: &str, borrower: &str) -> Result<(), CatalogError> {
        let record = self.books.get_mut(code).ok_or(CatalogError::NotFound)?;
        let idx = record.loan_index(borrower).ok_or(CatalogError::NoActiveLoan)?;
        let available_copies = record
            .available_copies
            .checked_add(1)
            .ok_or(CatalogError::CopyCountOverflow)?;

        record.loans.remove(idx);
        record.available_copies = available_copies;

        Ok(())
    }

    pub fn renew(&mut self, code: &str, borrower: &str, now: NaiveDateTime) -> Result<NaiveDateTime, CatalogError> {
        let record = self.books.get_mut(code).ok_or(CatalogError::NotFound)?;
        let idx = record.loan_index(borrower).ok_or(CatalogError::NoActiveLoan)?;
        let loan = &mut record.loans[idx];

        if loan.renewals >= MAX_RENEWALS {
            return Err(CatalogError::RenewalLimitExceeded);
        }

        loan.due_at = now + Duration::days(LOAN_PERIOD_DAYS);
        loan.renewals += 1;

        Ok(loan.due_at)
    }
}

/// `YYYY-MM-DD HH:MM:SS.ffffff` timestamps, as found in existing data files.
/// ISO-8601 `T`-separated values are accepted on input too.
pub mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
    const PARSE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

    pub fn format(value: &NaiveDateTime) -> String {
        value.format(FORMAT).to_string()
    }

    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        PARSE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    }

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
    }
}
