//! Static credential and role tables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Roles recognised by the access-control whitelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "CLIENTE")]
    Client,
    #[serde(rename = "ACTOR")]
    Worker,
    #[serde(rename = "GA")]
    Storage,
}

impl Role {
    /// The operations this role may request.
    pub fn allowed_operations(&self) -> &'static [Operation] {
        match self {
            Role::Client => &[Operation::Loan, Operation::Return, Operation::Renew],
            Role::Worker => &[Operation::UpdateCatalog, Operation::QueryCatalog],
            Role::Storage => &[Operation::WriteCatalog, Operation::Replicate],
        }
    }

    pub fn permits(&self, operation: Operation) -> bool {
        self.allowed_operations().contains(&operation)
    }
}

/// Every operation name the whitelist knows about, client-facing and internal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Loan,
    Return,
    Renew,
    UpdateCatalog,
    QueryCatalog,
    WriteCatalog,
    Replicate,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Loan => "PRESTAMO",
            Operation::Return => "DEVOLUCION",
            Operation::Renew => "RENOVACION",
            Operation::UpdateCatalog => "ACTUALIZAR_BD",
            Operation::QueryCatalog => "CONSULTAR_BD",
            Operation::WriteCatalog => "ESCRIBIR_BD",
            Operation::Replicate => "REPLICAR",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRESTAMO" => Ok(Operation::Loan),
            "DEVOLUCION" => Ok(Operation::Return),
            "RENOVACION" => Ok(Operation::Renew),
            "ACTUALIZAR_BD" => Ok(Operation::UpdateCatalog),
            "CONSULTAR_BD" => Ok(Operation::QueryCatalog),
            "ESCRIBIR_BD" => Ok(Operation::WriteCatalog),
            "REPLICAR" => Ok(Operation::Replicate),
            _ => Err(()),
        }
    }
}

/// Identity -> token and identity -> role lookups.
///
/// Loaded once at start-up; [`Default`] reproduces the reference deployment
/// (two request submitters, the site workers and both storage instances).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialTable {
    #[serde(default)]
    pub tokens: HashMap<String, String>,
    #[serde(default)]
    pub roles: HashMap<String, Role>,
}

impl Default for CredentialTable {
    fn default() -> Self {
        let tokens = [
            ("ps_sede1", "TOKEN_PS_SEDE1_123"),
            ("ps_sede2", "TOKEN_PS_SEDE2_456"),
        ];
        let roles = [
            ("ps_sede1", Role::Client),
            ("ps_sede2", Role::Client),
            ("actor_dev_sede1", Role::Worker),
            ("actor_ren_sede1", Role::Worker),
            ("actor_loan_sede1", Role::Worker),
            ("ga_primary", Role::Storage),
            ("ga_replica", Role::Storage),
        ];

        Self {
            tokens: tokens
                .into_iter()
                .map(|(id, token)| (id.to_string(), token.to_string()))
                .collect(),
            roles: roles
                .into_iter()
                .map(|(id, role)| (id.to_string(), role))
                .collect(),
        }
    }
}

impl CredentialTable {
    /// Reads a `{"tokens": {...}, "roles": {...}}` JSON document.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading credential table {}", path.display()))?;
        let table = serde_json::from_str(&raw)
            .with_context(|| format!("parsing credential table {}", path.display()))?;
        Ok(table)
    }

    pub fn token_for(&self, identity: &str) -> Option<&str> {
        self.tokens.get(identity).map(String::as_str)
    }

    pub fn role_of(&self, identity: &str) -> Option<Role> {
        self.roles.get(identity).copied()
    }
}
