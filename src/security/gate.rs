use super::credentials::{CredentialTable, Operation, Role};
use super::digest::digest_matches;
use super::envelope::SecurityEnvelope;

/// Field naming the requested operation.
pub const FIELD_OPERATION: &str = "tipo_operacion";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SecurityError {
    #[error("Error de integridad: el hash no coincide.")]
    Integrity,
    #[error("Faltan credenciales del cliente.")]
    MissingCredentials,
    #[error("Token inválido o cliente no autorizado.")]
    Authentication,
    #[error("Rol desconocido para la identidad del cliente.")]
    UnknownRole,
    #[error("El rol del cliente no tiene permiso para esta operación.")]
    Authorization,
}

/// Shared secret plus credential tables; runs the three checks.
#[derive(Debug, Clone)]
pub struct SecurityGate {
    secret: String,
    credentials: CredentialTable,
}

impl SecurityGate {
    pub fn new(secret: impl Into<String>, credentials: CredentialTable) -> Self {
        Self {
            secret: secret.into(),
            credentials,
        }
    }

    pub fn verify_integrity(&self, envelope: &SecurityEnvelope) -> Result<(), SecurityError> {
        let supplied = envelope.digest().ok_or(SecurityError::Integrity)?;
        if digest_matches(&envelope.signed_fields(), &self.secret, supplied) {
            Ok(())
        } else {
            Err(SecurityError::Integrity)
        }
    }

    pub fn authenticate(&self, identity: &str, credential: &str) -> Result<(), SecurityError> {
        match self.credentials.token_for(identity) {
            Some(expected) if expected == credential => Ok(()),
            _ => Err(SecurityError::Authentication),
        }
    }

    pub fn role_of(&self, identity: &str) -> Result<Role, SecurityError> {
        self.credentials
            .role_of(identity)
            .ok_or(SecurityError::UnknownRole)
    }

    /// Unknown operation names are never authorized.
    pub fn authorize(role: Role, operation: Option<&str>) -> Result<Operation, SecurityError> {
        let operation: Operation = operation
            .and_then(|name| name.parse().ok())
            .ok_or(SecurityError::Authorization)?;

        if role.permits(operation) {
            Ok(operation)
        } else {
            Err(SecurityError::Authorization)
        }
    }

    /// Integrity, then authentication, then authorization.
    pub fn check(&self, envelope: &SecurityEnvelope) -> Result<(Role, Operation), SecurityError> {
        self.verify_integrity(envelope)?;

        let (Some(identity), Some(credential)) = (envelope.identity(), envelope.credential()) else {
            return Err(SecurityError::MissingCredentials);
        };
        if identity.is_empty() || credential.is_empty() {
            return Err(SecurityError::MissingCredentials);
        }
        self.authenticate(identity, credential)?;

        let role = self.role_of(identity)?;
        let operation = Self::authorize(role, envelope.text(FIELD_OPERATION))?;

        Ok((role, operation))
    }
}
