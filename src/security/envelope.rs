use super::digest::compute_digest;
use serde_json::{Map, Value};

/// Field carrying the requester identity.
pub const FIELD_IDENTITY: &str = "cliente";
/// Field carrying the shared credential.
pub const FIELD_CREDENTIAL: &str = "token";
/// Field carrying the integrity digest. Excluded from the digest itself.
pub const FIELD_DIGEST: &str = "hash";

/// A client request as received on the wire: every field of the JSON object,
/// signed or not, so the digest covers exactly what the client sent.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityEnvelope {
    fields: Map<String, Value>,
}

impl SecurityEnvelope {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Parses a request body. `None` unless it is a JSON object.
    pub fn parse(body: &[u8]) -> Option<Self> {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(fields)) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Builds a signed envelope: `fields` plus the digest under [`FIELD_DIGEST`].
    pub fn sign(mut fields: Map<String, Value>, secret: &str) -> Self {
        fields.remove(FIELD_DIGEST);
        let digest = compute_digest(&fields, secret);
        fields.insert(FIELD_DIGEST.to_string(), Value::String(digest));
        Self { fields }
    }

    pub fn identity(&self) -> Option<&str> {
        self.text(FIELD_IDENTITY)
    }

    pub fn credential(&self) -> Option<&str> {
        self.text(FIELD_CREDENTIAL)
    }

    pub fn digest(&self) -> Option<&str> {
        self.text(FIELD_DIGEST)
    }

    /// A string-valued field; `None` when absent, null or not a string.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// All fields except the digest, i.e. what the digest is computed over.
    pub fn signed_fields(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .filter(|(key, _)| key.as_str() != FIELD_DIGEST)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}
