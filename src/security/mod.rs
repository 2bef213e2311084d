//! Security Gate
//!
//! Checks every client request before any business logic runs.
//!
//! ## Checks (always in this order)
//! 1. **Integrity**: the `hash` field must equal the SHA-256 digest of the
//!    canonical serialization of all other fields followed by the shared secret.
//! 2. **Authentication**: `cliente`/`token` must match the static credential table.
//! 3. **Authorization**: the identity's role must be allowed to run `tipo_operacion`.
//!
//! Later checks assume the earlier ones passed, so the gate short-circuits on the
//! first failure. All checks are pure functions over the envelope and the tables.

pub mod credentials;
pub mod digest;
pub mod envelope;
pub mod gate;

pub use credentials::{CredentialTable, Operation, Role};
pub use envelope::SecurityEnvelope;
pub use gate::{SecurityError, SecurityGate};
