//! Secret plane: resolves `env(NAME)` and `vault(path#key)`
//! references and wires every resolved plaintext into a log-redaction
//! sink so it can never leak into structured logs or serialized state.

pub mod redact;
pub mod resolver;

pub use redact::{RedactingMakeWriter, SecretRegistry};
pub use resolver::{resolve, EnvResolver, SecretRef, VaultResolver};
