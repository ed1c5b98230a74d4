//! Identifier generation: `sess_`, `cor_`, `tr_`, and `cf_`
//! prefixed IDs, each 22 base64url characters (128 bits of entropy) drawn
//! from the same cryptographic generator so distinctness holds across all
//! four ID kinds within a single run.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Generates a `<prefix>_<22 base64url chars>` identifier from 16
/// cryptographically random bytes. Uses `uuid`'s v4 generator (backed by
/// the OS CSPRNG via `getrandom`) as the entropy source rather than
/// reaching for a dedicated RNG crate the workspace doesn't otherwise need.
pub fn new_id(prefix: &str) -> String {
    let bytes = *uuid::Uuid::new_v4().as_bytes();
    format!("{prefix}_{}", URL_SAFE_NO_PAD.encode(bytes))
}

pub fn new_session_id() -> String {
    new_id("sess")
}

pub fn new_correlation_id() -> String {
    new_id("cor")
}

pub fn new_trace_id() -> String {
    new_id("tr")
}

pub fn new_control_flow_id() -> String {
    new_id("cf")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_carry_the_right_prefix_and_length() {
        let id = new_session_id();
        assert!(id.starts_with("sess_"));
        assert_eq!(id["sess_".len()..].len(), 22);
    }

    #[test]
    fn ten_thousand_generated_ids_are_distinct() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(new_session_id()));
        }
    }
}
