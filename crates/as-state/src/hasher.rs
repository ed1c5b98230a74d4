//! Canonical serialization and content hashing for [`Resource`].
//!
//! Hashing must be stable across machines and runs: identical logical
//! content always produces an identical hash. `Resource::attributes`
//! is a `BTreeMap` so key order is already lexicographic; `serde_json`
//! serializes maps in iteration order, so no extra sorting pass is
//! needed here.

use as_domain::resource::{ContentHash, Resource};
use sha2::{Digest, Sha256};

/// Hash a resource's canonical form and return a `sha256:<hex>` digest.
pub fn hash_resource(resource: &Resource) -> ContentHash {
    let canonical =
        serde_json::to_vec(resource).expect("Resource serialization is infallible");
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    let digest = hasher.finalize();
    ContentHash(format!("sha256:{}", hex::encode(digest)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn agent(name: &str) -> Resource {
        Resource {
            kind: as_domain::resource::Kind::Agent,
            pkg: "demo".into(),
            name: name.into(),
            attributes: BTreeMap::new(),
            references: vec![],
        }
    }

    #[test]
    fn identical_content_hashes_identically() {
        assert_eq!(hash_resource(&agent("a")), hash_resource(&agent("a")));
    }

    #[test]
    fn different_content_hashes_differently() {
        assert_ne!(hash_resource(&agent("a")), hash_resource(&agent("b")));
    }

    #[test]
    fn hash_has_sha256_prefix() {
        let h = hash_resource(&agent("a"));
        assert!(h.0.starts_with("sha256:"));
        assert_eq!(h.0.len(), "sha256:".len() + 64);
    }

    #[test]
    fn attribute_key_order_does_not_affect_hash() {
        let mut attrs_a = BTreeMap::new();
        attrs_a.insert("z".to_string(), as_domain::resource::AttrValue::Bool(true));
        attrs_a.insert(
            "a".to_string(),
            as_domain::resource::AttrValue::String("x".into()),
        );
        let mut attrs_b = BTreeMap::new();
        attrs_b.insert(
            "a".to_string(),
            as_domain::resource::AttrValue::String("x".into()),
        );
        attrs_b.insert("z".to_string(), as_domain::resource::AttrValue::Bool(true));

        let r_a = Resource {
            kind: as_domain::resource::Kind::Agent,
            pkg: "demo".into(),
            name: "a".into(),
            attributes: attrs_a,
            references: vec![],
        };
        let r_b = Resource {
            attributes: attrs_b,
            ..r_a.clone()
        };
        assert_eq!(hash_resource(&r_a), hash_resource(&r_b));
    }
}
