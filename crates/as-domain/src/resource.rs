use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resource
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Resource kind. Ordering here is also the deterministic plan-ordering
/// used by the plan engine (`Action::ordering_key`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Kind {
    Prompt,
    Secret,
    MCPServer,
    Skill,
    MCPClient,
    Agent,
    Pipeline,
    DeployTarget,
    Policy,
    Type,
    Environment,
}

/// An opaque structured attribute value — primitive, list, or nested
/// mapping. `Map` uses a `BTreeMap` so key order is always lexicographic,
/// which is load-bearing for content hashing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<AttrValue>),
    Map(BTreeMap<String, AttrValue>),
}

/// Unit of declared state. Identity is `FQN = "<pkg>/<Kind>/<name>"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub kind: Kind,
    pub pkg: String,
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
    /// Ordered sequence of FQN strings this resource names. Order is
    /// preserved (unlike attributes) because references may be
    /// positional (e.g. pipeline step dependency order).
    #[serde(default)]
    pub references: Vec<String>,
}

impl Resource {
    pub fn fqn(&self) -> String {
        format!("{}/{:?}/{}", self.pkg, self.kind, self.name)
    }
}

/// A `sha256:<hex>` content hash. The newtype exists so plan/apply/export
/// code can never accidentally compare a raw string against a non-hash
/// value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// StateEntry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateStatus {
    Applied,
    Failed,
    Orphaned,
}

/// Persisted fact about a realized resource. The on-disk state file
/// keeps these sorted by `fqn`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEntry {
    pub fqn: String,
    pub hash: ContentHash,
    pub status: StateStatus,
    pub adapter: String,
    pub last_applied: chrono::DateTime<chrono::Utc>,
}

/// On-disk envelope for the state file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    pub entries: Vec<StateEntry>,
}

impl StateFile {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(entries: Vec<StateEntry>) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            entries,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Action
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Create,
    Update,
    Delete,
    Noop,
}

/// One plan entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub fqn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<ContentHash>,
}

impl Action {
    /// Deterministic ordering key: `(kind rank, name)`. The plan engine
    /// sorts the action list by this key so identical input always
    /// produces an identical, byte-for-byte plan.
    pub fn ordering_key<'a>(&'a self) -> (u8, &'a str) {
        let rank = self
            .resource
            .as_ref()
            .map(|r| kind_rank(r.kind))
            .unwrap_or(u8::MAX);
        (rank, self.fqn.as_str())
    }
}

fn kind_rank(kind: Kind) -> u8 {
    match kind {
        Kind::Prompt => 0,
        Kind::Secret => 1,
        Kind::MCPServer => 2,
        Kind::Skill => 3,
        Kind::MCPClient => 4,
        Kind::Agent => 5,
        Kind::Pipeline => 6,
        Kind::DeployTarget => 7,
        Kind::Policy => 8,
        Kind::Type => 9,
        Kind::Environment => 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fqn_format() {
        let r = Resource {
            kind: Kind::Agent,
            pkg: "demo".into(),
            name: "support".into(),
            attributes: BTreeMap::new(),
            references: vec![],
        };
        assert_eq!(r.fqn(), "demo/Agent/support");
    }

    #[test]
    fn action_ordering_prefers_kind_rank_then_fqn() {
        let mut actions = vec![
            Action {
                action_type: ActionType::Create,
                fqn: "demo/Agent/b".into(),
                resource: Some(Resource {
                    kind: Kind::Agent,
                    pkg: "demo".into(),
                    name: "b".into(),
                    attributes: BTreeMap::new(),
                    references: vec![],
                }),
                previous_hash: None,
            },
            Action {
                action_type: ActionType::Create,
                fqn: "demo/Prompt/z".into(),
                resource: Some(Resource {
                    kind: Kind::Prompt,
                    pkg: "demo".into(),
                    name: "z".into(),
                    attributes: BTreeMap::new(),
                    references: vec![],
                }),
                previous_hash: None,
            },
            Action {
                action_type: ActionType::Create,
                fqn: "demo/Agent/a".into(),
                resource: Some(Resource {
                    kind: Kind::Agent,
                    pkg: "demo".into(),
                    name: "a".into(),
                    attributes: BTreeMap::new(),
                    references: vec![],
                }),
                previous_hash: None,
            },
        ];
        actions.sort_by(|a, b| a.ordering_key().cmp(&b.ordering_key()));
        let fqns: Vec<_> = actions.iter().map(|a| a.fqn.as_str()).collect();
        assert_eq!(fqns, vec!["demo/Prompt/z", "demo/Agent/a", "demo/Agent/b"]);
    }

    #[test]
    fn state_file_current_version() {
        let sf = StateFile::new(vec![]);
        assert_eq!(sf.version, 1);
    }
}
