//! Plan computation and drift detection (spec §4.3).

use std::collections::HashMap;

use as_domain::resource::{Action, ActionType, ContentHash, Resource, StateEntry};

use crate::hasher::hash_resource;

/// Output of [`compute_plan`].
#[derive(Debug, Clone)]
pub struct Plan {
    pub actions: Vec<Action>,
    pub has_changes: bool,
}

/// Diff desired resources against the realized state. `current` is
/// indexed by FQN; desired resources are walked in their given order
/// (callers pass them in canonical — kind-then-name — order) and
/// matched against `current` by hash.
pub fn compute_plan(desired: &[Resource], current: &[StateEntry]) -> Plan {
    let mut current_by_fqn: HashMap<&str, &StateEntry> = HashMap::new();
    for entry in current {
        current_by_fqn.insert(entry.fqn.as_str(), entry);
    }

    let mut actions = Vec::new();
    let mut seen_fqns: std::collections::HashSet<String> = std::collections::HashSet::new();

    for resource in desired {
        let fqn = resource.fqn();
        seen_fqns.insert(fqn.clone());
        let new_hash = hash_resource(resource);

        match current_by_fqn.get(fqn.as_str()) {
            None => actions.push(Action {
                action_type: ActionType::Create,
                fqn,
                resource: Some(resource.clone()),
                previous_hash: None,
            }),
            Some(existing) if existing.hash == new_hash => actions.push(Action {
                action_type: ActionType::Noop,
                fqn,
                resource: Some(resource.clone()),
                previous_hash: Some(existing.hash.clone()),
            }),
            Some(existing) => actions.push(Action {
                action_type: ActionType::Update,
                fqn,
                resource: Some(resource.clone()),
                previous_hash: Some(existing.hash.clone()),
            }),
        }
    }

    for entry in current {
        if !seen_fqns.contains(&entry.fqn) {
            actions.push(Action {
                action_type: ActionType::Delete,
                fqn: entry.fqn.clone(),
                resource: None,
                previous_hash: Some(entry.hash.clone()),
            });
        }
    }

    actions.sort_by(|a, b| a.ordering_key().cmp(&b.ordering_key()));
    let has_changes = actions
        .iter()
        .any(|a| a.action_type != ActionType::Noop);

    Plan {
        actions,
        has_changes,
    }
}

/// One drifted FQN and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftKind {
    /// Present in state, absent from desired.
    Missing,
    /// Present in desired, absent from state.
    Extra,
    /// Present on both sides with differing hashes.
    HashMismatch {
        desired_hash: ContentHash,
        state_hash: ContentHash,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftedResource {
    pub fqn: String,
    pub kind: DriftKind,
}

#[derive(Debug, Clone)]
pub struct Drift {
    pub drifted: Vec<DriftedResource>,
}

/// Compare desired resources against realized state, ordered by FQN.
pub fn detect_drift(desired: &[Resource], current: &[StateEntry]) -> Drift {
    let mut current_by_fqn: HashMap<&str, &StateEntry> = HashMap::new();
    for entry in current {
        current_by_fqn.insert(entry.fqn.as_str(), entry);
    }
    let mut desired_by_fqn: HashMap<String, ContentHash> = HashMap::new();
    for resource in desired {
        desired_by_fqn.insert(resource.fqn(), hash_resource(resource));
    }

    let mut drifted = Vec::new();
    for entry in current {
        match desired_by_fqn.get(&entry.fqn) {
            None => drifted.push(DriftedResource {
                fqn: entry.fqn.clone(),
                kind: DriftKind::Missing,
            }),
            Some(desired_hash) if *desired_hash != entry.hash => {
                drifted.push(DriftedResource {
                    fqn: entry.fqn.clone(),
                    kind: DriftKind::HashMismatch {
                        desired_hash: desired_hash.clone(),
                        state_hash: entry.hash.clone(),
                    },
                })
            }
            Some(_) => {}
        }
    }
    for (fqn, _) in &desired_by_fqn {
        if !current_by_fqn.contains_key(fqn.as_str()) {
            drifted.push(DriftedResource {
                fqn: fqn.clone(),
                kind: DriftKind::Extra,
            });
        }
    }

    drifted.sort_by(|a, b| a.fqn.cmp(&b.fqn));
    Drift { drifted }
}

/// Render a drift report as deterministic plain text.
pub fn format_text(drift: &Drift) -> String {
    let mut out = String::new();
    for d in &drift.drifted {
        let label = match &d.kind {
            DriftKind::Missing => "missing".to_string(),
            DriftKind::Extra => "extra".to_string(),
            DriftKind::HashMismatch { .. } => "hash_mismatch".to_string(),
        };
        out.push_str(&format!("{}\t{}\n", label, d.fqn));
    }
    out
}

/// Render a drift report as deterministic JSON.
pub fn format_json(drift: &Drift) -> serde_json::Value {
    let items: Vec<_> = drift
        .drifted
        .iter()
        .map(|d| match &d.kind {
            DriftKind::Missing => serde_json::json!({"fqn": d.fqn, "kind": "missing"}),
            DriftKind::Extra => serde_json::json!({"fqn": d.fqn, "kind": "extra"}),
            DriftKind::HashMismatch {
                desired_hash,
                state_hash,
            } => serde_json::json!({
                "fqn": d.fqn,
                "kind": "hash_mismatch",
                "desired_hash": desired_hash.0,
                "state_hash": state_hash.0,
            }),
        })
        .collect();
    serde_json::json!({ "drifted": items })
}

#[cfg(test)]
mod tests {
    use super::*;
    use as_domain::resource::{Kind, StateStatus};
    use std::collections::BTreeMap;

    fn agent(name: &str) -> Resource {
        Resource {
            kind: Kind::Agent,
            pkg: "demo".into(),
            name: name.into(),
            attributes: BTreeMap::new(),
            references: vec![],
        }
    }

    fn state_entry_for(resource: &Resource) -> StateEntry {
        StateEntry {
            fqn: resource.fqn(),
            hash: hash_resource(resource),
            status: StateStatus::Applied,
            adapter: "local_process".into(),
            last_applied: chrono::Utc::now(),
        }
    }

    #[test]
    fn new_resource_is_create() {
        let plan = compute_plan(&[agent("a")], &[]);
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].action_type, ActionType::Create);
        assert!(plan.has_changes);
    }

    #[test]
    fn unchanged_resource_is_noop() {
        let r = agent("a");
        let entry = state_entry_for(&r);
        let plan = compute_plan(&[r], &[entry]);
        assert_eq!(plan.actions[0].action_type, ActionType::Noop);
        assert!(!plan.has_changes);
    }

    #[test]
    fn changed_attributes_is_update_with_previous_hash() {
        let mut r = agent("a");
        let old_entry = state_entry_for(&r);
        r.attributes
            .insert("x".into(), as_domain::resource::AttrValue::Bool(true));
        let plan = compute_plan(&[r], &[old_entry.clone()]);
        assert_eq!(plan.actions[0].action_type, ActionType::Update);
        assert_eq!(plan.actions[0].previous_hash, Some(old_entry.hash));
    }

    #[test]
    fn removed_resource_is_delete() {
        let r = agent("a");
        let entry = state_entry_for(&r);
        let plan = compute_plan(&[], &[entry]);
        assert_eq!(plan.actions[0].action_type, ActionType::Delete);
        assert!(plan.has_changes);
    }

    #[test]
    fn plan_actions_sorted_by_ordering_key() {
        let plan = compute_plan(&[agent("z"), agent("a")], &[]);
        let fqns: Vec<_> = plan.actions.iter().map(|a| a.fqn.as_str()).collect();
        assert_eq!(fqns, vec!["demo/Agent/a", "demo/Agent/z"]);
    }

    #[test]
    fn drift_detects_missing_extra_and_hash_mismatch() {
        let kept = agent("kept");
        let kept_entry = state_entry_for(&kept);
        let missing_entry = state_entry_for(&agent("gone"));
        let mut changed = agent("changed");
        let changed_entry = state_entry_for(&changed);
        changed
            .attributes
            .insert("k".into(), as_domain::resource::AttrValue::Bool(true));

        let drift = detect_drift(
            &[kept.clone(), changed, agent("new")],
            &[kept_entry, missing_entry, changed_entry],
        );
        let fqns: Vec<_> = drift.drifted.iter().map(|d| d.fqn.as_str()).collect();
        assert_eq!(
            fqns,
            vec!["demo/Agent/changed", "demo/Agent/gone", "demo/Agent/new"]
        );
    }

    #[test]
    fn format_text_is_deterministic() {
        let drift = detect_drift(&[], &[state_entry_for(&agent("a"))]);
        assert_eq!(format_text(&drift), format_text(&drift));
        assert_eq!(format_text(&drift), "missing\tdemo/Agent/a\n");
    }
}
