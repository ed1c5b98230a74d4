//! Apply engine (spec §4.4): executes a plan through an [`Adapter`],
//! updating the state file exactly once at the end of the run.

use async_trait::async_trait;

use as_domain::resource::{Action, ActionType, ContentHash, StateEntry, StateStatus};
use as_domain::Error;

use crate::backend::StateBackend;

/// Something that can realize a single planned action against the
/// outside world (e.g. the local process adapter starting/stopping a
/// runtime subprocess). Implementations name themselves via `name()`
/// so the state entry records which adapter owns a resource.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;
    async fn apply(&self, action: &Action) -> Result<(), String>;
}

/// Observer of per-action apply progress. Implemented by the server's
/// event/trace sink; a no-op implementation is provided for tests.
pub trait ApplyEmitter: Send + Sync {
    fn start(&self, correlation_id: &str, fqn: &str);
    fn success(&self, correlation_id: &str, fqn: &str);
    fn failed(&self, correlation_id: &str, fqn: &str, message: &str);
}

/// An emitter that does nothing, for callers that don't need progress events.
pub struct NullEmitter;

impl ApplyEmitter for NullEmitter {
    fn start(&self, _correlation_id: &str, _fqn: &str) {}
    fn success(&self, _correlation_id: &str, _fqn: &str) {}
    fn failed(&self, _correlation_id: &str, _fqn: &str, _message: &str) {}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyResult {
    pub created: u32,
    pub updated: u32,
    pub deleted: u32,
    pub failed: u32,
}

/// Run every action in plan order against `adapter`, persisting the
/// resulting state exactly once. Individual action failures are
/// accumulated, not fatal: the loop always runs to completion and
/// `ApplyResult.failed` tells the caller whether to treat the overall
/// run as a failure.
pub async fn apply(
    backend: &StateBackend,
    adapter: &dyn Adapter,
    actions: &[Action],
    emitter: &dyn ApplyEmitter,
    correlation_id: &str,
) -> Result<ApplyResult, Error> {
    let guard = backend.lock()?;
    let mut entries = backend.load()?;
    let mut by_fqn: std::collections::HashMap<String, StateEntry> = entries
        .drain(..)
        .map(|e| (e.fqn.clone(), e))
        .collect();

    let mut result = ApplyResult::default();

    for action in actions {
        if action.action_type == ActionType::Noop {
            continue;
        }

        emitter.start(correlation_id, &action.fqn);
        match adapter.apply(action).await {
            Ok(()) => {
                match action.action_type {
                    ActionType::Create | ActionType::Update => {
                        let hash = action
                            .resource
                            .as_ref()
                            .map(crate::hasher::hash_resource)
                            .unwrap_or_else(|| ContentHash(String::new()));
                        by_fqn.insert(
                            action.fqn.clone(),
                            StateEntry {
                                fqn: action.fqn.clone(),
                                hash,
                                status: StateStatus::Applied,
                                adapter: adapter.name().to_string(),
                                last_applied: chrono::Utc::now(),
                            },
                        );
                        if action.action_type == ActionType::Create {
                            result.created += 1;
                        } else {
                            result.updated += 1;
                        }
                    }
                    ActionType::Delete => {
                        by_fqn.remove(&action.fqn);
                        result.deleted += 1;
                    }
                    ActionType::Noop => unreachable!(),
                }
                emitter.success(correlation_id, &action.fqn);
            }
            Err(message) => {
                result.failed += 1;
                emitter.failed(correlation_id, &action.fqn, &message);
            }
        }
    }

    let final_entries: Vec<StateEntry> = by_fqn.into_values().collect();
    backend.save(final_entries)?;
    drop(guard);

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use as_domain::resource::{Kind, Resource};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeAdapter {
        fail_names: Vec<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Adapter for FakeAdapter {
        fn name(&self) -> &str {
            "local_process"
        }
        async fn apply(&self, action: &Action) -> Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_names.iter().any(|n| n == &action.fqn) {
                Err("boom".to_string())
            } else {
                Ok(())
            }
        }
    }

    fn create_action(name: &str) -> Action {
        let resource = Resource {
            kind: Kind::Agent,
            pkg: "demo".into(),
            name: name.into(),
            attributes: BTreeMap::new(),
            references: vec![],
        };
        Action {
            action_type: ActionType::Create,
            fqn: resource.fqn(),
            resource: Some(resource),
            previous_hash: None,
        }
    }

    #[tokio::test]
    async fn successful_creates_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StateBackend::new(dir.path().join("state.json"));
        let adapter = FakeAdapter {
            fail_names: vec![],
            calls: AtomicUsize::new(0),
        };
        let actions = vec![create_action("a"), create_action("b")];
        let result = apply(&backend, &adapter, &actions, &NullEmitter, "corr-1")
            .await
            .unwrap();
        assert_eq!(result.created, 2);
        assert_eq!(result.failed, 0);
        assert_eq!(backend.load().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failures_accumulate_but_do_not_stop_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StateBackend::new(dir.path().join("state.json"));
        let failing_fqn = create_action("bad").fqn;
        let adapter = FakeAdapter {
            fail_names: vec![failing_fqn],
            calls: AtomicUsize::new(0),
        };
        let actions = vec![create_action("bad"), create_action("good")];
        let result = apply(&backend, &adapter, &actions, &NullEmitter, "corr-1")
            .await
            .unwrap();
        assert_eq!(result.failed, 1);
        assert_eq!(result.created, 1);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
        assert_eq!(backend.load().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn noop_actions_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StateBackend::new(dir.path().join("state.json"));
        let adapter = FakeAdapter {
            fail_names: vec![],
            calls: AtomicUsize::new(0),
        };
        let mut action = create_action("a");
        action.action_type = ActionType::Noop;
        let result = apply(&backend, &adapter, &[action], &NullEmitter, "corr-1")
            .await
            .unwrap();
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.created, 0);
    }

    #[tokio::test]
    async fn delete_removes_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StateBackend::new(dir.path().join("state.json"));
        let adapter = FakeAdapter {
            fail_names: vec![],
            calls: AtomicUsize::new(0),
        };
        apply(
            &backend,
            &adapter,
            &[create_action("a")],
            &NullEmitter,
            "corr-1",
        )
        .await
        .unwrap();

        let delete_action = Action {
            action_type: ActionType::Delete,
            fqn: create_action("a").fqn,
            resource: None,
            previous_hash: None,
        };
        let result = apply(
            &backend,
            &adapter,
            &[delete_action],
            &NullEmitter,
            "corr-2",
        )
        .await
        .unwrap();
        assert_eq!(result.deleted, 1);
        assert!(backend.load().unwrap().is_empty());
    }
}
