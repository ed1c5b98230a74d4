//! Pipeline DAG executor: validates a set of named steps
//! into layers of parallel work, then executes layer-by-layer with
//! fail-fast cancellation on the first error.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use as_domain::{Error, Invocation, InvocationResponse, Result};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::invoker::AgentInvoker;

/// Where a step's input comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepInput {
    /// The pipeline's trigger input, verbatim.
    TriggerInput,
    /// The `output` field of a named upstream step's result.
    StepOutput(String),
    /// A literal string (e.g. a template already rendered by the caller).
    Literal(String),
}

/// One declared pipeline step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub agent: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub input: StepInput,
}

/// A validated, layered pipeline: `layers[k]` contains step names whose
/// dependencies are all satisfied by steps in `layers[0..k]`.
#[derive(Debug, Clone)]
pub struct Dag {
    pub layers: Vec<Vec<String>>,
    steps_by_name: HashMap<String, Step>,
}

/// Build a [`Dag`] from a step list.
///
/// Validates unique step names and that every `depends_on` entry names an
/// existing step, detects cycles, and produces a deterministic topological
/// layering (each layer sorted by name for reproducible fan-out order).
pub fn build_dag(steps: Vec<Step>) -> Result<Dag> {
    let mut steps_by_name: HashMap<String, Step> = HashMap::new();
    for step in steps {
        if steps_by_name.insert(step.name.clone(), step).is_some() {
            return Err(Error::InvalidInput(format!(
                "duplicate pipeline step name: {}",
                steps_by_name.keys().next().cloned().unwrap_or_default()
            )));
        }
    }
    for step in steps_by_name.values() {
        for dep in &step.depends_on {
            if !steps_by_name.contains_key(dep) {
                return Err(Error::InvalidInput(format!(
                    "step \"{}\" depends on unknown step \"{dep}\"",
                    step.name
                )));
            }
        }
    }

    // Kahn's algorithm, keeping each layer's ready set together so the
    // layering reflects real parallelism rather than an arbitrary total order.
    let mut remaining_deps: HashMap<String, HashSet<String>> = steps_by_name
        .iter()
        .map(|(name, step)| (name.clone(), step.depends_on.iter().cloned().collect()))
        .collect();
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
    for step in steps_by_name.values() {
        for dep in &step.depends_on {
            dependents.entry(dep.clone()).or_default().push(step.name.clone());
        }
    }

    let mut layers = Vec::new();
    let mut scheduled: HashSet<String> = HashSet::new();
    loop {
        let mut ready: Vec<String> = remaining_deps
            .iter()
            .filter(|(name, deps)| !scheduled.contains(*name) && deps.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        if ready.is_empty() {
            break;
        }
        ready.sort();
        for name in &ready {
            scheduled.insert(name.clone());
            remaining_deps.remove(name);
            if let Some(downstream) = dependents.get(name) {
                for d in downstream {
                    if let Some(set) = remaining_deps.get_mut(d) {
                        set.remove(name);
                    }
                }
            }
        }
        layers.push(ready);
    }

    if scheduled.len() != steps_by_name.len() {
        let unresolved: Vec<_> = steps_by_name
            .keys()
            .filter(|n| !scheduled.contains(*n))
            .cloned()
            .collect();
        return Err(Error::InvalidInput(format!(
            "cyclic pipeline dependency among steps: {}",
            unresolved.join(", ")
        )));
    }

    Ok(Dag { layers, steps_by_name })
}

/// Outcome of one executed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub name: String,
    pub agent: String,
    pub response: Option<InvocationResponse>,
    pub error: Option<String>,
}

/// Overall pipeline run outcome.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub status: PipelineStatus,
    pub steps: HashMap<String, StepResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Succeeded,
    Failed,
}

fn resolve_input(input: &StepInput, trigger_input: &str, steps: &HashMap<String, StepResult>) -> String {
    match input {
        StepInput::TriggerInput => trigger_input.to_string(),
        StepInput::Literal(s) => s.clone(),
        StepInput::StepOutput(name) => steps
            .get(name)
            .and_then(|r| r.response.as_ref())
            .map(|r| r.output.clone())
            .unwrap_or_default(),
    }
}

/// Execute a [`Dag`] layer by layer: every step in a layer runs
/// concurrently; layers run strictly sequentially. The first
/// failure in a layer cancels the shared token so sibling steps observe
/// cancellation promptly, and the executor still waits for in-flight
/// steps before returning.
pub async fn execute(
    invoker: Arc<dyn AgentInvoker>,
    dag: &Dag,
    trigger_input: &str,
    cancel: CancellationToken,
) -> PipelineResult {
    let mut results: HashMap<String, StepResult> = HashMap::new();
    let mut failed = false;

    for layer in &dag.layers {
        if failed {
            // Fail-fast: mark the remaining layers' steps as not run.
            for name in layer {
                results.insert(
                    name.clone(),
                    StepResult {
                        name: name.clone(),
                        agent: dag.steps_by_name[name].agent.clone(),
                        response: None,
                        error: Some("cancelled: an earlier step failed".into()),
                    },
                );
            }
            continue;
        }

        let mut handles = Vec::with_capacity(layer.len());
        for name in layer {
            let step = dag.steps_by_name[name].clone();
            let invoker = invoker.clone();
            let cancel = cancel.clone();
            let input = resolve_input(&step.input, trigger_input, &results);
            handles.push((
                step.name.clone(),
                step.agent.clone(),
                tokio::spawn(async move {
                    let invocation = Invocation {
                        agent_name: step.agent.clone(),
                        input,
                        ..Default::default()
                    };
                    tokio::select! {
                        r = invoker.invoke(&step.agent, invocation) => r,
                        _ = cancel.cancelled() => Err(Error::Internal("pipeline cancelled".into())),
                    }
                }),
            ));
        }

        for (name, agent, handle) in handles {
            let outcome = match handle.await {
                Ok(Ok(resp)) => StepResult { name: name.clone(), agent, response: Some(resp), error: None },
                Ok(Err(e)) => {
                    cancel.cancel();
                    failed = true;
                    StepResult { name: name.clone(), agent, response: None, error: Some(e.to_string()) }
                }
                Err(join_err) => {
                    cancel.cancel();
                    failed = true;
                    StepResult { name: name.clone(), agent, response: None, error: Some(join_err.to_string()) }
                }
            };
            results.insert(name, outcome);
        }
    }

    PipelineResult {
        status: if failed { PipelineStatus::Failed } else { PipelineStatus::Succeeded },
        steps: results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        calls: AtomicUsize,
        fail_on: Option<String>,
    }

    #[async_trait::async_trait]
    impl AgentInvoker for Scripted {
        async fn invoke(&self, agent_name: &str, invocation: Invocation) -> Result<InvocationResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.as_deref() == Some(agent_name) {
                return Err(Error::Internal("boom".into()));
            }
            Ok(InvocationResponse {
                output: format!("{agent_name}:{}", invocation.input),
                turns: 1,
                tokens: Default::default(),
                tool_calls: vec![],
                error: None,
            })
        }
    }

    fn step(name: &str, agent: &str, deps: &[&str], input: StepInput) -> Step {
        Step {
            name: name.into(),
            agent: agent.into(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            input,
        }
    }

    #[test]
    fn unique_names_required() {
        let steps = vec![
            step("a", "agent-a", &[], StepInput::TriggerInput),
            step("a", "agent-b", &[], StepInput::TriggerInput),
        ];
        assert!(build_dag(steps).is_err());
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let steps = vec![step("a", "agent-a", &["missing"], StepInput::TriggerInput)];
        assert!(build_dag(steps).is_err());
    }

    #[test]
    fn cycle_is_rejected() {
        let steps = vec![
            step("a", "agent-a", &["b"], StepInput::TriggerInput),
            step("b", "agent-b", &["a"], StepInput::TriggerInput),
        ];
        assert!(build_dag(steps).is_err());
    }

    #[test]
    fn layers_respect_dependency_order() {
        let steps = vec![
            step("a", "agent-a", &[], StepInput::TriggerInput),
            step("b", "agent-b", &[], StepInput::TriggerInput),
            step("c", "agent-c", &["a", "b"], StepInput::TriggerInput),
        ];
        let dag = build_dag(steps).unwrap();
        assert_eq!(dag.layers.len(), 2);
        assert_eq!(dag.layers[0], vec!["a".to_string(), "b".to_string()]);
        assert_eq!(dag.layers[1], vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn executes_layers_and_chains_step_output() {
        let steps = vec![
            step("a", "agent-a", &[], StepInput::TriggerInput),
            step("b", "agent-b", &["a"], StepInput::StepOutput("a".into())),
        ];
        let dag = build_dag(steps).unwrap();
        let invoker = Arc::new(Scripted { calls: AtomicUsize::new(0), fail_on: None });
        let result = execute(invoker, &dag, "hello", CancellationToken::new()).await;
        assert_eq!(result.status, PipelineStatus::Succeeded);
        assert_eq!(result.steps["a"].response.as_ref().unwrap().output, "agent-a:hello");
        assert_eq!(result.steps["b"].response.as_ref().unwrap().output, "agent-b:agent-a:hello");
    }

    #[tokio::test]
    async fn fail_fast_cancels_later_layers() {
        let steps = vec![
            step("a", "agent-a", &[], StepInput::TriggerInput),
            step("b", "agent-fail", &["a"], StepInput::TriggerInput),
            step("c", "agent-c", &["b"], StepInput::TriggerInput),
        ];
        let dag = build_dag(steps).unwrap();
        let invoker = Arc::new(Scripted { calls: AtomicUsize::new(0), fail_on: Some("agent-fail".into()) });
        let result = execute(invoker, &dag, "hi", CancellationToken::new()).await;
        assert_eq!(result.status, PipelineStatus::Failed);
        assert!(result.steps["b"].error.is_some());
        assert!(result.steps["c"].error.as_deref().unwrap().contains("cancelled"));
    }
}
