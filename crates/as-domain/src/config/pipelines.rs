use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pipelines
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A named pipeline: a DAG of agent invocations. Steps are validated and
/// layered at startup by `as_runtime::pipeline::build_dag`; a pipeline
/// that fails to layer (duplicate name, unknown dependency, cycle) is a
/// fatal config error surfaced at boot, not at request time.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    pub steps: Vec<PipelineStepConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStepConfig {
    pub name: String,
    pub agent: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Where this step's input comes from: `"trigger"` (the pipeline's
    /// own input), `"step:<name>"` (an upstream step's output), or any
    /// other literal string used verbatim.
    #[serde(default = "d_trigger")]
    pub input: String,
}

fn d_trigger() -> String {
    "trigger".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_input_defaults_to_trigger() {
        let cfg: PipelineStepConfig = toml::from_str(
            r#"
            name = "a"
            agent = "helper"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.input, "trigger");
    }
}
