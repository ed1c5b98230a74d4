//! Maps a declared agent's `StrategyKind` to the concrete [`Strategy`]
//! implementation it runs, wiring in the handful of config fields each
//! non-ReAct strategy needs (router/map-reduce targets).

use std::sync::Arc;

use as_domain::config::{AgentConfig, StrategyKind};
use as_runtime::map_reduce::SplitRule;
use as_runtime::strategy::Strategy;
use as_runtime::{MapReduceStrategy, PlanExecuteStrategy, ReActStrategy, ReflexionStrategy, RouterStrategy};

pub fn resolve(config: &AgentConfig) -> Arc<dyn Strategy> {
    match config.strategy {
        StrategyKind::ReAct => Arc::new(ReActStrategy),
        StrategyKind::PlanExecute => Arc::new(PlanExecuteStrategy),
        StrategyKind::Reflexion => Arc::new(ReflexionStrategy::default()),
        StrategyKind::Router => {
            // Router reuses the agent's declared delegation rules as its
            // candidate pool: `target_agent`/`condition` is exactly the
            // `(name, description)` shape the classifier prompt needs.
            let targets = config
                .delegation
                .iter()
                .map(|d| (d.target_agent.clone(), d.condition.clone()))
                .collect();
            Arc::new(RouterStrategy { targets })
        }
        StrategyKind::MapReduce => Arc::new(MapReduceStrategy {
            map_agent: config.map_reduce_targets.first().cloned().unwrap_or_default(),
            split: SplitRule::Lines,
            ..MapReduceStrategy::default()
        }),
    }
}
