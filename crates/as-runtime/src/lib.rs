//! The agentic-loop execution engine: strategies
//! that turn an [`as_domain::Invocation`] into an
//! [`as_domain::InvocationResponse`], a pipeline DAG executor that chains
//! agent invocations together, and the control-flow expression language
//! used to script per-step routing.

pub mod control_flow;
pub mod delegation;
pub mod estimator;
pub mod invoker;
pub mod map_reduce;
pub mod pipeline;
pub mod plan_execute;
pub mod react;
pub mod reflexion;
pub mod router;
pub mod strategy;

pub use control_flow::{eval, run as run_control_flow, Action, ActionType, BinOp, Env, Expr, Stmt, Value};
pub use delegation::{maybe_delegate, DelegationRule};
pub use estimator::{HeuristicEstimator, TokenEstimator};
pub use invoker::AgentInvoker;
pub use map_reduce::{MapReduceStrategy, SplitRule};
pub use pipeline::{build_dag, execute as execute_pipeline, Dag, PipelineResult, PipelineStatus, Step, StepInput, StepResult};
pub use plan_execute::PlanExecuteStrategy;
pub use react::ReActStrategy;
pub use reflexion::ReflexionStrategy;
pub use router::RouterStrategy;
pub use strategy::{budget_exhausted, EventSink, Strategy, StrategyContext, StrategyEvent, StrategyInput};
