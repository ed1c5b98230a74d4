//! `AgentInvoker`: the seam through
//! which a [`crate::pipeline`] step or a delegating/fan-out strategy
//! (Router, Map-Reduce) asks the orchestrator to run another declared
//! agent by name, without either side holding a pointer graph — agents
//! only ever reference each other by FQN/name and are resolved through
//! this trait at invocation time.

use as_domain::{Invocation, InvocationResponse, Result};

#[async_trait::async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, agent_name: &str, invocation: Invocation) -> Result<InvocationResponse>;
}
