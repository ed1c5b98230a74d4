//! HTTP surface (spec §6). Grounded on the gateway's `api/mod.rs`
//! public/protected router split, generalized from its dozens of
//! domain-specific route groups down to the fixed agent/pipeline/session
//! surface this runtime exposes.

use std::collections::HashMap;
use std::sync::Arc;

use as_domain::{Error, Invocation};
use as_runtime::pipeline::execute as execute_pipeline;
use as_runtime::strategy::{EventSink, StrategyEvent};
use axum::extract::{Path, State};
use axum::middleware;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::auth::require_api_key;
use crate::error::ApiError;
use crate::invoker::invoke_agent;
use crate::rate_limit::rate_limit_mw;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/agents", get(list_agents))
        .route("/v1/agents/:name/invoke", post(invoke))
        .route("/v1/agents/:name/stream", post(stream))
        .route("/v1/agents/:name/sessions", post(create_session))
        .route("/v1/agents/:name/sessions/:sid", post(continue_session))
        .route("/v1/agents/:name/sessions/:sid", delete(delete_session))
        .route("/v1/pipelines/:name/run", post(run_pipeline))
        .route("/v1/metrics", get(metrics))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit_mw))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(protected)
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

#[derive(Serialize)]
struct AgentSummary {
    name: String,
    fqn: String,
    model: Option<String>,
    strategy: as_domain::config::StrategyKind,
}

async fn list_agents(State(state): State<AppState>) -> impl IntoResponse {
    let agents: Vec<AgentSummary> = state
        .agents
        .iter()
        .map(|(name, runtime)| AgentSummary {
            name: name.clone(),
            fqn: format!("agentspec/Agent/{name}"),
            model: runtime.config.models.get("executor").cloned(),
            strategy: runtime.config.strategy,
        })
        .collect();
    Json(json!({ "agents": agents }))
}

#[derive(Deserialize)]
struct InvokeRequest {
    message: String,
    session_id: Option<String>,
    #[serde(default)]
    overrides: HashMap<String, String>,
}

#[derive(Serialize)]
struct InvokeResponseBody {
    output: String,
    session_id: Option<String>,
    tokens: TokensBody,
    tool_calls: Vec<as_domain::ToolCallRecord>,
    turns: u32,
    error: Option<String>,
}

#[derive(Serialize)]
struct TokensBody {
    input: u64,
    output: u64,
    total: u64,
}

async fn invoke(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<InvokeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.agents.contains_key(&name) {
        return Err(Error::NotFound(format!("agent \"{name}\" not declared")).into());
    }
    let invocation = Invocation {
        agent_name: name.clone(),
        input: req.message,
        session_id: req.session_id.clone(),
        stream: false,
        overrides: req.overrides,
    };
    let timeout = std::time::Duration::from_secs(state.config.server.invocation_timeout_secs);
    let response = tokio::time::timeout(timeout, invoke_agent(&state, &name, invocation, None, CancellationToken::new()))
        .await
        .map_err(|_| Error::Timeout(format!("agent \"{name}\" invocation")))??;

    Ok(Json(InvokeResponseBody {
        output: response.output,
        session_id: req.session_id,
        tokens: TokensBody {
            input: response.tokens.input,
            output: response.tokens.output,
            total: response.tokens.input + response.tokens.output,
        },
        tool_calls: response.tool_calls,
        turns: response.turns,
        error: response.error,
    }))
}

async fn stream(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<InvokeRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>, ApiError> {
    if !state.agents.contains_key(&name) {
        return Err(Error::NotFound(format!("agent \"{name}\" not declared")).into());
    }

    let (tx, mut rx) = mpsc::channel::<Event>(64);
    let sink: EventSink = Arc::new(move |event: StrategyEvent| {
        let (event_name, data) = match &event {
            StrategyEvent::TextDelta(text) => ("text_delta", json!({ "text": text })),
            StrategyEvent::ToolCallStarted { call_id, tool_name } => {
                ("tool_call_started", json!({ "call_id": call_id, "tool_name": tool_name }))
            }
            StrategyEvent::ToolCallFinished { call_id, is_error } => {
                ("tool_call_finished", json!({ "call_id": call_id, "is_error": is_error }))
            }
            StrategyEvent::TurnCompleted { turn } => ("turn_completed", json!({ "turn": turn })),
            StrategyEvent::BudgetExhausted { used, limit } => {
                ("budget_exhausted", json!({ "used": used, "limit": limit }))
            }
            StrategyEvent::Done => ("done", json!({})),
        };
        let _ = tx.try_send(Event::default().event(event_name).data(data.to_string()));
    });

    let invocation = Invocation {
        agent_name: name.clone(),
        input: req.message,
        session_id: req.session_id,
        stream: true,
        overrides: req.overrides,
    };
    let cancel = CancellationToken::new();
    tokio::spawn(async move {
        let _ = invoke_agent(&state, &name, invocation, Some(sink), cancel).await;
    });

    let events = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield Ok(event);
        }
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[derive(Deserialize, Default)]
struct CreateSessionRequest {
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Serialize)]
struct SessionCreatedBody {
    session_id: String,
}

async fn create_session(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.agents.contains_key(&name) {
        return Err(Error::NotFound(format!("agent \"{name}\" not declared")).into());
    }
    let metadata = body.map(|Json(b)| b.metadata).unwrap_or_default();
    let session = state.sessions.create(&name, metadata).await?;
    Ok((axum::http::StatusCode::CREATED, Json(SessionCreatedBody { session_id: session.id })))
}

#[derive(Deserialize)]
struct ContinueSessionRequest {
    message: String,
}

async fn continue_session(
    State(state): State<AppState>,
    Path((name, sid)): Path<(String, String)>,
    Json(req): Json<ContinueSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.agents.contains_key(&name) {
        return Err(Error::NotFound(format!("agent \"{name}\" not declared")).into());
    }
    if state.sessions.get(&sid).await?.is_none() {
        return Err(Error::NotFound(format!("session \"{sid}\" not found")).into());
    }
    let invocation = Invocation {
        agent_name: name.clone(),
        input: req.message,
        session_id: Some(sid.clone()),
        stream: false,
        overrides: HashMap::new(),
    };
    let response = invoke_agent(&state, &name, invocation, None, CancellationToken::new()).await?;
    Ok(Json(InvokeResponseBody {
        output: response.output,
        session_id: Some(sid),
        tokens: TokensBody {
            input: response.tokens.input,
            output: response.tokens.output,
            total: response.tokens.input + response.tokens.output,
        },
        tool_calls: response.tool_calls,
        turns: response.turns,
        error: response.error,
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    Path((name, sid)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.agents.contains_key(&name) {
        return Err(Error::NotFound(format!("agent \"{name}\" not declared")).into());
    }
    state.sessions.delete(&sid).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct RunPipelineRequest {
    input: String,
}

async fn run_pipeline(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<RunPipelineRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let dag = state
        .pipelines
        .get(&name)
        .ok_or_else(|| Error::NotFound(format!("pipeline \"{name}\" not declared")))?;
    let invoker: Arc<dyn as_runtime::invoker::AgentInvoker> =
        Arc::new(crate::invoker::ServerInvoker { state: state.clone() });
    let result = execute_pipeline(invoker, dag, &req.input, CancellationToken::new()).await;
    Ok(Json(result))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.config.server.metrics {
        return (axum::http::StatusCode::NOT_FOUND, String::new());
    }
    (axum::http::StatusCode::OK, state.metrics.render())
}
