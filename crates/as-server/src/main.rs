use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use as_domain::config::{Config, ConfigSeverity};
use as_server::cli::{self, Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _config_path) = cli::load_config()?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = cli::load_config()?;
            if !cli::validate_config(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = cli::load_config()?;
            cli::show_config(&config)
        }
        Some(Command::Config(ConfigCommand::Login { provider_id })) => {
            let (config, _config_path) = cli::load_config()?;
            run_login(&config, &provider_id).await
        }
        Some(Command::Plan { resources }) => run_plan(resources).await,
        Some(Command::Apply { resources }) => run_apply(resources).await,
        Some(Command::Drift { resources, json }) => run_drift(resources, json).await,
        Some(Command::Export) => run_export().await,
        Some(Command::Version) => {
            println!("agentspec {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,as_server=debug")))
        .json()
        .init();
}

/// Start the HTTP server with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("agentspec starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!("configuration has {} error(s), refusing to start", issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count());
    }

    let cors = build_cors_layer(&config.server.cors);
    let max_concurrent: usize = std::env::var("AGENTSPEC_MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(256);

    let state = as_server::bootstrap::bootstrap(config.clone())
        .await
        .context("bootstrapping server state")?;

    let process_adapter = state.process_adapter.clone();

    let app = as_server::routes::router(state)
        .layer(cors)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .into_make_service_with_connect_info::<std::net::SocketAddr>();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "agentspec listening");

    let shutdown = async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, stopping deployed processes");
        process_adapter.shutdown().await;
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("axum server error")?;

    Ok(())
}

fn build_cors_layer(cors: &as_domain::config::CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            let prefix = origin.trim_end_matches('*').to_owned();
            wildcard_prefixes.push(prefix);
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

async fn run_login(config: &as_domain::config::Config, provider_id: &str) -> anyhow::Result<()> {
    cli::find_oauth_provider(config, provider_id)?;

    let client = reqwest::Client::new();
    let device_resp = as_providers::oauth::request_device_code(&client).await?;

    eprintln!("To authenticate, visit:\n  {}\n", device_resp.verification_uri);
    eprintln!("Enter code: {}", device_resp.user_code);
    if let Some(complete) = &device_resp.verification_uri_complete {
        eprintln!("\nOr open directly:\n  {complete}");
    }
    eprintln!("\nWaiting for authorization...");

    let token_resp = as_providers::oauth::poll_for_token(
        &client,
        &device_resp.device_code,
        device_resp.interval,
        device_resp.expires_in,
    )
    .await?;

    let expires_in = token_resp
        .expires_in
        .unwrap_or(as_providers::oauth::DEFAULT_EXPIRES_IN_SECS)
        .min(86_400 * 365);
    let expires_at = chrono::Utc::now().timestamp() + expires_in as i64;

    let tokens = as_providers::oauth::OAuthTokens {
        access_token: token_resp.access_token,
        refresh_token: token_resp.refresh_token.unwrap_or_default(),
        expires_at,
        email: None,
    };

    as_providers::oauth::OAuthTokenStore::save(provider_id, &tokens)?;
    eprintln!("\nAuthenticated. Tokens saved for provider '{provider_id}'.");
    Ok(())
}

async fn run_plan(resources_path: std::path::PathBuf) -> anyhow::Result<()> {
    let (config, _) = cli::load_config()?;
    let resources = cli::load_resources(&resources_path)?;
    let backend = as_state::StateBackend::new(cli::state_path(&config));
    let current = cli::load_state_entries(&backend)?;
    let plan = as_state::compute_plan(&resources, &current);

    for action in &plan.actions {
        println!("{:?}\t{}", action.action_type, action.fqn);
    }
    if plan.has_changes {
        println!("plan has changes");
    } else {
        println!("no changes, infrastructure matches declared resources");
    }
    Ok(())
}

async fn run_apply(resources_path: std::path::PathBuf) -> anyhow::Result<()> {
    let (config, _) = cli::load_config()?;
    let resources = cli::load_resources(&resources_path)?;
    let backend = as_state::StateBackend::new(cli::state_path(&config));
    let current = cli::load_state_entries(&backend)?;
    let plan = as_state::compute_plan(&resources, &current);

    let adapter = as_server::process_adapter::LocalProcessAdapter::new(config.deploy_targets.clone());
    let emitter = as_state::NullEmitter;
    let correlation_id = as_domain::id::new_correlation_id();
    let result = as_state::apply(&backend, &adapter, &plan.actions, &emitter, &correlation_id).await?;

    println!(
        "apply complete: created={} updated={} deleted={} failed={}",
        result.created, result.updated, result.deleted, result.failed
    );
    if result.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_drift(resources_path: std::path::PathBuf, json: bool) -> anyhow::Result<()> {
    let (config, _) = cli::load_config()?;
    let resources = cli::load_resources(&resources_path)?;
    let backend = as_state::StateBackend::new(cli::state_path(&config));
    let current = cli::load_state_entries(&backend)?;
    let drift = as_state::detect_drift(&resources, &current);

    if json {
        println!("{}", serde_json::to_string_pretty(&as_state::format_json(&drift))?);
    } else {
        print!("{}", as_state::format_text(&drift));
    }

    if drift.drifted.is_empty() {
        Ok(())
    } else {
        std::process::exit(2);
    }
}

async fn run_export() -> anyhow::Result<()> {
    let (config, _) = cli::load_config()?;
    let backend = as_state::StateBackend::new(cli::state_path(&config));
    let entries = cli::load_state_entries(&backend)?;
    println!("{}", cli::state_file_json(&entries)?);
    Ok(())
}
