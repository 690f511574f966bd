use agent_job_service::app::{AppState, build_router};
use agent_job_service::config::environment::AppConfig;
use agent_job_service::infra::init_infra;
use agent_job_service::service::sweep_service;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    init_logging();

    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "config error");
            std::process::exit(1);
        }
    };

    let bind_addr = format!("{}:{}", config.api_host, config.api_port);
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, bind_addr = %bind_addr, "server bind error");
            std::process::exit(1);
        }
    };

    let infra = match init_infra(&config).await {
        Ok(i) => i,
        Err(e) => {
            error!(error = %e, "infra init failed");
            std::process::exit(1);
        }
    };
    let state = match AppState::from_config(config, infra) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "service wiring failed");
            std::process::exit(1);
        }
    };

    info!(
        env = %state.config.rust_env,
        host = %state.config.api_host,
        port = state.config.api_port,
        agent_identifier = %state.config.agent_identifier,
        payment_required = state.config.payment_required,
        execution_backend = %state.config.execution_backend,
        job_store = if state.infra.is_some() { "redis" } else { "memory" },
        "agent-job-service started"
    );

    if state.config.sweep_enabled {
        let orchestrator = state.orchestrator.clone();
        let interval = Duration::from_secs(state.config.sweep_interval_seconds.max(1) as u64);
        tokio::spawn(async move {
            if let Err(e) = sweep_service::run_sweeper(orchestrator, interval).await {
                error!(error = %e, "job sweep exited");
            }
        });
    }
    let app = build_router(state);
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server runtime error");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
