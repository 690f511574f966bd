use crate::config::environment::AppConfig;
use crate::infra::InfraClients;
use crate::module::agent_job::crud::{JobStore, MemoryJobStore, RedisJobStore};
use crate::module::agent_job::route::register_routes;
use crate::service::clock_service::{Clock, SystemClock};
use crate::service::execution_service::{ExecutionAdapter, LocalWorkerAdapter, echo_handler};
use crate::service::orchestrator_service::{JobOrchestrator, OrchestratorDeps, ServiceSettings};
use crate::service::payment_binding_service::LocalPaymentIssuer;
use crate::service::remote_execution_service::RemoteTaskAdapter;
use crate::service::schema_registry_service::SchemaRegistry;
use axum::Router;
use axum::http::Method;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

const REMOTE_TASK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: JobOrchestrator,
    pub infra: Option<InfraClients>,
}

impl AppState {
    pub fn new(config: AppConfig, orchestrator: JobOrchestrator, infra: Option<InfraClients>) -> Self {
        Self {
            config,
            orchestrator,
            infra,
        }
    }

    /// Wires the production collaborators: Redis store when infra is present (memory otherwise),
    /// the configured execution backend and the local payment issuer.
    pub fn from_config(config: AppConfig, infra: Option<InfraClients>) -> Result<Self, String> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let registry = match &config.input_schema_path {
            Some(path) => SchemaRegistry::from_json_file(path, config.allow_extra_input_keys)?,
            None => SchemaRegistry::from_inline(&config.input_schema, config.allow_extra_input_keys)?,
        };
        let store: Arc<dyn JobStore> = match &infra {
            Some(clients) => Arc::new(RedisJobStore::new(clients.redis.clone())),
            None => Arc::new(MemoryJobStore::default()),
        };
        let adapter: Arc<dyn ExecutionAdapter> = match config.execution_backend.as_str() {
            "local" => Arc::new(LocalWorkerAdapter::new(
                echo_handler(),
                config.local_worker_concurrency.max(1) as usize,
            )),
            "remote" => {
                let base_url = config
                    .execution_base_url
                    .as_deref()
                    .ok_or_else(|| "EXECUTION_BASE_URL is required for the remote backend".to_string())?;
                Arc::new(RemoteTaskAdapter::new(base_url, REMOTE_TASK_TIMEOUT)?)
            }
            other => return Err(format!("unsupported EXECUTION_BACKEND: {other}")),
        };
        let payments = Arc::new(LocalPaymentIssuer::from_app(&config, clock.clone()));

        let orchestrator = JobOrchestrator::new(
            ServiceSettings::from_app(&config),
            OrchestratorDeps {
                registry: Arc::new(registry),
                payments,
                adapter,
                store,
                clock,
            },
        );
        Ok(Self::new(config, orchestrator, infra))
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    register_routes(state).layer(cors)
}
