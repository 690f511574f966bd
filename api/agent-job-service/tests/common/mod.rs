#![allow(dead_code)]

use agent_job_service::app::{AppState, build_router};
use agent_job_service::config::environment::AppConfig;
use agent_job_service::module::agent_job::crud::{JobStore, MemoryJobStore};
use agent_job_service::module::agent_job::model::JobRecord;
use agent_job_service::module::agent_job::schema::{
    Amount, JobStatus, PaymentEvidence, PaymentEvidenceRequest,
};
use agent_job_service::service::clock_service::Clock;
use agent_job_service::service::execution_service::{AdapterError, ExecutionAdapter, PollOutcome};
use agent_job_service::service::orchestrator_service::{
    JobOrchestrator, OrchestratorDeps, ServiceSettings,
};
use agent_job_service::service::payment_binding_service::LocalPaymentIssuer;
use agent_job_service::service::schema_registry_service::SchemaRegistry;
use agent_job_service::service::sweep_service::sweep_once;
use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use http::Request;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tower::util::ServiceExt;

pub const START_TS: i64 = 1_700_000_000;

pub fn test_config(payment_required: bool) -> AppConfig {
    AppConfig {
        rust_env: "test".to_string(),
        api_host: "127.0.0.1".to_string(),
        api_port: 0,
        redis_url: None,
        agent_identifier: "agent-test".to_string(),
        seller_vkey: "vkey-test".to_string(),
        price_amounts: vec![Amount {
            amount: 10_000_000,
            unit: "lovelace".to_string(),
        }],
        payment_required,
        submit_result_window_seconds: 3600,
        unlock_delay_seconds: 7200,
        dispute_window_seconds: 3600,
        payment_min_confirmations: 1,
        input_schema: "text:string,option?:string".to_string(),
        input_schema_path: None,
        allow_extra_input_keys: false,
        execution_backend: "local".to_string(),
        execution_base_url: None,
        local_worker_concurrency: 2,
        sweep_enabled: false,
        sweep_interval_seconds: 1,
        cas_max_attempts: 8,
        resubmit_after_seconds: 30,
        internal_auth_enabled: false,
        internal_auth_secret: None,
    }
}

pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Execution backend double: handles are `task-{job_id}` and poll results are scripted per job.
/// Input forwards can be held open with [`ScriptedAdapter::hold_inputs`] to stage interleavings.
#[derive(Default)]
pub struct ScriptedAdapter {
    healthy: AtomicBool,
    inputs_unavailable: AtomicBool,
    input_gate: Mutex<Option<Arc<Semaphore>>>,
    outcomes: Mutex<HashMap<String, PollOutcome>>,
    submissions: Mutex<Vec<String>>,
    inputs: Mutex<Vec<(String, Map<String, Value>)>>,
    cancels: Mutex<Vec<String>>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        let adapter = Self::default();
        adapter.healthy.store(true, Ordering::SeqCst);
        adapter
    }

    pub fn handle_for(job_id: &str) -> String {
        format!("task-{job_id}")
    }

    pub fn script(&self, job_id: &str, outcome: PollOutcome) {
        self.outcomes
            .lock()
            .expect("outcomes lock")
            .insert(Self::handle_for(job_id), outcome);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_inputs_unavailable(&self, unavailable: bool) {
        self.inputs_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Input forwards are recorded, then wait until [`ScriptedAdapter::release_inputs`].
    pub fn hold_inputs(&self) {
        *self.input_gate.lock().expect("gate lock") = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_inputs(&self) {
        if let Some(gate) = self.input_gate.lock().expect("gate lock").take() {
            gate.close();
        }
    }

    pub fn submissions(&self) -> Vec<String> {
        self.submissions.lock().expect("submissions lock").clone()
    }

    pub fn inputs(&self) -> Vec<(String, Map<String, Value>)> {
        self.inputs.lock().expect("inputs lock").clone()
    }

    pub fn cancels(&self) -> Vec<String> {
        self.cancels.lock().expect("cancels lock").clone()
    }
}

#[async_trait]
impl ExecutionAdapter for ScriptedAdapter {
    async fn submit(&self, job_id: &str, _input: &Map<String, Value>) -> Result<String, AdapterError> {
        self.submissions
            .lock()
            .expect("submissions lock")
            .push(job_id.to_string());
        Ok(Self::handle_for(job_id))
    }

    async fn poll_result(&self, handle: &str) -> Result<PollOutcome, AdapterError> {
        Ok(self
            .outcomes
            .lock()
            .expect("outcomes lock")
            .get(handle)
            .cloned()
            .unwrap_or(PollOutcome::Running { partial: None }))
    }

    async fn provide_input(
        &self,
        handle: &str,
        input: &Map<String, Value>,
    ) -> Result<(), AdapterError> {
        if self.inputs_unavailable.load(Ordering::SeqCst) {
            return Err(AdapterError::Unavailable("scripted input outage".to_string()));
        }
        self.inputs
            .lock()
            .expect("inputs lock")
            .push((handle.to_string(), input.clone()));
        let gate = self.input_gate.lock().expect("gate lock").clone();
        if let Some(gate) = gate {
            // closed once released
            let _ = gate.acquire().await;
        }
        self.outcomes
            .lock()
            .expect("outcomes lock")
            .insert(handle.to_string(), PollOutcome::Running { partial: None });
        Ok(())
    }

    async fn cancel(&self, handle: &str) -> Result<(), AdapterError> {
        self.cancels
            .lock()
            .expect("cancels lock")
            .push(handle.to_string());
        Ok(())
    }

    async fn health(&self) -> Result<(), AdapterError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AdapterError::Unavailable("scripted outage".to_string()))
        }
    }
}

pub struct TestHarness {
    pub app: axum::Router,
    pub orchestrator: JobOrchestrator,
    pub store: Arc<MemoryJobStore>,
    pub adapter: Arc<ScriptedAdapter>,
    pub clock: Arc<ManualClock>,
}

impl TestHarness {
    pub async fn record(&self, job_id: &str) -> Option<JobRecord> {
        self.store.get(job_id).await.expect("store read")
    }

    pub async fn all_job_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for status in JobStatus::ALL {
            ids.extend(self.store.list_by_status(status).await.expect("list"));
        }
        ids
    }

    /// Waits for background submission to settle the job into `want`.
    pub async fn wait_for_status(&self, job_id: &str, want: JobStatus) -> JobRecord {
        for _ in 0..200 {
            let record = self
                .orchestrator
                .get_status(job_id)
                .await
                .expect("status read");
            if record.status == want {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {job_id} never reached {want}");
    }

    /// Waits until the backend has seen `count` input forwards.
    pub async fn wait_for_forwards(&self, count: usize) {
        for _ in 0..200 {
            if self.adapter.inputs().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("backend never saw {count} input forwards");
    }
}

pub fn build_harness(config: AppConfig) -> TestHarness {
    let clock = Arc::new(ManualClock::new(START_TS));
    let store = Arc::new(MemoryJobStore::default());
    let adapter = Arc::new(ScriptedAdapter::new());
    let registry = SchemaRegistry::from_inline(&config.input_schema, config.allow_extra_input_keys)
        .expect("test schema");
    let payments = Arc::new(LocalPaymentIssuer::from_app(&config, clock.clone()));

    let orchestrator = JobOrchestrator::new(
        ServiceSettings::from_app(&config),
        OrchestratorDeps {
            registry: Arc::new(registry),
            payments,
            adapter: adapter.clone(),
            store: store.clone(),
            clock: clock.clone(),
        },
    );
    let app = build_router(AppState::new(config, orchestrator.clone(), None));
    TestHarness {
        app,
        orchestrator,
        store,
        adapter,
        clock,
    }
}

pub async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (http::StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).expect("serialize")))
            .expect("build request"),
        None => builder.body(Body::empty()).expect("build request"),
    };
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let payload: Value = serde_json::from_slice(&body).expect("parse body");
    (status, payload)
}

pub async fn post_json(app: &axum::Router, uri: &str, body: Value) -> (http::StatusCode, Value) {
    send(app, "POST", uri, Some(body), &[]).await
}

pub async fn get_json(app: &axum::Router, uri: &str) -> (http::StatusCode, Value) {
    send(app, "GET", uri, None, &[]).await
}

pub async fn start_job(h: &TestHarness, input: Value) -> Value {
    let (status, body) = post_json(&h.app, "/start_job", json!({ "input_data": input })).await;
    assert_eq!(status, http::StatusCode::CREATED, "{body}");
    body
}

pub fn evidence_request(job: &Value, amount: u64) -> PaymentEvidenceRequest {
    PaymentEvidenceRequest {
        job_id: job["job_id"].as_str().expect("job_id").to_string(),
        evidence: PaymentEvidence {
            blockchain_identifier: job["blockchainIdentifier"]
                .as_str()
                .expect("blockchainIdentifier")
                .to_string(),
            tx_hash: "ab12cd34".to_string(),
            amounts: vec![Amount {
                amount,
                unit: "lovelace".to_string(),
            }],
            confirmations: 2,
        },
    }
}

pub async fn post_evidence(h: &TestHarness, req: &PaymentEvidenceRequest) -> (http::StatusCode, Value) {
    post_json(
        &h.app,
        "/payment_evidence",
        serde_json::to_value(req).expect("serialize evidence"),
    )
    .await
}

/// Pays for the job and lets the sweep park it in `awaiting_input`.
pub async fn paid_job_awaiting_input(h: &TestHarness) -> String {
    let job = start_job(h, json!({"text": "hello"})).await;
    let job_id = job["job_id"].as_str().expect("job_id").to_string();
    let (status, body) = post_evidence(h, &evidence_request(&job, 10_000_000)).await;
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body["verdict"], "matched");
    assert_eq!(body["status"], "running");

    h.adapter.script(
        &job_id,
        PollOutcome::NeedsInput {
            prompt: Some("choose an option".to_string()),
        },
    );
    let report = sweep_once(&h.orchestrator).await.expect("sweep");
    assert_eq!(report.awaiting_input, 1);
    job_id
}
