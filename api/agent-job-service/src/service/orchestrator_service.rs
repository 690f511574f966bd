use crate::config::environment::AppConfig;
use crate::module::agent_job::crud::{JobStore, StoreError};
use crate::module::agent_job::error::JobError;
use crate::module::agent_job::model::{JobRecord, PaymentConfirmation};
use crate::module::agent_job::schema::{
    Amount, InputField, InputSchemaField, JobStatus, JobStatusTransition, PaymentEvidence,
    pairs_to_document,
};
use crate::service::clock_service::Clock;
use crate::service::deadline_service::{expiry_detail, payment_deadline_elapsed};
use crate::service::execution_service::{ExecutionAdapter, PollOutcome};
use crate::service::hash_service;
use crate::service::metrics_service;
use crate::service::payment_binding_service::{PaymentBindingIssuer, PaymentVerdict, amounts_cover};
use crate::service::schema_registry_service::SchemaRegistry;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const CREATE_MAX_ATTEMPTS: usize = 4;
const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(3);

/// Operator settings fixed at startup.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub agent_identifier: String,
    pub seller_vkey: String,
    pub price_amounts: Vec<Amount>,
    pub payment_required: bool,
    pub cas_max_attempts: usize,
    pub resubmit_after_seconds: i64,
}

impl ServiceSettings {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            agent_identifier: config.agent_identifier.clone(),
            seller_vkey: config.seller_vkey.clone(),
            price_amounts: config.price_amounts.clone(),
            payment_required: config.payment_required,
            cas_max_attempts: config.cas_max_attempts.max(1) as usize,
            resubmit_after_seconds: config.resubmit_after_seconds.max(0),
        }
    }
}

pub struct OrchestratorDeps {
    pub registry: Arc<SchemaRegistry>,
    pub payments: Arc<dyn PaymentBindingIssuer>,
    pub adapter: Arc<dyn ExecutionAdapter>,
    pub store: Arc<dyn JobStore>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub identifier_from_purchaser: Option<String>,
    pub input: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub available: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Confirmed,
    AlreadyConfirmed,
    Mismatched(String),
    Expired,
}

impl ReconcileOutcome {
    pub fn verdict(&self) -> &'static str {
        match self {
            Self::Confirmed | Self::AlreadyConfirmed => "matched",
            Self::Mismatched(_) => "mismatched",
            Self::Expired => "expired",
        }
    }
}

enum Mutation {
    Changed(JobRecord),
    Unchanged(JobRecord),
}

impl Mutation {
    fn into_record(self) -> JobRecord {
        match self {
            Self::Changed(r) | Self::Unchanged(r) => r,
        }
    }
}

/// Drives every job through its lifecycle. All writes go through [`JobStore::compare_and_swap`];
/// losers of a race re-read and re-decide against the fresh record.
///
/// Payment-first ordering: when payment is required a job starts in `awaiting_payment` and is
/// submitted to the execution backend only after its payment is confirmed. Payment-free jobs start
/// `pending` and are submitted right after creation.
#[derive(Clone)]
pub struct JobOrchestrator {
    settings: Arc<ServiceSettings>,
    registry: Arc<SchemaRegistry>,
    payments: Arc<dyn PaymentBindingIssuer>,
    adapter: Arc<dyn ExecutionAdapter>,
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
}

impl JobOrchestrator {
    pub fn new(settings: ServiceSettings, deps: OrchestratorDeps) -> Self {
        Self {
            settings: Arc::new(settings),
            registry: deps.registry,
            payments: deps.payments,
            adapter: deps.adapter,
            store: deps.store,
            clock: deps.clock,
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn get_schema(&self) -> Vec<InputSchemaField> {
        self.registry.get_schema()
    }

    pub async fn create_job(&self, job: NewJob) -> Result<JobRecord, JobError> {
        self.registry
            .validate(&job.input)
            .map_err(JobError::InvalidInput)?;
        let input_hash = hash_service::input_hash(&job.input).map_err(JobError::Internal)?;
        let initial = if self.settings.payment_required {
            JobStatus::AwaitingPayment
        } else {
            JobStatus::Pending
        };

        let mut created = None;
        for attempt in 1..=CREATE_MAX_ATTEMPTS {
            let job_id = Uuid::new_v4().to_string();
            let binding = self
                .payments
                .bind(&job_id, &self.settings.price_amounts)
                .await?;
            let now = self.clock.now_unix();
            let record = JobRecord {
                job_id,
                blockchain_identifier: binding.blockchain_identifier,
                identifier_from_purchaser: job.identifier_from_purchaser.clone(),
                status: initial,
                input_data: job.input.clone(),
                pending_input: Map::new(),
                input_hash: input_hash.clone(),
                result: None,
                error_detail: None,
                submit_result_time: binding.submit_result_time,
                unlock_time: binding.unlock_time,
                external_dispute_unlock_time: binding.external_dispute_unlock_time,
                amounts: self.settings.price_amounts.clone(),
                agent_identifier: self.settings.agent_identifier.clone(),
                seller_vkey: self.settings.seller_vkey.clone(),
                execution_handle: None,
                payment: None,
                created_at: now,
                updated_at: now,
                revision: 1,
                transitions: vec![JobStatusTransition {
                    from_status: None,
                    to_status: initial,
                    transitioned_at: now,
                    detail: None,
                }],
            };
            match self.store.create(&record).await {
                Ok(()) => {
                    created = Some(record);
                    break;
                }
                Err(StoreError::Conflict(reason)) => {
                    warn!(attempt, reason = %reason, "job identity collision; reallocating");
                }
                Err(e) => return Err(e.into()),
            }
        }
        let record = created.ok_or_else(|| {
            JobError::Internal("could not allocate a unique job identity".to_string())
        })?;

        metrics_service::inc_jobs_created();
        info!(
            job_id = %record.job_id,
            blockchain_identifier = %record.blockchain_identifier,
            status = %record.status,
            submit_result_time = record.submit_result_time,
            "job created"
        );

        if !self.settings.payment_required {
            let this = self.clone();
            let job_id = record.job_id.clone();
            tokio::spawn(async move {
                if let Err(e) = this.execute(&job_id).await {
                    warn!(job_id = %job_id, error = %e, "job submission failed");
                }
            });
        }
        Ok(record)
    }

    /// Snapshot of the job. Applies the payment deadline first so an expired job never reads as live.
    pub async fn get_status(&self, job_id: &str) -> Result<JobRecord, JobError> {
        let record = self.load(job_id).await?;
        if payment_deadline_elapsed(
            self.clock.now_unix(),
            &record,
            self.settings.payment_required,
        ) {
            return self.expire_if_due(job_id).await;
        }
        Ok(record)
    }

    pub async fn list_jobs(&self, status: JobStatus) -> Result<Vec<String>, JobError> {
        Ok(self.store.list_by_status(status).await?)
    }

    /// Merges `extra` into a job parked in `awaiting_input` and hands it to the backend.
    ///
    /// The job stays `awaiting_input` until the backend accepts the input. Calls that land
    /// before then queue their fields through the CAS in arrival order (later keys win) and
    /// are delivered together.
    pub async fn provide_input(
        &self,
        job_id: &str,
        extra: Vec<InputField>,
    ) -> Result<JobRecord, JobError> {
        if extra.is_empty() {
            return Err(JobError::InvalidInput(
                "input_data must contain at least one field".to_string(),
            ));
        }
        let current = self.get_status(job_id).await?;
        if current.status != JobStatus::AwaitingInput {
            return Err(JobError::InvalidState {
                job_id: job_id.to_string(),
                status: current.status,
            });
        }

        let extra = pairs_to_document(extra);
        self.transition(job_id, |record, now| {
            if record.status != JobStatus::AwaitingInput {
                return Err(JobError::InvalidState {
                    job_id: record.job_id.clone(),
                    status: record.status,
                });
            }
            let merged = self
                .registry
                .merge_and_validate(&record.input_data, &extra)
                .map_err(JobError::InvalidInput)?;
            let mut next = record.revise(now);
            next.input_data = merged;
            for (key, value) in &extra {
                next.pending_input.insert(key.clone(), value.clone());
            }
            Ok(Some(next))
        })
        .await?;

        self.deliver_pending_input(job_id).await
    }

    /// Forwards queued input to the backend, then resumes the job. A transient backend error
    /// keeps the input queued for a later sweep.
    pub async fn deliver_pending_input(&self, job_id: &str) -> Result<JobRecord, JobError> {
        let mut current = self.expire_if_due(job_id).await?;
        for _ in 0..self.settings.cas_max_attempts {
            if current.status != JobStatus::AwaitingInput || current.pending_input.is_empty() {
                return Ok(current);
            }
            let batch = current.pending_input.clone();
            if let Some(handle) = current.execution_handle.clone() {
                match self.adapter.provide_input(&handle, &batch).await {
                    Ok(()) => {}
                    Err(e) if e.is_transient() => {
                        warn!(job_id = %job_id, error = %e, "input delivery deferred; backend unavailable");
                        return Ok(current);
                    }
                    Err(e) => {
                        if self.backend_waiting_for_input(&handle).await {
                            let detail = format!("execution backend rejected input: {e}");
                            return self.force_failed(job_id, detail).await;
                        }
                        warn!(job_id = %job_id, error = %e, "backend resumed before queued input arrived");
                        return self.resume_after_input(job_id, None).await;
                    }
                }
            }
            self.resume_after_input(job_id, Some(&batch)).await?;
            current = self.load(job_id).await?;
        }
        Ok(current)
    }

    /// Sweep entry for `awaiting_input` jobs: retries a delivery that has sat queued for
    /// `resubmit_after_seconds`.
    pub async fn redeliver_if_stalled(&self, job_id: &str) -> Result<JobRecord, JobError> {
        let current = self.expire_if_due(job_id).await?;
        if current.status != JobStatus::AwaitingInput || current.pending_input.is_empty() {
            return Ok(current);
        }
        if self.clock.now_unix() - current.updated_at < self.settings.resubmit_after_seconds {
            return Ok(current);
        }
        self.deliver_pending_input(job_id).await
    }

    /// Leaves `awaiting_input` once the backend took `delivered`. Fields queued after that batch
    /// was read stay pending and keep the job waiting. `None` resumes and drops whatever is queued.
    async fn resume_after_input(
        &self,
        job_id: &str,
        delivered: Option<&Map<String, Value>>,
    ) -> Result<JobRecord, JobError> {
        let payment_required = self.settings.payment_required;
        let mutation = self
            .transition(job_id, |record, now| {
                if record.status != JobStatus::AwaitingInput {
                    return Ok(None);
                }
                let leftover: Map<String, Value> = match delivered {
                    Some(batch) => record
                        .pending_input
                        .iter()
                        .filter(|(key, value)| batch.get(key.as_str()) != Some(*value))
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect(),
                    None => Map::new(),
                };
                if !leftover.is_empty() {
                    let mut next = record.revise(now);
                    next.pending_input = leftover;
                    return Ok(Some(next));
                }
                let resume_to = if record.payment_satisfied(payment_required) {
                    JobStatus::Running
                } else {
                    JobStatus::AwaitingPayment
                };
                let mut next =
                    record.advance(resume_to, now, Some("additional input supplied".to_string()))?;
                next.pending_input.clear();
                Ok(Some(next))
            })
            .await?;
        Ok(mutation.into_record())
    }

    async fn backend_waiting_for_input(&self, handle: &str) -> bool {
        matches!(
            self.adapter.poll_result(handle).await,
            Ok(PollOutcome::NeedsInput { .. })
        )
    }

    /// Never fails: any probe error turns into `available = false` with a reason.
    pub async fn check_availability(&self) -> Availability {
        let probe = async {
            self.store
                .ping()
                .await
                .map_err(|e| format!("job store unreachable: {e}"))?;
            self.adapter
                .health()
                .await
                .map_err(|e| format!("execution backend unhealthy: {e}"))
        };
        let reason = match tokio::time::timeout(AVAILABILITY_TIMEOUT, probe).await {
            Ok(Ok(())) => {
                return Availability {
                    available: true,
                    message: Some("service is ready to accept jobs".to_string()),
                };
            }
            Ok(Err(reason)) => reason,
            Err(_) => "availability probe timed out".to_string(),
        };
        warn!(reason = %reason, "service unavailable");
        Availability {
            available: false,
            message: Some(reason),
        }
    }

    /// Applies on-chain payment evidence to a job. The `submit_result_time` deadline wins over
    /// any evidence: an unpaid job past it is failed no matter what the evidence says.
    pub async fn reconcile_payment(
        &self,
        job_id: &str,
        evidence: &PaymentEvidence,
    ) -> Result<(ReconcileOutcome, JobRecord), JobError> {
        let current = self.load(job_id).await?;
        let now = self.clock.now_unix();
        if self.settings.payment_required
            && current.payment.is_none()
            && now > current.submit_result_time
        {
            let record = self.expire_if_due(job_id).await?;
            return Ok((ReconcileOutcome::Expired, record));
        }
        if let Some(paid) = &current.payment {
            let outcome = already_paid_outcome(paid, evidence);
            if outcome == ReconcileOutcome::AlreadyConfirmed && self.needs_submission(&current) {
                info!(job_id = %job_id, "paid job has no execution handle; resubmitting");
                let record = self.execute(job_id).await?;
                return Ok((outcome, record));
            }
            return Ok((outcome, current));
        }
        if current.status.is_terminal() {
            return Err(JobError::InvalidState {
                job_id: job_id.to_string(),
                status: current.status,
            });
        }
        if !amounts_cover(&current.amounts, &evidence.amounts) {
            return Ok((
                ReconcileOutcome::Mismatched("paid amounts do not cover the quoted price".to_string()),
                current,
            ));
        }
        let verdict = self
            .payments
            .verify(&current.blockchain_identifier, evidence)
            .await?;
        if verdict == PaymentVerdict::Mismatched {
            info!(job_id = %job_id, tx_hash = %evidence.tx_hash, "payment evidence mismatched");
            return Ok((
                ReconcileOutcome::Mismatched(
                    "evidence does not match the job's blockchain identifier".to_string(),
                ),
                current,
            ));
        }

        let payment_required = self.settings.payment_required;
        let tx_hash = evidence.tx_hash.trim().to_string();
        let mut expired = false;
        let mutation = self
            .transition(job_id, |record, now| {
                expired = false;
                if payment_deadline_elapsed(now, record, payment_required) {
                    expired = true;
                    return Ok(Some(record.fail(expiry_detail(record), now)?));
                }
                if record.payment.is_some() {
                    return Ok(None);
                }
                if record.status.is_terminal() {
                    return Err(JobError::InvalidState {
                        job_id: record.job_id.clone(),
                        status: record.status,
                    });
                }
                let mut next = if record.status == JobStatus::AwaitingPayment {
                    record.advance(JobStatus::Running, now, Some("payment confirmed".to_string()))?
                } else {
                    record.revise(now)
                };
                next.payment = Some(PaymentConfirmation {
                    tx_hash: tx_hash.clone(),
                    confirmed_at: now,
                });
                Ok(Some(next))
            })
            .await?;

        match mutation {
            Mutation::Changed(record) if expired => {
                metrics_service::inc_payment_deadline_expiries();
                warn!(job_id = %job_id, "payment arrived after submit deadline; job failed");
                Ok((ReconcileOutcome::Expired, record))
            }
            Mutation::Changed(record) => {
                metrics_service::inc_payments_confirmed();
                info!(job_id = %job_id, tx_hash = %tx_hash, status = %record.status, "payment confirmed");
                if record.status == JobStatus::Running && record.execution_handle.is_none() {
                    let record = self.execute(job_id).await?;
                    return Ok((ReconcileOutcome::Confirmed, record));
                }
                Ok((ReconcileOutcome::Confirmed, record))
            }
            Mutation::Unchanged(record) => {
                let outcome = match &record.payment {
                    Some(paid) => already_paid_outcome(paid, evidence),
                    None => ReconcileOutcome::Mismatched("payment was not recorded".to_string()),
                };
                Ok((outcome, record))
            }
        }
    }

    /// One background poll of a running job. Transient backend errors leave the job as it is.
    pub async fn poll_adapter(&self, job_id: &str) -> Result<JobRecord, JobError> {
        let current = self.expire_if_due(job_id).await?;
        if current.status != JobStatus::Running {
            return Ok(current);
        }
        let Some(handle) = current.execution_handle.clone() else {
            return self.resubmit_if_stalled(job_id).await;
        };

        let outcome = match self.adapter.poll_result(&handle).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_transient() => {
                debug!(job_id = %job_id, error = %e, "poll deferred; backend unavailable");
                return Ok(current);
            }
            Err(e) => PollOutcome::Failed {
                error: format!("execution backend error: {e}"),
            },
        };

        let mutation = self
            .transition(job_id, |record, now| {
                if record.status != JobStatus::Running
                    || record.execution_handle.as_deref() != Some(handle.as_str())
                {
                    return Ok(None);
                }
                let next = match &outcome {
                    PollOutcome::Running { partial: None } => return Ok(None),
                    PollOutcome::Running {
                        partial: Some(partial),
                    } => {
                        if record.result.as_ref() == Some(partial) {
                            return Ok(None);
                        }
                        let mut next = record.revise(now);
                        next.result = Some(partial.clone());
                        next
                    }
                    PollOutcome::NeedsInput { prompt } => {
                        record.advance(JobStatus::AwaitingInput, now, prompt.clone())?
                    }
                    PollOutcome::Completed { output } => record.complete(output.clone(), now)?,
                    PollOutcome::Failed { error } => record.fail(error.clone(), now)?,
                };
                Ok(Some(next))
            })
            .await?;
        let record = mutation.into_record();
        if record.status.is_terminal() {
            if let Err(e) = self.adapter.release(&handle).await {
                debug!(job_id = %job_id, handle = %handle, error = %e, "task release skipped");
            }
        }
        Ok(record)
    }

    /// Submits a job that is cleared to run but never got an execution handle, for example
    /// because the process failed between the payment commit and the backend submit. Only jobs
    /// untouched for `resubmit_after_seconds` qualify, so an in-flight submit is not duplicated.
    pub async fn resubmit_if_stalled(&self, job_id: &str) -> Result<JobRecord, JobError> {
        let current = self.expire_if_due(job_id).await?;
        if !self.needs_submission(&current) {
            return Ok(current);
        }
        let idle = self.clock.now_unix() - current.updated_at;
        if idle < self.settings.resubmit_after_seconds {
            return Ok(current);
        }
        warn!(job_id = %job_id, idle_seconds = idle, "stalled job has no execution handle; resubmitting");
        self.execute(job_id).await
    }

    fn needs_submission(&self, record: &JobRecord) -> bool {
        matches!(record.status, JobStatus::Pending | JobStatus::Running)
            && record.execution_handle.is_none()
            && record.payment_satisfied(self.settings.payment_required)
    }

    /// Fails the job when its payment deadline has passed unpaid; otherwise returns it unchanged.
    pub async fn expire_if_due(&self, job_id: &str) -> Result<JobRecord, JobError> {
        let payment_required = self.settings.payment_required;
        let mutation = self
            .transition(job_id, |record, now| {
                if !payment_deadline_elapsed(now, record, payment_required) {
                    return Ok(None);
                }
                Ok(Some(record.fail(expiry_detail(record), now)?))
            })
            .await?;
        match mutation {
            Mutation::Changed(record) => {
                metrics_service::inc_payment_deadline_expiries();
                warn!(
                    job_id = %job_id,
                    submit_result_time = record.submit_result_time,
                    "payment deadline expired; job failed"
                );
                self.release_handle(&record).await;
                Ok(record)
            }
            Mutation::Unchanged(record) => Ok(record),
        }
    }

    /// Submits the job to the execution backend once and records the handle.
    async fn execute(&self, job_id: &str) -> Result<JobRecord, JobError> {
        let current = self.load(job_id).await?;
        if current.execution_handle.is_some() || current.status.is_terminal() {
            return Ok(current);
        }
        if !current.payment_satisfied(self.settings.payment_required) {
            return Err(JobError::InvalidState {
                job_id: job_id.to_string(),
                status: current.status,
            });
        }

        let handle = match self.adapter.submit(job_id, &current.input_data).await {
            Ok(handle) => handle,
            Err(e) => {
                let detail = format!("execution submit failed: {e}");
                return self.force_failed(job_id, detail).await;
            }
        };

        let mutation = self
            .transition(job_id, |record, now| {
                if record.status.is_terminal() || record.execution_handle.is_some() {
                    return Ok(None);
                }
                let mut next = if record.status == JobStatus::Running {
                    record.revise(now)
                } else {
                    record.advance(
                        JobStatus::Running,
                        now,
                        Some("submitted to execution backend".to_string()),
                    )?
                };
                next.execution_handle = Some(handle.clone());
                Ok(Some(next))
            })
            .await?;
        match mutation {
            Mutation::Changed(record) => {
                info!(job_id = %job_id, handle = %handle, "job submitted");
                Ok(record)
            }
            Mutation::Unchanged(record) => {
                if let Err(e) = self.adapter.cancel(&handle).await {
                    warn!(job_id = %job_id, handle = %handle, error = %e, "orphan task cancel failed");
                }
                Ok(record)
            }
        }
    }

    async fn force_failed(&self, job_id: &str, detail: String) -> Result<JobRecord, JobError> {
        let mutation = self
            .transition(job_id, |record, now| {
                if record.status.is_terminal() {
                    return Ok(None);
                }
                Ok(Some(record.fail(detail.clone(), now)?))
            })
            .await?;
        match mutation {
            Mutation::Changed(record) => {
                self.release_handle(&record).await;
                Ok(record)
            }
            Mutation::Unchanged(record) => Ok(record),
        }
    }

    async fn release_handle(&self, record: &JobRecord) {
        let Some(handle) = &record.execution_handle else {
            return;
        };
        if let Err(e) = self.adapter.cancel(handle).await {
            warn!(job_id = %record.job_id, handle = %handle, error = %e, "best-effort cancel failed");
        }
    }

    async fn load(&self, job_id: &str) -> Result<JobRecord, JobError> {
        self.store
            .get(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// Read, decide, compare-and-swap; retried on `StaleState` up to `cas_max_attempts`.
    /// `decide` returning `None` means the fresh record needs no write.
    async fn transition<F>(&self, job_id: &str, mut decide: F) -> Result<Mutation, JobError>
    where
        F: FnMut(&JobRecord, i64) -> Result<Option<JobRecord>, JobError> + Send,
    {
        for attempt in 1..=self.settings.cas_max_attempts {
            let current = self.load(job_id).await?;
            let now = self.clock.now_unix();
            let Some(next) = decide(&current, now)? else {
                return Ok(Mutation::Unchanged(current));
            };
            match self
                .store
                .compare_and_swap(job_id, current.status, &next)
                .await
            {
                Ok(()) => {
                    record_commit(&current, &next);
                    return Ok(Mutation::Changed(next));
                }
                Err(StoreError::StaleState { actual, .. }) => {
                    metrics_service::inc_cas_retries();
                    debug!(job_id = %job_id, attempt, actual = %actual, "stale job state; retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        metrics_service::set_last_error_ts(self.clock.now_unix());
        Err(JobError::Contention(job_id.to_string()))
    }
}

fn already_paid_outcome(paid: &PaymentConfirmation, evidence: &PaymentEvidence) -> ReconcileOutcome {
    if paid.tx_hash.eq_ignore_ascii_case(evidence.tx_hash.trim()) {
        ReconcileOutcome::AlreadyConfirmed
    } else {
        ReconcileOutcome::Mismatched("job is already paid by another transaction".to_string())
    }
}

fn record_commit(previous: &JobRecord, next: &JobRecord) {
    if previous.status == next.status {
        debug!(job_id = %next.job_id, revision = next.revision, "job updated");
        return;
    }
    info!(
        job_id = %next.job_id,
        from = %previous.status,
        to = %next.status,
        revision = next.revision,
        "job transition committed"
    );
    match next.status {
        JobStatus::Completed => metrics_service::inc_jobs_completed(),
        JobStatus::Failed => {
            metrics_service::inc_jobs_failed();
            metrics_service::set_last_error_ts(next.updated_at);
        }
        _ => {}
    }
}
