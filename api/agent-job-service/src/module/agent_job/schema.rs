use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    AwaitingPayment,
    AwaitingInput,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        Self::Pending,
        Self::AwaitingPayment,
        Self::AwaitingInput,
        Self::Running,
        Self::Completed,
        Self::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AwaitingPayment => "awaiting_payment",
            Self::AwaitingInput => "awaiting_input",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Status label exposed by `/status` and `/start_job`.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AwaitingPayment => "awaiting payment",
            Self::AwaitingInput => "awaiting input",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == raw)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a price quote. `amount` is in micro-units of `unit` (1 unit = 10^-6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Amount {
    pub amount: u64,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputField {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputData {
    Pairs(Vec<InputField>),
    Document(Map<String, Value>),
}

impl InputData {
    pub fn into_document(self) -> Map<String, Value> {
        match self {
            Self::Document(doc) => doc,
            Self::Pairs(pairs) => pairs_to_document(pairs),
        }
    }
}

/// Later pairs win when a key repeats.
pub fn pairs_to_document(pairs: Vec<InputField>) -> Map<String, Value> {
    let mut doc = Map::new();
    for field in pairs {
        doc.insert(field.key, field.value);
    }
    doc
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartJobRequest {
    #[serde(default, alias = "identifierFromPurchaser")]
    pub identifier_from_purchaser: Option<String>,
    #[serde(alias = "inputData")]
    pub input_data: InputData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartJobResponse {
    pub status: String,
    #[serde(rename = "job_id")]
    pub job_id: String,
    pub blockchain_identifier: String,
    pub submit_result_time: i64,
    pub unlock_time: i64,
    pub external_dispute_unlock_time: i64,
    pub agent_identifier: String,
    #[serde(rename = "sellerVKey")]
    pub seller_vkey: String,
    pub amounts: Vec<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_from_purchaser: Option<String>,
    #[serde(rename = "input_hash")]
    pub input_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusQuery {
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvideInputRequest {
    pub job_id: String,
    pub input_data: Vec<InputField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvideInputResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputSchemaField {
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSchemaResponse {
    pub input_data: Vec<InputSchemaField>,
}

/// On-chain payment observation delivered by the payment watcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentEvidence {
    #[serde(alias = "blockchainIdentifier")]
    pub blockchain_identifier: String,
    #[serde(alias = "txHash")]
    pub tx_hash: String,
    pub amounts: Vec<Amount>,
    #[serde(default)]
    pub confirmations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvidenceRequest {
    pub job_id: String,
    pub evidence: PaymentEvidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvidenceResponse {
    pub job_id: String,
    pub status: String,
    pub verdict: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusTransition {
    pub from_status: Option<JobStatus>,
    pub to_status: JobStatus,
    pub transitioned_at: i64,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub error_code: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMetricsView {
    pub jobs_created: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub payments_confirmed: u64,
    pub payment_deadline_expiries: u64,
    pub cas_retries: u64,
    pub last_error_ts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub sweep_enabled: bool,
    pub payment_required: bool,
    pub metrics: HealthMetricsView,
    pub reason: String,
}

fn is_false(v: &bool) -> bool {
    !*v
}
