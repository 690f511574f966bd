use super::schema::{Amount, JobStatus, JobStatusTransition};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentConfirmation {
    pub tx_hash: String,
    pub confirmed_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub job_id: String,
    pub blockchain_identifier: String,
    pub identifier_from_purchaser: Option<String>,
    pub status: JobStatus,
    pub input_data: Map<String, Value>,
    /// Fields accepted by `provide_input` that the execution backend has not taken yet.
    #[serde(default)]
    pub pending_input: Map<String, Value>,
    pub input_hash: String,
    pub result: Option<Value>,
    pub error_detail: Option<String>,
    pub submit_result_time: i64,
    pub unlock_time: i64,
    pub external_dispute_unlock_time: i64,
    pub amounts: Vec<Amount>,
    pub agent_identifier: String,
    pub seller_vkey: String,
    pub execution_handle: Option<String>,
    pub payment: Option<PaymentConfirmation>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Bumped by exactly one on every committed write.
    pub revision: u64,
    pub transitions: Vec<JobStatusTransition>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("job {job_id} cannot transition from {from} to {to}")]
pub struct InvalidTransition {
    pub job_id: String,
    pub from: JobStatus,
    pub to: JobStatus,
}

impl JobRecord {
    /// Copy of this record staged as the next revision, without a status change.
    pub fn revise(&self, now: i64) -> JobRecord {
        let mut next = self.clone();
        next.revision += 1;
        next.updated_at = now;
        next
    }

    pub fn advance(
        &self,
        to: JobStatus,
        now: i64,
        detail: Option<String>,
    ) -> Result<JobRecord, InvalidTransition> {
        if !is_valid_transition(self.status, to) {
            return Err(InvalidTransition {
                job_id: self.job_id.clone(),
                from: self.status,
                to,
            });
        }
        let mut next = self.revise(now);
        next.status = to;
        next.transitions.push(JobStatusTransition {
            from_status: Some(self.status),
            to_status: to,
            transitioned_at: now,
            detail,
        });
        Ok(next)
    }

    pub fn complete(&self, output: Value, now: i64) -> Result<JobRecord, InvalidTransition> {
        let mut next = self.advance(JobStatus::Completed, now, None)?;
        next.result = Some(output);
        Ok(next)
    }

    pub fn fail(&self, detail: impl Into<String>, now: i64) -> Result<JobRecord, InvalidTransition> {
        let detail = detail.into();
        let mut next = self.advance(JobStatus::Failed, now, Some(detail.clone()))?;
        next.error_detail = Some(detail);
        Ok(next)
    }

    pub fn payment_satisfied(&self, payment_required: bool) -> bool {
        !payment_required || self.payment.is_some()
    }
}

pub fn is_valid_transition(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;

    if to == Failed {
        return !from.is_terminal();
    }
    matches!(
        (from, to),
        (Pending, AwaitingPayment)
            | (Pending, AwaitingInput)
            | (Pending, Running)
            | (AwaitingPayment, AwaitingInput)
            | (AwaitingPayment, Running)
            | (AwaitingInput, AwaitingPayment)
            | (AwaitingInput, Running)
            | (Running, AwaitingInput)
            | (Running, Completed)
    )
}
