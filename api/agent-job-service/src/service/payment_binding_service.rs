use crate::config::environment::AppConfig;
use crate::module::agent_job::schema::{Amount, PaymentEvidence};
use crate::service::clock_service::Clock;
use crate::service::hash_service::sha256_hex;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentWindows {
    pub submit_result_window_seconds: i64,
    pub unlock_delay_seconds: i64,
    pub dispute_window_seconds: i64,
}

impl PaymentWindows {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            submit_result_window_seconds: config.submit_result_window_seconds.max(1),
            unlock_delay_seconds: config.unlock_delay_seconds.max(0),
            dispute_window_seconds: config.dispute_window_seconds.max(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentBinding {
    pub blockchain_identifier: String,
    pub submit_result_time: i64,
    pub unlock_time: i64,
    pub external_dispute_unlock_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentVerdict {
    Matched,
    Mismatched,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("payment watcher unavailable: {0}")]
    Unavailable(String),

    #[error("payment binding state error: {0}")]
    Internal(String),
}

/// Issues the on-chain correlation identifier and payment windows for a new job, and
/// confirms evidence delivered by the on-chain watcher.
///
/// `verify` must be idempotent: repeating the same evidence yields the same verdict.
#[async_trait]
pub trait PaymentBindingIssuer: Send + Sync {
    async fn bind(&self, job_id: &str, amounts: &[Amount]) -> Result<PaymentBinding, PaymentError>;

    async fn verify(
        &self,
        blockchain_identifier: &str,
        evidence: &PaymentEvidence,
    ) -> Result<PaymentVerdict, PaymentError>;
}

/// True when `paid` covers every `(amount, unit)` of `quoted`, summing repeated units.
pub fn amounts_cover(quoted: &[Amount], paid: &[Amount]) -> bool {
    let mut paid_by_unit: HashMap<&str, u64> = HashMap::new();
    for a in paid {
        let total = paid_by_unit.entry(a.unit.as_str()).or_insert(0);
        *total = total.saturating_add(a.amount);
    }
    let mut quoted_by_unit: HashMap<&str, u64> = HashMap::new();
    for a in quoted {
        let total = quoted_by_unit.entry(a.unit.as_str()).or_insert(0);
        *total = total.saturating_add(a.amount);
    }
    quoted_by_unit
        .iter()
        .all(|(unit, amount)| paid_by_unit.get(unit).copied().unwrap_or(0) >= *amount)
}

/// In-process issuer. Identifiers are SHA-256 digests over the operator identity, the job id
/// and a random nonce; the job store's blockchain-identifier index rejects the rare collision.
/// Holds no per-job state: which transaction paid a job lives on the job record, so a second
/// payer is turned away by the orchestrator.
pub struct LocalPaymentIssuer {
    agent_identifier: String,
    seller_vkey: String,
    windows: PaymentWindows,
    min_confirmations: u32,
    clock: Arc<dyn Clock>,
}

impl LocalPaymentIssuer {
    pub fn new(
        agent_identifier: impl Into<String>,
        seller_vkey: impl Into<String>,
        windows: PaymentWindows,
        min_confirmations: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            agent_identifier: agent_identifier.into(),
            seller_vkey: seller_vkey.into(),
            windows,
            min_confirmations,
            clock,
        }
    }

    pub fn from_app(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config.agent_identifier.clone(),
            config.seller_vkey.clone(),
            PaymentWindows::from_app(config),
            config.payment_min_confirmations,
            clock,
        )
    }
}

#[async_trait]
impl PaymentBindingIssuer for LocalPaymentIssuer {
    async fn bind(&self, job_id: &str, amounts: &[Amount]) -> Result<PaymentBinding, PaymentError> {
        let now = self.clock.now_unix();
        let quote = amounts
            .iter()
            .map(|a| format!("{}{}", a.amount, a.unit))
            .collect::<Vec<_>>()
            .join(",");
        let blockchain_identifier = sha256_hex(&format!(
            "{}:{}:{}:{}:{}:{}",
            self.agent_identifier,
            self.seller_vkey,
            job_id,
            quote,
            now,
            Uuid::new_v4()
        ));

        let submit_result_time = now + self.windows.submit_result_window_seconds;
        let unlock_time = submit_result_time + self.windows.unlock_delay_seconds;
        Ok(PaymentBinding {
            blockchain_identifier,
            submit_result_time,
            unlock_time,
            external_dispute_unlock_time: unlock_time + self.windows.dispute_window_seconds,
        })
    }

    async fn verify(
        &self,
        blockchain_identifier: &str,
        evidence: &PaymentEvidence,
    ) -> Result<PaymentVerdict, PaymentError> {
        if evidence.blockchain_identifier != blockchain_identifier {
            return Ok(PaymentVerdict::Mismatched);
        }
        let tx_hash = evidence.tx_hash.trim();
        if tx_hash.is_empty() || !tx_hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(PaymentVerdict::Mismatched);
        }
        if evidence.confirmations < self.min_confirmations {
            return Ok(PaymentVerdict::Mismatched);
        }
        Ok(PaymentVerdict::Matched)
    }
}
