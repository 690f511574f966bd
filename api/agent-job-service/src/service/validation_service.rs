use crate::module::agent_job::error::AppError;
use crate::module::agent_job::schema::{PaymentEvidenceRequest, ProvideInputRequest, StartJobRequest};

const MAX_PURCHASER_IDENTIFIER_LEN: usize = 64;

pub fn validate_start_job_request(req: &StartJobRequest) -> Result<(), AppError> {
    let Some(identifier) = &req.identifier_from_purchaser else {
        return Ok(());
    };
    if identifier.trim().is_empty() {
        return Err(AppError::bad_request(
            "INVALID_PURCHASER_IDENTIFIER",
            "identifier_from_purchaser cannot be blank",
        ));
    }
    if identifier.len() > MAX_PURCHASER_IDENTIFIER_LEN {
        return Err(AppError::bad_request(
            "INVALID_PURCHASER_IDENTIFIER",
            format!("identifier_from_purchaser exceeds {MAX_PURCHASER_IDENTIFIER_LEN} characters"),
        ));
    }
    if !identifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::bad_request(
            "INVALID_PURCHASER_IDENTIFIER",
            "identifier_from_purchaser contains invalid characters",
        ));
    }
    Ok(())
}

pub fn validate_provide_input_request(req: &ProvideInputRequest) -> Result<(), AppError> {
    if req.job_id.trim().is_empty() {
        return Err(AppError::bad_request("INVALID_JOB_ID", "job_id is required"));
    }
    if req.input_data.is_empty() {
        return Err(AppError::bad_request(
            "INVALID_INPUT",
            "input_data must contain at least one field",
        ));
    }
    if req.input_data.iter().any(|f| f.key.trim().is_empty()) {
        return Err(AppError::bad_request(
            "INVALID_INPUT",
            "input_data keys cannot be empty",
        ));
    }
    Ok(())
}

pub fn validate_payment_evidence_request(req: &PaymentEvidenceRequest) -> Result<(), AppError> {
    if req.job_id.trim().is_empty() {
        return Err(AppError::bad_request("INVALID_JOB_ID", "job_id is required"));
    }
    if req.evidence.blockchain_identifier.trim().is_empty() {
        return Err(AppError::bad_request(
            "INVALID_PAYMENT_EVIDENCE",
            "evidence.blockchain_identifier is required",
        ));
    }
    if req.evidence.tx_hash.trim().is_empty() {
        return Err(AppError::bad_request(
            "INVALID_PAYMENT_EVIDENCE",
            "evidence.tx_hash is required",
        ));
    }
    if req.evidence.amounts.is_empty() {
        return Err(AppError::bad_request(
            "INVALID_PAYMENT_EVIDENCE",
            "evidence.amounts must not be empty",
        ));
    }
    Ok(())
}
