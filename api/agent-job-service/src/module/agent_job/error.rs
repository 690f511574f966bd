use super::crud::StoreError;
use super::model::InvalidTransition;
use super::schema::JobStatus;
use crate::service::payment_binding_service::PaymentError;
use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code,
            message: message.into(),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code,
            message: message.into(),
        }
    }

    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("operation not allowed while job {job_id} is {status}")]
    InvalidState { job_id: String, status: JobStatus },

    #[error("job {0} kept changing under concurrent writers")]
    Contention(String),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for JobError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(job_id) => Self::NotFound(job_id),
            other => Self::Store(other),
        }
    }
}

impl From<InvalidTransition> for JobError {
    fn from(err: InvalidTransition) -> Self {
        Self::InvalidState {
            job_id: err.job_id,
            status: err.from,
        }
    }
}

impl From<JobError> for AppError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::InvalidInput(message) => AppError::bad_request("INVALID_INPUT", message),
            JobError::NotFound(job_id) => {
                AppError::not_found("JOB_NOT_FOUND", format!("job not found: {job_id}"))
            }
            e @ JobError::InvalidState { .. } => {
                AppError::bad_request("INVALID_STATE", e.to_string())
            }
            e @ JobError::Contention(_) => AppError::internal("STATE_CONTENTION", e.to_string()),
            JobError::Store(e) => AppError::internal("JOB_STORE_ERROR", e.to_string()),
            JobError::Payment(e) => AppError::internal("PAYMENT_BINDING_ERROR", e.to_string()),
            JobError::Internal(message) => AppError::internal("INTERNAL_ERROR", message),
        }
    }
}
