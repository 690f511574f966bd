use super::error::AppError;
use super::model::JobRecord;
use super::schema::{
    AvailabilityResponse, ErrorResponse, HealthMetricsView, HealthResponse, InputSchemaResponse,
    JobStatus, JobStatusResponse, PaymentEvidenceRequest, PaymentEvidenceResponse,
    ProvideInputRequest, ProvideInputResponse, StartJobRequest, StartJobResponse, StatusQuery,
};
use crate::app::AppState;
use crate::service::internal_auth_service::{SIGNATURE_HEADER, verify_internal_signature};
use crate::service::metrics_service;
use crate::service::orchestrator_service::{NewJob, ReconcileOutcome};
use crate::service::validation_service;
use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{error, info};

pub async fn start_job(
    State(state): State<AppState>,
    payload: Result<Json<StartJobRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return error_response(invalid_body(rejection), "start job rejected"),
    };
    if let Err(err) = validation_service::validate_start_job_request(&req) {
        return error_response(err, "start job rejected");
    }

    let job = NewJob {
        identifier_from_purchaser: req.identifier_from_purchaser,
        input: req.input_data.into_document(),
    };
    match state.orchestrator.create_job(job).await {
        Ok(record) => {
            info!(job_id = %record.job_id, status = %record.status, "job accepted");
            (StatusCode::CREATED, Json(start_job_response(record))).into_response()
        }
        Err(err) => error_response(err.into(), "start job rejected"),
    }
}

pub async fn get_status(
    State(state): State<AppState>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> Response {
    let job_id = match query {
        Ok(Query(q)) => q.job_id.filter(|id| !id.trim().is_empty()),
        Err(rejection) => {
            return error_response(
                AppError::bad_request("INVALID_QUERY", rejection.body_text()),
                "status lookup failed",
            );
        }
    };
    let Some(job_id) = job_id else {
        return error_response(
            AppError::bad_request("INVALID_JOB_ID", "job_id query parameter is required"),
            "status lookup failed",
        );
    };

    match state.orchestrator.get_status(&job_id).await {
        Ok(record) => (StatusCode::OK, Json(status_response(&record))).into_response(),
        Err(err) => error_response(err.into(), "status lookup failed"),
    }
}

pub async fn provide_input(
    State(state): State<AppState>,
    payload: Result<Json<ProvideInputRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return error_response(invalid_body(rejection), "provide input rejected"),
    };
    if let Err(err) = validation_service::validate_provide_input_request(&req) {
        return error_response(err, "provide input rejected");
    }

    match state
        .orchestrator
        .provide_input(&req.job_id, req.input_data)
        .await
    {
        Ok(record) => {
            info!(job_id = %record.job_id, status = %record.status, "additional input accepted");
            (
                StatusCode::OK,
                Json(ProvideInputResponse {
                    status: "success".to_string(),
                }),
            )
                .into_response()
        }
        Err(err) => error_response(err.into(), "provide input rejected"),
    }
}

pub async fn availability(State(state): State<AppState>) -> Response {
    let availability = state.orchestrator.check_availability().await;
    (
        StatusCode::OK,
        Json(AvailabilityResponse {
            status: if availability.available {
                "available".to_string()
            } else {
                "unavailable".to_string()
            },
            message: availability.message,
        }),
    )
        .into_response()
}

pub async fn input_schema(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(InputSchemaResponse {
            input_data: state.orchestrator.get_schema(),
        }),
    )
        .into_response()
}

/// Verification hook for the on-chain payment watcher.
pub async fn payment_evidence(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<PaymentEvidenceRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return error_response(invalid_body(rejection), "payment evidence rejected"),
    };
    if let Err(err) = verify_write_auth(&state, &headers, &req) {
        return error_response(err, "payment evidence rejected");
    }
    if let Err(err) = validation_service::validate_payment_evidence_request(&req) {
        return error_response(err, "payment evidence rejected");
    }

    match state
        .orchestrator
        .reconcile_payment(&req.job_id, &req.evidence)
        .await
    {
        Ok((outcome, record)) => {
            info!(
                job_id = %record.job_id,
                verdict = outcome.verdict(),
                status = %record.status,
                "payment evidence reconciled"
            );
            let reason = match &outcome {
                ReconcileOutcome::Mismatched(reason) => Some(reason.clone()),
                ReconcileOutcome::Expired => record.error_detail.clone(),
                ReconcileOutcome::Confirmed | ReconcileOutcome::AlreadyConfirmed => None,
            };
            (
                StatusCode::OK,
                Json(PaymentEvidenceResponse {
                    job_id: record.job_id.clone(),
                    status: record.status.as_wire().to_string(),
                    verdict: outcome.verdict().to_string(),
                    reason,
                }),
            )
                .into_response()
        }
        Err(err) => error_response(err.into(), "payment evidence rejected"),
    }
}

pub async fn health(State(state): State<AppState>) -> Response {
    let availability = state.orchestrator.check_availability().await;
    let m = metrics_service::snapshot();
    let metrics = HealthMetricsView {
        jobs_created: m.jobs_created,
        jobs_completed: m.jobs_completed,
        jobs_failed: m.jobs_failed,
        payments_confirmed: m.payments_confirmed,
        payment_deadline_expiries: m.payment_deadline_expiries,
        cas_retries: m.cas_retries,
        last_error_ts: m.last_error_ts,
    };

    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: availability.available,
            sweep_enabled: state.config.sweep_enabled,
            payment_required: state.orchestrator.settings().payment_required,
            metrics,
            reason: availability
                .message
                .unwrap_or_else(|| "healthy".to_string()),
        }),
    )
        .into_response()
}

fn start_job_response(record: JobRecord) -> StartJobResponse {
    StartJobResponse {
        status: record.status.as_wire().to_string(),
        job_id: record.job_id,
        blockchain_identifier: record.blockchain_identifier,
        submit_result_time: record.submit_result_time,
        unlock_time: record.unlock_time,
        external_dispute_unlock_time: record.external_dispute_unlock_time,
        agent_identifier: record.agent_identifier,
        seller_vkey: record.seller_vkey,
        amounts: record.amounts,
        identifier_from_purchaser: record.identifier_from_purchaser,
        input_hash: record.input_hash,
    }
}

fn status_response(record: &JobRecord) -> JobStatusResponse {
    let message = match record.status {
        JobStatus::Failed => record.error_detail.clone(),
        JobStatus::AwaitingInput => record
            .transitions
            .last()
            .and_then(|t| t.detail.clone()),
        _ => None,
    };
    JobStatusResponse {
        job_id: record.job_id.clone(),
        status: record.status.as_wire().to_string(),
        result: record.result.clone(),
        message,
    }
}

fn invalid_body(rejection: JsonRejection) -> AppError {
    AppError::bad_request("INVALID_REQUEST_BODY", rejection.body_text())
}

fn verify_write_auth<T: serde::Serialize>(
    state: &AppState,
    headers: &HeaderMap,
    payload: &T,
) -> Result<(), AppError> {
    if !state.config.internal_auth_enabled {
        return Ok(());
    }
    let secret = state
        .config
        .internal_auth_secret
        .as_deref()
        .ok_or_else(|| AppError::internal("AUTH_CONFIG_ERROR", "internal auth secret missing"))?;
    let sig = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            AppError::unauthorized("AUTH_MISSING_SIGNATURE", format!("missing {SIGNATURE_HEADER}"))
        })?;
    let canonical = serde_json::to_string(payload).map_err(|e| {
        AppError::internal(
            "AUTH_SERIALIZE_ERROR",
            format!("auth payload serialization failed: {e}"),
        )
    })?;
    verify_internal_signature(&canonical, sig, secret)
        .map_err(|e| AppError::unauthorized("AUTH_INVALID_SIGNATURE", e))
}

fn error_response(err: AppError, context: &'static str) -> Response {
    error!(error_code = err.code, reason = %err.message, "{context}");
    (
        err.status,
        Json(ErrorResponse {
            status: "error".to_string(),
            error_code: err.code.to_string(),
            reason: err.message,
        }),
    )
        .into_response()
}
