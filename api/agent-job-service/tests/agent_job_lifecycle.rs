mod common;

use agent_job_service::module::agent_job::crud::JobStore;
use agent_job_service::module::agent_job::model::PaymentConfirmation;
use agent_job_service::module::agent_job::schema::{InputField, JobStatus};
use agent_job_service::service::execution_service::PollOutcome;
use agent_job_service::service::internal_auth_service::sign_internal_payload;
use agent_job_service::service::sweep_service::sweep_once;
use common::{
    START_TS, ScriptedAdapter, TestHarness, build_harness, evidence_request, get_json,
    paid_job_awaiting_input, post_evidence, post_json, send, start_job, test_config,
};
use serde_json::json;

fn option(value: &str) -> Vec<InputField> {
    vec![InputField {
        key: "option".to_string(),
        value: json!(value),
    }]
}

/// Leaves a paid job `running` with no execution handle, as if the process died between the
/// payment commit and the backend submit.
async fn paid_job_without_handle(h: &TestHarness) -> (serde_json::Value, String) {
    let job = start_job(h, json!({"text": "hello"})).await;
    let job_id = job["job_id"].as_str().expect("job_id").to_string();
    let before = h.record(&job_id).await.expect("record");
    let mut stalled = before
        .advance(JobStatus::Running, START_TS, Some("payment confirmed".to_string()))
        .expect("advance");
    stalled.payment = Some(PaymentConfirmation {
        tx_hash: "ab12cd34".to_string(),
        confirmed_at: START_TS,
    });
    h.store
        .compare_and_swap(&job_id, before.status, &stalled)
        .await
        .expect("cas");
    (job, job_id)
}

#[tokio::test]
async fn start_job_creates_pending_job_with_unique_identifiers() {
    let h = build_harness(test_config(false));

    let first = start_job(&h, json!({"text": "hello"})).await;
    let second = start_job(&h, json!({"text": "hello"})).await;

    assert_eq!(first["status"], "pending");
    assert_ne!(first["job_id"], second["job_id"]);
    assert_ne!(first["blockchainIdentifier"], second["blockchainIdentifier"]);
    assert_eq!(first["agentIdentifier"], "agent-test");
    assert_eq!(first["sellerVKey"], "vkey-test");
    assert_eq!(first["amounts"][0]["unit"], "lovelace");
    assert_eq!(
        first["submitResultTime"].as_i64(),
        Some(common::START_TS + 3600)
    );
    assert!(first["unlockTime"].as_i64() < first["externalDisputeUnlockTime"].as_i64());
    assert_eq!(first["input_hash"], second["input_hash"]);
}

#[tokio::test]
async fn start_job_accepts_key_value_pairs_and_waits_for_payment() {
    let h = build_harness(test_config(true));
    let (status, body) = post_json(
        &h.app,
        "/start_job",
        json!({
            "identifier_from_purchaser": "order-17",
            "input_data": [{"key": "text", "value": "hello"}]
        }),
    )
    .await;

    assert_eq!(status, http::StatusCode::CREATED);
    assert_eq!(body["status"], "awaiting payment");
    assert_eq!(body["identifierFromPurchaser"], "order-17");
    assert!(h.adapter.submissions().is_empty());
}

#[tokio::test]
async fn schema_violation_creates_no_job_and_submits_nothing() {
    let h = build_harness(test_config(false));

    let (status, body) = post_json(&h.app, "/start_job", json!({"input_data": {"text": 5}})).await;
    assert_eq!(status, http::StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error_code"], "INVALID_INPUT");

    let (status, body) = post_json(&h.app, "/start_job", json!({"input_data": {"other": "x"}})).await;
    assert_eq!(status, http::StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_INPUT");

    assert!(h.all_job_ids().await.is_empty());
    assert!(h.adapter.submissions().is_empty());
}

#[tokio::test]
async fn malformed_start_job_body_is_bad_request() {
    let h = build_harness(test_config(false));
    let (status, body) = post_json(&h.app, "/start_job", json!({"input": "nope"})).await;
    assert_eq!(status, http::StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_REQUEST_BODY");
}

#[tokio::test]
async fn status_of_unknown_job_is_not_found() {
    let h = build_harness(test_config(false));
    let (status, body) = get_json(&h.app, "/status?job_id=unknown-id").await;
    assert_eq!(status, http::StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "JOB_NOT_FOUND");
}

#[tokio::test]
async fn status_without_job_id_is_bad_request() {
    let h = build_harness(test_config(false));
    let (status, body) = get_json(&h.app, "/status").await;
    assert_eq!(status, http::StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_JOB_ID");
}

#[tokio::test]
async fn completed_job_reports_result_and_never_changes() {
    let h = build_harness(test_config(false));
    let job = start_job(&h, json!({"text": "hello"})).await;
    let job_id = job["job_id"].as_str().expect("job_id");
    h.wait_for_status(job_id, JobStatus::Running).await;
    assert_eq!(h.adapter.submissions(), vec![job_id.to_string()]);

    h.adapter.script(
        job_id,
        PollOutcome::Completed {
            output: json!("42"),
        },
    );
    let report = sweep_once(&h.orchestrator).await.expect("sweep");
    assert_eq!(report.completed, 1);

    let uri = format!("/status?job_id={job_id}");
    let (status, body) = get_json(&h.app, &uri).await;
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["result"], "42");

    h.adapter.script(
        job_id,
        PollOutcome::Failed {
            error: "late failure".to_string(),
        },
    );
    sweep_once(&h.orchestrator).await.expect("sweep");
    let (_, body) = get_json(&h.app, &uri).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["result"], "42");
    assert_eq!(h.adapter.submissions().len(), 1);
}

#[tokio::test]
async fn running_job_surfaces_partial_result() {
    let h = build_harness(test_config(false));
    let job = start_job(&h, json!({"text": "hello"})).await;
    let job_id = job["job_id"].as_str().expect("job_id");
    h.wait_for_status(job_id, JobStatus::Running).await;

    h.adapter.script(
        job_id,
        PollOutcome::Running {
            partial: Some(json!({"progress": 0.5})),
        },
    );
    sweep_once(&h.orchestrator).await.expect("sweep");

    let (_, body) = get_json(&h.app, &format!("/status?job_id={job_id}")).await;
    assert_eq!(body["status"], "running");
    assert_eq!(body["result"]["progress"], 0.5);
}

#[tokio::test]
async fn backend_failure_is_recorded_on_the_job() {
    let h = build_harness(test_config(false));
    let job = start_job(&h, json!({"text": "hello"})).await;
    let job_id = job["job_id"].as_str().expect("job_id");
    h.wait_for_status(job_id, JobStatus::Running).await;

    h.adapter.script(
        job_id,
        PollOutcome::Failed {
            error: "model crashed".to_string(),
        },
    );
    let report = sweep_once(&h.orchestrator).await.expect("sweep");
    assert_eq!(report.failed, 1);

    let (status, body) = get_json(&h.app, &format!("/status?job_id={job_id}")).await;
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["message"], "model crashed");
}

#[tokio::test]
async fn payment_confirmation_submits_exactly_once() {
    let h = build_harness(test_config(true));
    let job = start_job(&h, json!({"text": "hello"})).await;
    let job_id = job["job_id"].as_str().expect("job_id");
    let req = evidence_request(&job, 10_000_000);

    let (_, first) = post_evidence(&h, &req).await;
    let (_, again) = post_evidence(&h, &req).await;

    assert_eq!(first["verdict"], "matched");
    assert_eq!(again["verdict"], "matched");
    assert_eq!(again["status"], "running");
    assert_eq!(h.adapter.submissions(), vec![job_id.to_string()]);

    let record = h.record(job_id).await.expect("record");
    assert_eq!(record.execution_handle, Some(ScriptedAdapter::handle_for(job_id)));
    assert_eq!(record.payment.map(|p| p.tx_hash), Some("ab12cd34".to_string()));
}

#[tokio::test]
async fn underpayment_is_mismatched_and_job_keeps_waiting() {
    let h = build_harness(test_config(true));
    let job = start_job(&h, json!({"text": "hello"})).await;

    let (status, body) = post_evidence(&h, &evidence_request(&job, 1)).await;

    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body["verdict"], "mismatched");
    assert_eq!(body["reason"], "paid amounts do not cover the quoted price");
    assert_eq!(body["status"], "awaiting payment");
    assert!(h.adapter.submissions().is_empty());
}

#[tokio::test]
async fn late_payment_forces_failure_regardless_of_evidence() {
    let h = build_harness(test_config(true));
    let job = start_job(&h, json!({"text": "hello"})).await;
    let job_id = job["job_id"].as_str().expect("job_id");
    let deadline = job["submitResultTime"].as_i64().expect("deadline");
    h.clock.set(deadline + 1);

    let (status, body) = post_evidence(&h, &evidence_request(&job, 10_000_000)).await;

    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body["verdict"], "expired");
    assert_eq!(body["status"], "failed");
    assert!(h.adapter.submissions().is_empty());

    let (_, body) = get_json(&h.app, &format!("/status?job_id={job_id}")).await;
    assert_eq!(body["status"], "failed");
    assert!(
        body["message"]
            .as_str()
            .expect("message")
            .contains("payment deadline expired")
    );
}

#[tokio::test]
async fn sweep_expires_unpaid_jobs_after_deadline() {
    let h = build_harness(test_config(true));
    let job = start_job(&h, json!({"text": "hello"})).await;
    let job_id = job["job_id"].as_str().expect("job_id");
    let deadline = job["submitResultTime"].as_i64().expect("deadline");

    h.clock.set(deadline);
    let report = sweep_once(&h.orchestrator).await.expect("sweep");
    assert_eq!(report.failed, 0);

    h.clock.set(deadline + 1);
    let report = sweep_once(&h.orchestrator).await.expect("sweep");
    assert_eq!(report.failed, 1);

    let record = h.record(job_id).await.expect("record");
    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.error_detail.expect("detail").contains("payment deadline expired"));
}

#[tokio::test]
async fn provide_input_resumes_job_waiting_for_input() {
    let h = build_harness(test_config(true));
    let job_id = paid_job_awaiting_input(&h).await;

    let uri = format!("/status?job_id={job_id}");
    let (_, body) = get_json(&h.app, &uri).await;
    assert_eq!(body["status"], "awaiting input");
    assert_eq!(body["message"], "choose an option");

    let (status, body) = post_json(
        &h.app,
        "/provide_input",
        json!({"job_id": job_id, "input_data": [{"key": "option", "value": "fast"}]}),
    )
    .await;
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body, json!({"status": "success"}));

    let (_, body) = get_json(&h.app, &uri).await;
    assert_eq!(body["status"], "running");

    let record = h.record(&job_id).await.expect("record");
    assert_eq!(record.input_data.get("text"), Some(&json!("hello")));
    assert_eq!(record.input_data.get("option"), Some(&json!("fast")));
    let forwarded = h.adapter.inputs();
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].0, ScriptedAdapter::handle_for(&job_id));
}

#[tokio::test]
async fn provide_input_outside_awaiting_input_leaves_job_untouched() {
    let h = build_harness(test_config(true));
    let job = start_job(&h, json!({"text": "hello"})).await;
    let job_id = job["job_id"].as_str().expect("job_id");
    let before = h.record(job_id).await.expect("record");

    let (status, body) = post_json(
        &h.app,
        "/provide_input",
        json!({"job_id": job_id, "input_data": [{"key": "option", "value": "fast"}]}),
    )
    .await;

    assert_eq!(status, http::StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_STATE");
    assert_eq!(h.record(job_id).await.expect("record"), before);
}

#[tokio::test]
async fn provide_input_rejects_invalid_fields_and_unknown_jobs() {
    let h = build_harness(test_config(true));
    let job_id = paid_job_awaiting_input(&h).await;

    let (status, body) = post_json(
        &h.app,
        "/provide_input",
        json!({"job_id": job_id, "input_data": [{"key": "option", "value": 7}]}),
    )
    .await;
    assert_eq!(status, http::StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_INPUT");
    assert_eq!(
        h.record(&job_id).await.expect("record").status,
        JobStatus::AwaitingInput
    );

    let (status, _) = post_json(
        &h.app,
        "/provide_input",
        json!({"job_id": "missing", "input_data": [{"key": "option", "value": "fast"}]}),
    )
    .await;
    assert_eq!(status, http::StatusCode::NOT_FOUND);

    let (status, _) = post_json(&h.app, "/provide_input", json!({"job_id": job_id})).await;
    assert_eq!(status, http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn payment_hook_requires_signature_when_enabled() {
    let mut config = test_config(true);
    config.internal_auth_enabled = true;
    config.internal_auth_secret = Some("hook-secret".to_string());
    let h = build_harness(config);
    let job = start_job(&h, json!({"text": "hello"})).await;
    let req = evidence_request(&job, 10_000_000);
    let body = serde_json::to_value(&req).expect("serialize");

    let (status, resp) = post_evidence(&h, &req).await;
    assert_eq!(status, http::StatusCode::UNAUTHORIZED);
    assert_eq!(resp["error_code"], "AUTH_MISSING_SIGNATURE");

    let (status, _) = send(
        &h.app,
        "POST",
        "/payment_evidence",
        Some(body.clone()),
        &[("x-internal-signature", "deadbeef")],
    )
    .await;
    assert_eq!(status, http::StatusCode::UNAUTHORIZED);

    let canonical = serde_json::to_string(&req).expect("canonical");
    let signature = sign_internal_payload(&canonical, "hook-secret");
    let (status, resp) = send(
        &h.app,
        "POST",
        "/payment_evidence",
        Some(body),
        &[("x-internal-signature", signature.as_str())],
    )
    .await;
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(resp["verdict"], "matched");
}

#[tokio::test]
async fn availability_tracks_backend_health() {
    let h = build_harness(test_config(false));

    let (status, body) = get_json(&h.app, "/availability").await;
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body["status"], "available");

    h.adapter.set_healthy(false);
    let (status, body) = get_json(&h.app, "/availability").await;
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body["status"], "unavailable");
    assert!(
        body["message"]
            .as_str()
            .expect("message")
            .contains("scripted outage")
    );
}

#[tokio::test]
async fn input_schema_lists_declared_fields() {
    let h = build_harness(test_config(false));
    let (status, body) = get_json(&h.app, "/input_schema").await;
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "input_data": [
                {"key": "text", "value": "string"},
                {"key": "option", "value": "string", "optional": true}
            ]
        })
    );
}

#[tokio::test]
async fn health_reports_configuration_and_counters() {
    let h = build_harness(test_config(true));
    start_job(&h, json!({"text": "hello"})).await;

    let (status, body) = get_json(&h.app, "/health").await;
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["payment_required"], true);
    assert!(body["metrics"]["jobs_created"].as_u64().expect("counter") >= 1);
}

#[tokio::test]
async fn provide_input_before_the_backend_resumes_merges_in_arrival_order() {
    let h = build_harness(test_config(true));
    let job_id = paid_job_awaiting_input(&h).await;
    h.adapter.hold_inputs();

    let first = {
        let orchestrator = h.orchestrator.clone();
        let job_id = job_id.clone();
        tokio::spawn(async move { orchestrator.provide_input(&job_id, option("fast")).await })
    };
    h.wait_for_forwards(1).await;
    let second = {
        let orchestrator = h.orchestrator.clone();
        let job_id = job_id.clone();
        tokio::spawn(async move { orchestrator.provide_input(&job_id, option("slow")).await })
    };
    h.wait_for_forwards(2).await;
    assert_eq!(
        h.record(&job_id).await.expect("record").status,
        JobStatus::AwaitingInput
    );

    h.adapter.release_inputs();
    first.await.expect("join").expect("first call");
    second.await.expect("join").expect("second call");

    let record = h.record(&job_id).await.expect("record");
    assert_eq!(record.status, JobStatus::Running);
    assert_eq!(record.input_data.get("option"), Some(&json!("slow")));
    assert!(record.pending_input.is_empty());
    let forwarded = h.adapter.inputs();
    assert_eq!(forwarded[0].1.get("option"), Some(&json!("fast")));
    assert_eq!(
        forwarded.last().and_then(|(_, input)| input.get("option")),
        Some(&json!("slow"))
    );
}

#[tokio::test]
async fn provide_input_after_the_backend_resumed_is_rejected() {
    let h = build_harness(test_config(true));
    let job_id = paid_job_awaiting_input(&h).await;

    h.orchestrator
        .provide_input(&job_id, option("fast"))
        .await
        .expect("first call");
    let before = h.record(&job_id).await.expect("record");
    let err = h
        .orchestrator
        .provide_input(&job_id, option("slow"))
        .await
        .expect_err("job already running");

    assert!(err.to_string().contains("running"), "{err}");
    assert_eq!(h.record(&job_id).await.expect("record"), before);
    assert_eq!(h.adapter.inputs().len(), 1);
}

#[tokio::test]
async fn deferred_input_is_redelivered_by_a_later_sweep() {
    let h = build_harness(test_config(true));
    let job_id = paid_job_awaiting_input(&h).await;
    h.adapter.set_inputs_unavailable(true);

    let (status, body) = post_json(
        &h.app,
        "/provide_input",
        json!({"job_id": job_id, "input_data": [{"key": "option", "value": "fast"}]}),
    )
    .await;
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body, json!({"status": "success"}));
    let queued = h.record(&job_id).await.expect("record");
    assert_eq!(queued.status, JobStatus::AwaitingInput);
    assert_eq!(queued.pending_input.get("option"), Some(&json!("fast")));

    h.adapter.set_inputs_unavailable(false);
    sweep_once(&h.orchestrator).await.expect("sweep");
    assert_eq!(
        h.record(&job_id).await.expect("record").status,
        JobStatus::AwaitingInput
    );

    h.clock.set(START_TS + 30);
    sweep_once(&h.orchestrator).await.expect("sweep");
    let record = h.record(&job_id).await.expect("record");
    assert_eq!(record.status, JobStatus::Running);
    assert!(record.pending_input.is_empty());
    assert_eq!(h.adapter.inputs().len(), 1);
}

#[tokio::test]
async fn second_payer_is_turned_away_after_confirmation() {
    let h = build_harness(test_config(true));
    let job = start_job(&h, json!({"text": "hello"})).await;
    let job_id = job["job_id"].as_str().expect("job_id");
    let (_, body) = post_evidence(&h, &evidence_request(&job, 10_000_000)).await;
    assert_eq!(body["verdict"], "matched");

    let mut other = evidence_request(&job, 10_000_000);
    other.evidence.tx_hash = "ffee99".to_string();
    let (status, body) = post_evidence(&h, &other).await;

    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body["verdict"], "mismatched");
    let record = h.record(job_id).await.expect("record");
    assert_eq!(record.payment.expect("payment").tx_hash, "ab12cd34");
    assert_eq!(h.adapter.submissions().len(), 1);
}

#[tokio::test]
async fn repeated_evidence_submits_a_paid_job_that_never_got_a_handle() {
    let h = build_harness(test_config(true));
    let (job, job_id) = paid_job_without_handle(&h).await;

    let (status, body) = post_evidence(&h, &evidence_request(&job, 10_000_000)).await;

    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body["verdict"], "matched");
    assert_eq!(body["status"], "running");
    assert_eq!(h.adapter.submissions(), vec![job_id.clone()]);
    let record = h.record(&job_id).await.expect("record");
    assert_eq!(
        record.execution_handle,
        Some(ScriptedAdapter::handle_for(&job_id))
    );
}

#[tokio::test]
async fn sweep_submits_a_stalled_paid_job_after_the_grace_period() {
    let h = build_harness(test_config(true));
    let (_, job_id) = paid_job_without_handle(&h).await;

    sweep_once(&h.orchestrator).await.expect("sweep");
    assert!(h.adapter.submissions().is_empty());

    h.clock.set(START_TS + 30);
    sweep_once(&h.orchestrator).await.expect("sweep");
    assert_eq!(h.adapter.submissions(), vec![job_id.clone()]);
    let record = h.record(&job_id).await.expect("record");
    assert_eq!(record.status, JobStatus::Running);
    assert!(record.execution_handle.is_some());
}
