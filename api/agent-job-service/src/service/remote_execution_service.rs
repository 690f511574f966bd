use crate::service::execution_service::{AdapterError, ExecutionAdapter, PollOutcome};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SubmitTaskRequest<'a> {
    job_id: &'a str,
    input_data: &'a Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct SubmitTaskResponse {
    handle: String,
}

#[derive(Debug, Serialize)]
struct TaskInputRequest<'a> {
    input_data: &'a Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RemoteTaskState {
    Queued,
    Running,
    AwaitingInput,
    Completed,
    Failed,
}

#[derive(Debug, Deserialize)]
struct TaskStatusResponse {
    status: RemoteTaskState,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Execution backend reached over HTTP. The remote queue owns scheduling and concurrency.
#[derive(Debug, Clone)]
pub struct RemoteTaskAdapter {
    base_url: String,
    client: Client,
}

impl RemoteTaskAdapter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("failed to build http client: {e}"))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn check_status(resp: Response, handle: Option<&str>) -> Result<Response, AdapterError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    match (status, handle) {
        (StatusCode::NOT_FOUND, Some(handle)) => Err(AdapterError::UnknownHandle(handle.to_string())),
        (s, _) if s.is_server_error() => Err(AdapterError::Unavailable(format!(
            "task queue returned {s}: {body}"
        ))),
        (s, _) => Err(AdapterError::Rejected(format!(
            "task queue returned {s}: {body}"
        ))),
    }
}

fn transport_error(e: reqwest::Error) -> AdapterError {
    AdapterError::Unavailable(format!("task queue request failed: {e}"))
}

#[async_trait]
impl ExecutionAdapter for RemoteTaskAdapter {
    async fn submit(&self, job_id: &str, input: &Map<String, Value>) -> Result<String, AdapterError> {
        let resp = self
            .client
            .post(self.endpoint("/tasks"))
            .json(&SubmitTaskRequest {
                job_id,
                input_data: input,
            })
            .send()
            .await
            .map_err(transport_error)?;
        let payload = check_status(resp, None)
            .await?
            .json::<SubmitTaskResponse>()
            .await
            .map_err(|e| AdapterError::Rejected(format!("failed to parse submit payload: {e}")))?;
        if payload.handle.trim().is_empty() {
            return Err(AdapterError::Rejected(
                "task queue returned an empty handle".to_string(),
            ));
        }
        Ok(payload.handle)
    }

    async fn poll_result(&self, handle: &str) -> Result<PollOutcome, AdapterError> {
        let resp = self
            .client
            .get(self.endpoint(&format!("/tasks/{handle}")))
            .send()
            .await
            .map_err(transport_error)?;
        let payload = check_status(resp, Some(handle))
            .await?
            .json::<TaskStatusResponse>()
            .await
            .map_err(|e| AdapterError::Unavailable(format!("failed to parse task payload: {e}")))?;

        Ok(match payload.status {
            RemoteTaskState::Queued | RemoteTaskState::Running => PollOutcome::Running {
                partial: payload.result,
            },
            RemoteTaskState::AwaitingInput => PollOutcome::NeedsInput {
                prompt: payload.message,
            },
            RemoteTaskState::Completed => PollOutcome::Completed {
                output: payload.result.unwrap_or(Value::Null),
            },
            RemoteTaskState::Failed => PollOutcome::Failed {
                error: payload
                    .error
                    .or(payload.message)
                    .unwrap_or_else(|| "remote task failed".to_string()),
            },
        })
    }

    async fn provide_input(
        &self,
        handle: &str,
        input: &Map<String, Value>,
    ) -> Result<(), AdapterError> {
        let resp = self
            .client
            .post(self.endpoint(&format!("/tasks/{handle}/input")))
            .json(&TaskInputRequest { input_data: input })
            .send()
            .await
            .map_err(transport_error)?;
        check_status(resp, Some(handle)).await.map(|_| ())
    }

    async fn cancel(&self, handle: &str) -> Result<(), AdapterError> {
        let resp = self
            .client
            .post(self.endpoint(&format!("/tasks/{handle}/cancel")))
            .send()
            .await
            .map_err(transport_error)?;
        check_status(resp, Some(handle)).await.map(|_| ())
    }

    async fn health(&self) -> Result<(), AdapterError> {
        let resp = self
            .client
            .get(self.endpoint("/health"))
            .send()
            .await
            .map_err(transport_error)?;
        match check_status(resp, None).await {
            Ok(_) => Ok(()),
            Err(AdapterError::Rejected(reason)) => Err(AdapterError::Unavailable(reason)),
            Err(other) => Err(other),
        }
    }
}
