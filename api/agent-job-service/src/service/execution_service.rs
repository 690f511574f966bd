use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Still working. `partial` carries a pre-result to surface while running.
    Running { partial: Option<Value> },
    NeedsInput { prompt: Option<String> },
    Completed { output: Value },
    Failed { error: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("execution backend unavailable: {0}")]
    Unavailable(String),

    #[error("execution backend rejected request: {0}")]
    Rejected(String),

    #[error("unknown execution handle: {0}")]
    UnknownHandle(String),
}

impl AdapterError {
    /// Transient errors leave the job untouched for the next sweep.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Opaque task-performing backend.
#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    async fn submit(&self, job_id: &str, input: &Map<String, Value>) -> Result<String, AdapterError>;

    async fn poll_result(&self, handle: &str) -> Result<PollOutcome, AdapterError>;

    async fn provide_input(
        &self,
        handle: &str,
        input: &Map<String, Value>,
    ) -> Result<(), AdapterError>;

    async fn cancel(&self, handle: &str) -> Result<(), AdapterError>;

    /// Called once the job's terminal outcome is stored; the backend may forget the task.
    async fn release(&self, _handle: &str) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn health(&self) -> Result<(), AdapterError>;
}

#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub job_id: String,
    pub input: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(Value),
    Failed(String),
    NeedsInput(Option<String>),
}

pub type TaskHandler = Arc<dyn Fn(TaskRequest) -> BoxFuture<'static, TaskOutcome> + Send + Sync>;

/// Built-in task for the `local` backend: the job result is the validated input document.
pub fn echo_handler() -> TaskHandler {
    Arc::new(|req: TaskRequest| {
        Box::pin(async move { TaskOutcome::Completed(Value::Object(req.input)) })
    })
}

enum TaskSlot {
    Running {
        job_id: String,
        input: Map<String, Value>,
        abort: Option<AbortHandle>,
    },
    NeedsInput {
        job_id: String,
        input: Map<String, Value>,
        prompt: Option<String>,
    },
    Finished(PollOutcome),
}

/// Runs task handlers on the tokio runtime, at most `concurrency` at a time.
#[derive(Clone)]
pub struct LocalWorkerAdapter {
    handler: TaskHandler,
    permits: Arc<Semaphore>,
    tasks: Arc<Mutex<HashMap<String, TaskSlot>>>,
}

impl LocalWorkerAdapter {
    pub fn new(handler: TaskHandler, concurrency: usize) -> Self {
        Self {
            handler,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock_tasks(&self) -> Result<MutexGuard<'_, HashMap<String, TaskSlot>>, AdapterError> {
        self.tasks
            .lock()
            .map_err(|_| AdapterError::Unavailable("local task table poisoned".to_string()))
    }

    fn spawn_task(&self, handle: &str, job_id: String, input: Map<String, Value>) {
        let worker = self.clone();
        let task_handle = handle.to_string();
        let request = TaskRequest { job_id, input };
        let join = tokio::spawn(async move {
            let Ok(_permit) = worker.permits.clone().acquire_owned().await else {
                warn!(handle = %task_handle, "local worker pool closed");
                return;
            };
            let outcome = (worker.handler)(request.clone()).await;
            worker.finish(&task_handle, request, outcome);
        });
        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(TaskSlot::Running { abort, .. }) = tasks.get_mut(handle) {
                *abort = Some(join.abort_handle());
            }
        }
    }

    fn finish(&self, handle: &str, request: TaskRequest, outcome: TaskOutcome) {
        let Ok(mut tasks) = self.tasks.lock() else {
            return;
        };
        if !matches!(tasks.get(handle), Some(TaskSlot::Running { .. })) {
            return;
        }
        debug!(handle = %handle, job_id = %request.job_id, "local task finished");
        let slot = match outcome {
            TaskOutcome::Completed(output) => TaskSlot::Finished(PollOutcome::Completed { output }),
            TaskOutcome::Failed(error) => TaskSlot::Finished(PollOutcome::Failed { error }),
            TaskOutcome::NeedsInput(prompt) => TaskSlot::NeedsInput {
                job_id: request.job_id,
                input: request.input,
                prompt,
            },
        };
        tasks.insert(handle.to_string(), slot);
    }
}

#[async_trait]
impl ExecutionAdapter for LocalWorkerAdapter {
    async fn submit(&self, job_id: &str, input: &Map<String, Value>) -> Result<String, AdapterError> {
        let handle = format!("local-{}", Uuid::new_v4());
        self.lock_tasks()?.insert(
            handle.clone(),
            TaskSlot::Running {
                job_id: job_id.to_string(),
                input: input.clone(),
                abort: None,
            },
        );
        self.spawn_task(&handle, job_id.to_string(), input.clone());
        Ok(handle)
    }

    async fn poll_result(&self, handle: &str) -> Result<PollOutcome, AdapterError> {
        let tasks = self.lock_tasks()?;
        match tasks.get(handle) {
            Some(TaskSlot::Running { .. }) => Ok(PollOutcome::Running { partial: None }),
            Some(TaskSlot::NeedsInput { prompt, .. }) => Ok(PollOutcome::NeedsInput {
                prompt: prompt.clone(),
            }),
            Some(TaskSlot::Finished(outcome)) => Ok(outcome.clone()),
            None => Err(AdapterError::UnknownHandle(handle.to_string())),
        }
    }

    async fn provide_input(
        &self,
        handle: &str,
        input: &Map<String, Value>,
    ) -> Result<(), AdapterError> {
        let (job_id, merged) = {
            let mut tasks = self.lock_tasks()?;
            let Some(TaskSlot::NeedsInput {
                job_id,
                input: existing,
                ..
            }) = tasks.get(handle)
            else {
                return Err(AdapterError::Rejected(format!(
                    "task {handle} is not waiting for input"
                )));
            };
            let job_id = job_id.clone();
            let mut merged = existing.clone();
            for (key, value) in input {
                merged.insert(key.clone(), value.clone());
            }
            tasks.insert(
                handle.to_string(),
                TaskSlot::Running {
                    job_id: job_id.clone(),
                    input: merged.clone(),
                    abort: None,
                },
            );
            (job_id, merged)
        };
        self.spawn_task(handle, job_id, merged);
        Ok(())
    }

    async fn cancel(&self, handle: &str) -> Result<(), AdapterError> {
        let slot = self
            .lock_tasks()?
            .remove(handle)
            .ok_or_else(|| AdapterError::UnknownHandle(handle.to_string()))?;
        if let TaskSlot::Running {
            abort: Some(abort), ..
        } = slot
        {
            abort.abort();
        }
        Ok(())
    }

    async fn release(&self, handle: &str) -> Result<(), AdapterError> {
        let mut tasks = self.lock_tasks()?;
        if matches!(tasks.get(handle), Some(TaskSlot::Finished(_))) {
            tasks.remove(handle);
        }
        Ok(())
    }

    async fn health(&self) -> Result<(), AdapterError> {
        if self.permits.is_closed() {
            return Err(AdapterError::Unavailable(
                "local worker pool closed".to_string(),
            ));
        }
        self.lock_tasks().map(|_| ())
    }
}
