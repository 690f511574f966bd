use crate::module::agent_job::error::JobError;
use crate::module::agent_job::schema::JobStatus;
use crate::service::metrics_service;
use crate::service::orchestrator_service::JobOrchestrator;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

const SWEPT_STATUSES: [JobStatus; 4] = [
    JobStatus::Pending,
    JobStatus::AwaitingPayment,
    JobStatus::AwaitingInput,
    JobStatus::Running,
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub completed: usize,
    pub failed: usize,
    pub awaiting_input: usize,
}

impl SweepReport {
    pub fn changed(&self) -> usize {
        self.completed + self.failed + self.awaiting_input
    }
}

/// One pass over every live job: enforce payment deadlines, poll running jobs, and retry
/// submissions or input deliveries that stalled. Per-job failures are logged and skipped;
/// only a failed listing aborts the pass.
pub async fn sweep_once(orchestrator: &JobOrchestrator) -> Result<SweepReport, JobError> {
    let mut report = SweepReport::default();
    for status in SWEPT_STATUSES {
        for job_id in orchestrator.list_jobs(status).await? {
            report.scanned += 1;
            let swept = match status {
                JobStatus::Running => orchestrator.poll_adapter(&job_id).await,
                JobStatus::Pending => orchestrator.resubmit_if_stalled(&job_id).await,
                JobStatus::AwaitingInput => orchestrator.redeliver_if_stalled(&job_id).await,
                _ => orchestrator.expire_if_due(&job_id).await,
            };
            let record = match swept {
                Ok(record) => record,
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "sweep skipped job");
                    continue;
                }
            };
            if record.status == status {
                continue;
            }
            match record.status {
                JobStatus::Completed => report.completed += 1,
                JobStatus::Failed => report.failed += 1,
                JobStatus::AwaitingInput => report.awaiting_input += 1,
                _ => {}
            }
        }
    }
    Ok(report)
}

pub async fn run_sweeper(orchestrator: JobOrchestrator, interval: Duration) -> Result<(), String> {
    info!(interval_seconds = interval.as_secs(), "job sweep started");
    loop {
        match sweep_once(&orchestrator).await {
            Ok(report) if report.changed() > 0 => {
                info!(
                    scanned = report.scanned,
                    completed = report.completed,
                    failed = report.failed,
                    awaiting_input = report.awaiting_input,
                    "sweep advanced jobs"
                );
            }
            Ok(_) => {}
            Err(e) => {
                metrics_service::set_last_error_ts(chrono::Utc::now().timestamp());
                warn!(error = %e, "sweep pass failed");
            }
        }
        sleep(interval).await;
    }
}
