//! Job operations and their dispatch.
//!
//! Every state change of a job goes through [`JobProcessor::execute`]. The
//! operation set is closed: a [`WorkerRequest`] names one [`JobOperation`]
//! and the processor matches on it exhaustively.

pub mod invoker;
mod notify;
mod operations;

use std::{fmt, sync::Arc};

use mediaflow_model::{Job, JobId, Notification, ProblemDetail, Tracker};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::{
    data_controller::DataController, error::Result,
    resource_manager::ResourceManager,
};

pub use invoker::{HttpWorkerInvoker, LocalWorkerInvoker, WorkerInvoker};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "operationName",
    content = "input",
    rename_all_fields = "camelCase"
)]
pub enum JobOperation {
    StartJob {
        job_id: JobId,
    },
    CancelJob {
        job_id: JobId,
    },
    FailJob {
        job_id: JobId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ProblemDetail>,
    },
    RestartJob {
        job_id: JobId,
    },
    DeleteJob {
        job_id: JobId,
    },
    ProcessNotification {
        job_id: JobId,
        notification: Notification,
    },
}

impl JobOperation {
    pub fn name(&self) -> &'static str {
        match self {
            JobOperation::StartJob { .. } => "StartJob",
            JobOperation::CancelJob { .. } => "CancelJob",
            JobOperation::FailJob { .. } => "FailJob",
            JobOperation::RestartJob { .. } => "RestartJob",
            JobOperation::DeleteJob { .. } => "DeleteJob",
            JobOperation::ProcessNotification { .. } => "ProcessNotification",
        }
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            JobOperation::StartJob { job_id }
            | JobOperation::CancelJob { job_id }
            | JobOperation::FailJob { job_id, .. }
            | JobOperation::RestartJob { job_id }
            | JobOperation::DeleteJob { job_id }
            | JobOperation::ProcessNotification { job_id, .. } => job_id,
        }
    }
}

/// Envelope handed to a worker: one operation plus ambient request context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    #[serde(flatten)]
    pub operation: JobOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker: Option<Tracker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_endpoint: Option<String>,
    /// Identity of this unit of work; it is also the mutex holder.
    #[serde(default = "new_request_id")]
    pub request_id: String,
}

fn new_request_id() -> String {
    Uuid::now_v7().to_string()
}

impl WorkerRequest {
    pub fn new(operation: JobOperation) -> Self {
        Self {
            operation,
            tracker: None,
            notification_endpoint: None,
            request_id: new_request_id(),
        }
    }

    pub fn with_tracker(mut self, tracker: Option<Tracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_notification_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.notification_endpoint = endpoint;
        self
    }
}

/// What an operation did to the job.
#[derive(Clone, Debug, PartialEq)]
pub enum OperationOutcome {
    /// The job changed and the new state was persisted.
    Updated(Job),
    /// Nothing to do; the job is returned as found.
    Unchanged(Job),
    Deleted(JobId),
}

impl OperationOutcome {
    pub fn job(&self) -> Option<&Job> {
        match self {
            OperationOutcome::Updated(job) | OperationOutcome::Unchanged(job) => Some(job),
            OperationOutcome::Deleted(_) => None,
        }
    }
}

/// Ambient context an operation runs with.
#[derive(Clone, Debug)]
pub(crate) struct OperationContext {
    pub request_id: String,
    pub notification_endpoint: Option<String>,
}

#[derive(Clone)]
pub struct JobProcessor {
    data: DataController,
    resources: Arc<dyn ResourceManager>,
}

impl fmt::Debug for JobProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobProcessor")
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

impl JobProcessor {
    pub fn new(data: DataController, resources: Arc<dyn ResourceManager>) -> Self {
        Self { data, resources }
    }

    pub fn data(&self) -> &DataController {
        &self.data
    }

    /// Runs one operation under the job's mutex.
    pub async fn execute(&self, request: WorkerRequest) -> Result<OperationOutcome> {
        let WorkerRequest {
            operation,
            tracker,
            notification_endpoint,
            request_id,
        } = request;

        let span = info_span!(
            "job_operation",
            operation = operation.name(),
            job_id = %operation.job_id(),
            tracker = tracker.as_ref().map(|t| t.id.as_str()).unwrap_or(""),
            request_id = %request_id,
        );
        let ctx = OperationContext {
            request_id,
            notification_endpoint,
        };

        async move {
            let name = operation.name();
            let result = match operation {
                JobOperation::StartJob { job_id } => self.start_job(&ctx, &job_id).await,
                JobOperation::CancelJob { job_id } => self.cancel_job(&ctx, &job_id).await,
                JobOperation::FailJob {
                    job_id,
                    reason,
                    error,
                } => self.fail_job(&ctx, &job_id, reason, error).await,
                JobOperation::RestartJob { job_id } => {
                    self.restart_job(&ctx, &job_id).await
                }
                JobOperation::DeleteJob { job_id } => self.delete_job(&ctx, &job_id).await,
                JobOperation::ProcessNotification {
                    job_id,
                    notification,
                } => {
                    self.process_notification(&ctx, &job_id, notification)
                        .await
                }
            };

            match &result {
                Ok(outcome) => info!(
                    operation = name,
                    status = outcome.job().map(|job| job.status.as_str()).unwrap_or("Deleted"),
                    "job operation finished"
                ),
                Err(err) => warn!(
                    operation = name,
                    error = %err,
                    retryable = err.is_retryable(),
                    "job operation failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }
}
