use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use mediaflow_core::{JobOperation, OperationOutcome, WorkerRequest};
use mediaflow_model::{Job, JobId, Notification};
use serde::Serialize;
use tracing::debug;

use crate::{AppState, errors::AppResult};

/// Result of one worker invocation as reported over HTTP.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OutcomeBody {
    Updated { job: Job },
    Unchanged { job: Job },
    Deleted { job_id: JobId },
}

impl From<OperationOutcome> for OutcomeBody {
    fn from(outcome: OperationOutcome) -> Self {
        match outcome {
            OperationOutcome::Updated(job) => OutcomeBody::Updated { job },
            OperationOutcome::Unchanged(job) => OutcomeBody::Unchanged { job },
            OperationOutcome::Deleted(job_id) => OutcomeBody::Deleted { job_id },
        }
    }
}

/// Runs a [`WorkerRequest`] in this process. Remote invokers post here.
pub async fn execute(
    State(state): State<AppState>,
    Json(request): Json<WorkerRequest>,
) -> AppResult<Json<OutcomeBody>> {
    let outcome = state.processor.execute(request).await?;
    Ok(Json(outcome.into()))
}

/// Callback backends post assignment updates to.
pub async fn receive_notification(
    State(state): State<AppState>,
    Path((guid, execution_guid)): Path<(String, String)>,
    Json(notification): Json<Notification>,
) -> AppResult<StatusCode> {
    let job_id = state.data.job_id(&guid);
    debug!(
        job_id = %job_id,
        execution = %execution_guid,
        source = ?notification.source,
        "backend notification received"
    );

    let request = WorkerRequest::new(JobOperation::ProcessNotification {
        job_id,
        notification,
    });
    state.invoker.invoke(request).await?;
    Ok(StatusCode::ACCEPTED)
}
