use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use mediaflow_core::{JobOperation, JobQuery, WorkerRequest, table::SortOrder};
use mediaflow_model::{
    ExecutionId, Job, JobExecution, JobId, JobStatus, NewJob, ProblemDetail,
    timestamp,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    AppState,
    errors::{AppError, AppResult},
};

const MAX_PAGE_SIZE: usize = 1_000;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListJobsParams {
    pub status: Option<JobStatus>,
    pub from: Option<String>,
    pub to: Option<String>,
    /// `asc` or `desc` (default) on creation time.
    pub order: Option<String>,
    pub page_size: Option<usize>,
    pub page_start_token: Option<String>,
}

impl ListJobsParams {
    fn into_query(self) -> AppResult<JobQuery> {
        let parse = |field: &str, raw: Option<String>| {
            raw.map(|value| {
                timestamp::parse(&value).map_err(|err| {
                    AppError::bad_request(format!("invalid {field} timestamp {value:?}: {err}"))
                })
            })
            .transpose()
        };
        let order = match self.order.as_deref() {
            None | Some("desc") => SortOrder::Descending,
            Some("asc") => SortOrder::Ascending,
            Some(other) => {
                return Err(AppError::bad_request(format!(
                    "invalid order {other:?}; expected asc or desc"
                )));
            }
        };

        Ok(JobQuery {
            status: self.status,
            from: parse("from", self.from)?,
            to: parse("to", self.to)?,
            order,
            page_size: self.page_size.map(|size| size.clamp(1, MAX_PAGE_SIZE)),
            page_start_token: self.page_start_token,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPage {
    pub results: Vec<Job>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_start_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailJobBody {
    pub reason: Option<String>,
    pub error: Option<ProblemDetail>,
}

/// Hands `operation` to the worker and reloads the job afterwards.
async fn run_operation(
    state: &AppState,
    operation: JobOperation,
    tracker_from: Option<&Job>,
) -> AppResult<()> {
    let request = WorkerRequest::new(operation)
        .with_tracker(tracker_from.and_then(|job| job.tracker.clone()));
    state.invoker.invoke(request).await.map_err(AppError::from)
}

pub async fn create_job(
    State(state): State<AppState>,
    Json(submission): Json<NewJob>,
) -> AppResult<(StatusCode, Json<Job>)> {
    let job = state.data.add_job(submission).await?;
    info!(job_id = %job.id, profile = %job.job_profile_id, "job submitted");

    let start = JobOperation::StartJob {
        job_id: job.id.clone(),
    };
    if let Err(err) = run_operation(&state, start, Some(&job)).await {
        // The worker records launch failures on the job itself.
        warn!(job_id = %job.id, error = %err, "job did not start");
    }

    let job = state.data.get_job(&job.id).await?.unwrap_or(job);
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListJobsParams>,
) -> AppResult<Json<JobPage>> {
    let query = params.into_query()?;
    let page = state.data.query_jobs(&query).await?;
    Ok(Json(JobPage {
        results: page.results,
        next_page_start_token: page.next_page_start_token,
    }))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(guid): Path<String>,
) -> AppResult<Json<Job>> {
    let job = state.data.require_job(&state.data.job_id(&guid)).await?;
    Ok(Json(job))
}

pub async fn delete_job(
    State(state): State<AppState>,
    Path(guid): Path<String>,
) -> AppResult<StatusCode> {
    let job = state.data.require_job(&state.data.job_id(&guid)).await?;
    run_operation(
        &state,
        JobOperation::DeleteJob {
            job_id: job.id.clone(),
        },
        Some(&job),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn transition(
    state: AppState,
    guid: &str,
    operation: impl FnOnce(JobId) -> JobOperation,
) -> AppResult<Json<Job>> {
    let job = state.data.require_job(&state.data.job_id(guid)).await?;
    run_operation(&state, operation(job.id.clone()), Some(&job)).await?;
    let job = state.data.require_job(&job.id).await?;
    Ok(Json(job))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(guid): Path<String>,
) -> AppResult<Json<Job>> {
    transition(state, &guid, |job_id| JobOperation::CancelJob { job_id }).await
}

pub async fn restart_job(
    State(state): State<AppState>,
    Path(guid): Path<String>,
) -> AppResult<Json<Job>> {
    transition(state, &guid, |job_id| JobOperation::RestartJob { job_id }).await
}

pub async fn fail_job(
    State(state): State<AppState>,
    Path(guid): Path<String>,
    Json(body): Json<FailJobBody>,
) -> AppResult<Json<Job>> {
    transition(state, &guid, |job_id| JobOperation::FailJob {
        job_id,
        reason: body.reason,
        error: body.error,
    })
    .await
}

pub async fn list_executions(
    State(state): State<AppState>,
    Path(guid): Path<String>,
) -> AppResult<Json<Vec<JobExecution>>> {
    let job = state.data.require_job(&state.data.job_id(&guid)).await?;
    Ok(Json(state.data.list_executions(&job.id).await?))
}

pub async fn get_execution(
    State(state): State<AppState>,
    Path((guid, execution_guid)): Path<(String, String)>,
) -> AppResult<Json<JobExecution>> {
    let job_id = state.data.job_id(&guid);
    let execution_id = ExecutionId::new(format!("{job_id}/executions/{execution_guid}"));
    state
        .data
        .get_execution(&job_id, &execution_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("job execution not found: {execution_id}")))
}
