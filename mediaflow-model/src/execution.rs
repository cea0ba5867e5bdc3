use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    ids::ExecutionId,
    job::{JobParameterBag, JobStatus, ProblemDetail},
    timestamp,
};

/// One attempt at running a job on a backend service.
///
/// A job accumulates one execution per start or restart. Older executions
/// stay in the table for audit until the job itself is deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobExecution {
    pub id: ExecutionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_assignment_id: Option<String>,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProblemDetail>,
    #[serde(
        default,
        deserialize_with = "crate::progress::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub progress: Option<u8>,
    #[serde(default)]
    pub job_output: JobParameterBag,
    #[serde(
        default,
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub actual_start_date: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub actual_end_date: Option<DateTime<Utc>>,
    /// Milliseconds between start and end, once both are known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_duration: Option<i64>,
    #[serde(with = "timestamp")]
    pub date_created: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub date_modified: DateTime<Utc>,
}

impl JobExecution {
    pub fn new(id: ExecutionId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            job_assignment_id: None,
            status: JobStatus::New,
            status_message: None,
            error: None,
            progress: None,
            job_output: JobParameterBag::new(),
            actual_start_date: None,
            actual_end_date: None,
            actual_duration: None,
            date_created: now,
            date_modified: now,
        }
    }

    /// Records the status reported for this attempt, stamping start and end
    /// dates the first time they become known.
    pub fn record_status(&mut self, status: JobStatus, now: DateTime<Utc>) {
        self.status = status;
        self.date_modified = now;

        if matches!(status, JobStatus::Running) && self.actual_start_date.is_none()
        {
            self.actual_start_date = Some(now);
        }

        if status.is_terminal() && self.actual_end_date.is_none() {
            let start = *self.actual_start_date.get_or_insert(now);
            self.actual_end_date = Some(now);
            self.actual_duration = Some((now - start).num_milliseconds());
        }
    }
}
