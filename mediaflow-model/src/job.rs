use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};
use uuid::Uuid;

use crate::{
    error::ModelError,
    ids::{ExecutionId, JobId},
    timestamp,
};

/// Opaque parameter bag; the schema belongs to the job profile.
pub type JobParameterBag = serde_json::Map<String, serde_json::Value>;

/// Lifecycle status of a job.
///
/// `New -> Queued -> Scheduled -> Running -> {Completed | Failed | Canceled}`.
/// Terminal states are only left through a restart, which re-enters
/// `Scheduled`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    New,
    Queued,
    Scheduled,
    Running,
    Completed,
    Failed,
    Canceled,
}

pub const ALL_JOB_STATUSES: [JobStatus; 7] = [
    JobStatus::New,
    JobStatus::Queued,
    JobStatus::Scheduled,
    JobStatus::Running,
    JobStatus::Completed,
    JobStatus::Failed,
    JobStatus::Canceled,
];

pub const TERMINAL_JOB_STATUSES: [JobStatus; 3] =
    [JobStatus::Completed, JobStatus::Failed, JobStatus::Canceled];

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled
        )
    }

    /// Statuses a fresh execution may be started from.
    pub fn is_startable(self) -> bool {
        matches!(self, JobStatus::New | JobStatus::Queued)
    }

    /// Statuses a running execution may be replaced from.
    pub fn is_restartable(self) -> bool {
        self.is_terminal() || self == JobStatus::Running
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;

        match (self, next) {
            (New, Queued | Scheduled | Running | Failed | Canceled) => true,
            (Queued, Scheduled | Running | Failed | Canceled) => true,
            (Scheduled, Running | Completed | Failed | Canceled) => true,
            (
                Running,
                Running | Completed | Failed | Canceled | Scheduled,
            ) => true,
            (Completed | Failed | Canceled, Scheduled) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::New => "New",
            JobStatus::Queued => "Queued",
            JobStatus::Scheduled => "Scheduled",
            JobStatus::Running => "Running",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
            JobStatus::Canceled => "Canceled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_JOB_STATUSES
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ModelError::InvalidStatus(s.to_string()))
    }
}

/// Capability tag a job requires from its service.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobType {
    Transform,
    Ai,
    Qa,
    Transfer,
    Workflow,
    Custom(String),
}

impl JobType {
    pub fn as_str(&self) -> &str {
        match self {
            JobType::Transform => "TransformJob",
            JobType::Ai => "AIJob",
            JobType::Qa => "QAJob",
            JobType::Transfer => "TransferJob",
            JobType::Workflow => "WorkflowJob",
            JobType::Custom(name) => name,
        }
    }
}

impl From<String> for JobType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "TransformJob" => JobType::Transform,
            "AIJob" => JobType::Ai,
            "QAJob" => JobType::Qa,
            "TransferJob" => JobType::Transfer,
            "WorkflowJob" => JobType::Workflow,
            _ => JobType::Custom(value),
        }
    }
}

impl From<JobType> for String {
    fn from(value: JobType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Correlation id and label propagated unchanged through a job's pipeline.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tracker {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, String>,
}

impl Tracker {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            label: label.into(),
            custom: BTreeMap::new(),
        }
    }
}

/// Structured failure description attached to failed jobs and executions.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetail {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProblemDetail {
    pub const GENERIC_FAILURE: &'static str =
        "uri://mediaflow/problems/job-processor/generic-failure";
    pub const START_FAILURE: &'static str =
        "uri://mediaflow/problems/job-processor/start-failure";
    pub const EXECUTION_FAILURE: &'static str =
        "uri://mediaflow/problems/job-processor/execution-failure";

    pub fn new(problem_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            problem_type: problem_type.into(),
            title: title.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// One-line rendering used for `statusMessage`.
    pub fn summary(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{}: {}", self.title, detail),
            None => self.title.clone(),
        }
    }
}

/// Submission payload accepted from the API layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub job_profile_id: String,
    #[serde(default)]
    pub job_input: JobParameterBag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker: Option<Tracker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_endpoint: Option<String>,
}

/// Job record persisted by the data controller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProblemDetail>,
    pub job_profile_id: String,
    #[serde(default)]
    pub job_input: JobParameterBag,
    #[serde(default)]
    pub job_output: JobParameterBag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_execution_id: Option<ExecutionId>,
    #[serde(
        default,
        deserialize_with = "crate::progress::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker: Option<Tracker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_endpoint: Option<String>,
    #[serde(with = "timestamp")]
    pub date_created: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub date_modified: DateTime<Utc>,
}

impl Job {
    pub fn new(id: JobId, request: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id,
            job_type: request.job_type,
            status: JobStatus::New,
            status_message: None,
            error: None,
            job_profile_id: request.job_profile_id,
            job_input: request.job_input,
            job_output: JobParameterBag::new(),
            job_execution_id: None,
            progress: None,
            tracker: request.tracker,
            notification_endpoint: request.notification_endpoint,
            date_created: now,
            date_modified: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Clears everything a previous execution reported back.
    pub fn reset_outcome(&mut self) {
        self.status_message = None;
        self.error = None;
        self.progress = None;
        self.job_output = JobParameterBag::new();
    }
}
