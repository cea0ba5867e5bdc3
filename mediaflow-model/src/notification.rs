use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::job::{Job, JobParameterBag, JobStatus, ProblemDetail};

/// Asynchronous status update, either posted by the processor to a caller's
/// endpoint or received from a backend service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Id of the resource the update is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub content: Value,
}

impl Notification {
    pub fn new(source: impl Into<String>, content: Value) -> Self {
        Self {
            source: Some(source.into()),
            content,
        }
    }

    /// Snapshot of a job as delivered to its notification endpoint.
    pub fn for_job(job: &Job) -> serde_json::Result<Self> {
        Ok(Self::new(job.id.as_str(), serde_json::to_value(job)?))
    }

    /// Interprets the content as a backend status report, if it has that shape.
    pub fn status_report(&self) -> Option<StatusReport> {
        serde_json::from_value(self.content.clone()).ok()
    }
}

/// The subset of a job assignment a backend reports back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: JobStatus,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub error: Option<ProblemDetail>,
    #[serde(default, deserialize_with = "crate::progress::deserialize")]
    pub progress: Option<u8>,
    #[serde(default)]
    pub job_output: Option<JobParameterBag>,
}
