//! Remote resources the processor reads from or creates on other services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    job::{JobParameterBag, JobStatus, JobType, ProblemDetail, Tracker},
    timestamp,
};

/// A typed resource exchanged with the resource manager.
pub trait Resource: Serialize + DeserializeOwned + Send + Sync {
    /// Registry name used to discover the endpoint serving this type.
    const RESOURCE_TYPE: &'static str;

    fn id(&self) -> Option<&str>;
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEndpoint {
    pub resource_type: String,
    pub http_endpoint: String,
}

/// Backend service registration.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_type: Option<JobType>,
    #[serde(default)]
    pub job_profile_ids: Vec<String>,
    #[serde(default)]
    pub resources: Vec<ResourceEndpoint>,
}

impl Service {
    /// True when the service advertises the profile and, if it declares a
    /// job type, that type matches.
    pub fn supports(&self, job_profile_id: &str, job_type: &JobType) -> bool {
        let type_matches = self
            .job_type
            .as_ref()
            .is_none_or(|declared| declared == job_type);
        type_matches && self.job_profile_ids.iter().any(|id| id == job_profile_id)
    }

    pub fn endpoint_for(&self, resource_type: &str) -> Option<&str> {
        self.resources
            .iter()
            .find(|endpoint| endpoint.resource_type == resource_type)
            .map(|endpoint| endpoint.http_endpoint.as_str())
    }

    pub fn job_assignment_endpoint(&self) -> Option<&str> {
        self.endpoint_for(JobAssignment::RESOURCE_TYPE)
    }
}

impl Resource for Service {
    const RESOURCE_TYPE: &'static str = "Service";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobParameter {
    pub parameter_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_type: Option<String>,
}

/// Named capability descriptor that routes a job to a service.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub input_parameters: Vec<JobParameter>,
    #[serde(default)]
    pub output_parameters: Vec<JobParameter>,
    #[serde(default)]
    pub optional_input_parameters: Vec<JobParameter>,
}

impl JobProfile {
    /// Required input parameters missing from `input`.
    pub fn missing_inputs<'a>(&'a self, input: &JobParameterBag) -> Vec<&'a str> {
        self.input_parameters
            .iter()
            .filter(|param| !input.contains_key(&param.parameter_name))
            .map(|param| param.parameter_name.as_str())
            .collect()
    }
}

impl Resource for JobProfile {
    const RESOURCE_TYPE: &'static str = "JobProfile";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// Work item created on a backend service for one job execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAssignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub job_id: String,
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker: Option<Tracker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_endpoint: Option<String>,
    #[serde(
        default,
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_created: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_modified: Option<DateTime<Utc>>,
}

impl JobAssignment {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            id: None,
            job_id: job_id.into(),
            status: JobStatus::New,
            status_message: None,
            error: None,
            progress: None,
            job_output: JobParameterBag::new(),
            tracker: None,
            notification_endpoint: None,
            date_created: None,
            date_modified: None,
        }
    }
}

impl Resource for JobAssignment {
    const RESOURCE_TYPE: &'static str = "JobAssignment";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}
