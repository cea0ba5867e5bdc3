use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable, URL-like identifier of a job (`{publicUrl}/jobs/{guid}`).
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh id rooted at the processor's public URL.
    pub fn generate(public_url: &str) -> Self {
        Self::for_guid(public_url, &Uuid::new_v4().to_string())
    }

    pub fn for_guid(public_url: &str, guid: &str) -> Self {
        Self(format!("{}/jobs/{}", public_url.trim_end_matches('/'), guid))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trailing path segment; bare ids such as `job-1` are their own guid.
    pub fn guid(&self) -> &str {
        self.0
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(self.0.as_str())
    }

    /// Mint an id for a new execution nested under this job.
    pub fn new_execution_id(&self) -> ExecutionId {
        ExecutionId(format!(
            "{}/executions/{}",
            self.0.trim_end_matches('/'),
            Uuid::new_v4()
        ))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of one execution attempt (`{jobId}/executions/{guid}`).
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn guid(&self) -> &str {
        self.0
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(self.0.as_str())
    }

    /// Callback URL a backend service posts assignment updates to.
    pub fn notification_endpoint(&self) -> String {
        format!("{}/notifications", self.0.trim_end_matches('/'))
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
