use std::time::Duration;

use mediaflow_model::JobStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("cannot {operation} job {job_id} while it is {status}")]
    InvalidState {
        job_id: String,
        operation: &'static str,
        status: JobStatus,
    },

    #[error("timed out after {waited:?} waiting for mutex {name}")]
    MutexTimeout { name: String, waited: Duration },

    #[error("no service can run job profile {profile_id}: {reason}")]
    ProfileResolution { profile_id: String, reason: String },

    #[error("job input rejected by profile {profile_id}: {reason}")]
    InvalidInput { profile_id: String, reason: String },

    #[error("backend call to {url} failed: {message}")]
    BackendCall {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProcessorError {
    pub fn job_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "job",
            id: id.into(),
        }
    }

    pub fn backend(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendCall {
            url: url.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Only lock contention is worth retrying; everything else is a verdict.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProcessorError::MutexTimeout { .. })
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for ProcessorError {
    fn from(err: sqlx::Error) -> Self {
        ProcessorError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProcessorError>;
