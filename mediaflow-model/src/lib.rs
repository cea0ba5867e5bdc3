//! Core data model definitions shared across Mediaflow crates.
#![allow(missing_docs)]

pub mod error;
pub mod execution;
pub mod ids;
pub mod job;
pub mod notification;
pub mod progress;
pub mod resources;
pub mod timestamp;

// Intentionally curated re-exports for downstream consumers.
pub use error::{ModelError, Result as ModelResult};
pub use execution::JobExecution;
pub use ids::{ExecutionId, JobId};
pub use job::{
    ALL_JOB_STATUSES, Job, JobParameterBag, JobStatus, JobType, NewJob,
    ProblemDetail, TERMINAL_JOB_STATUSES, Tracker,
};
pub use notification::{Notification, StatusReport};
pub use resources::{
    JobAssignment, JobParameter, JobProfile, Resource, ResourceEndpoint,
    Service,
};
