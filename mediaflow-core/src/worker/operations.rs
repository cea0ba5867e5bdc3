//! The job state machine. Each operation holds the job's mutex for its whole
//! read-modify-write cycle.

use mediaflow_model::{
    ExecutionId, Job, JobAssignment, JobExecution, JobId, JobProfile,
    JobStatus, Notification, ProblemDetail, Service, timestamp,
};
use tracing::{debug, info, warn};

use super::{JobProcessor, OperationContext, OperationOutcome};
use crate::{
    error::{ProcessorError, Result},
    resource_manager::ResourceManagerExt,
};

/// Execution created on a backend service.
#[derive(Debug)]
struct Launched {
    execution_id: ExecutionId,
    running: bool,
}

fn invalid_state(job: &Job, operation: &'static str) -> ProcessorError {
    ProcessorError::InvalidState {
        job_id: job.id.to_string(),
        operation,
        status: job.status,
    }
}

/// The only place a job's status is assigned outside of construction.
fn transition(job: &mut Job, next: JobStatus, operation: &'static str) -> Result<()> {
    if !job.status.can_transition_to(next) {
        return Err(invalid_state(job, operation));
    }
    job.status = next;
    Ok(())
}

impl JobProcessor {
    pub(super) async fn start_job(
        &self,
        ctx: &OperationContext,
        job_id: &JobId,
    ) -> Result<OperationOutcome> {
        let mutex = self.data.create_mutex(job_id, &ctx.request_id);
        mutex
            .run_locked(async move {
                let mut job = self.data.require_job(job_id).await?;
                if !job.status.is_startable() {
                    return Err(invalid_state(&job, "start"));
                }

                match self.launch_execution(&job).await {
                    Ok(launched) => {
                        transition(&mut job, JobStatus::Scheduled, "start")?;
                        apply_launch(&mut job, launched)?;
                    }
                    Err(err) => return self.abort_launch(ctx, job, err).await,
                }

                let job = self.data.put_job(job).await?;
                self.notify(ctx, &job).await;
                Ok(OperationOutcome::Updated(job))
            })
            .await
    }

    pub(super) async fn cancel_job(
        &self,
        ctx: &OperationContext,
        job_id: &JobId,
    ) -> Result<OperationOutcome> {
        let mutex = self.data.create_mutex(job_id, &ctx.request_id);
        mutex
            .run_locked(async move {
                let mut job = self.data.require_job(job_id).await?;
                if job.is_terminal() {
                    debug!(status = %job.status, "job already finished; nothing to cancel");
                    return Ok(OperationOutcome::Unchanged(job));
                }

                self.settle_execution(&job, JobStatus::Canceled, None, true)
                    .await?;
                transition(&mut job, JobStatus::Canceled, "cancel")?;

                let job = self.data.put_job(job).await?;
                self.notify(ctx, &job).await;
                Ok(OperationOutcome::Updated(job))
            })
            .await
    }

    pub(super) async fn fail_job(
        &self,
        ctx: &OperationContext,
        job_id: &JobId,
        reason: Option<String>,
        error: Option<ProblemDetail>,
    ) -> Result<OperationOutcome> {
        let mutex = self.data.create_mutex(job_id, &ctx.request_id);
        mutex
            .run_locked(async move {
                let mut job = self.data.require_job(job_id).await?;
                if job.is_terminal() {
                    debug!(status = %job.status, "job already finished; not failing it");
                    return Ok(OperationOutcome::Unchanged(job));
                }

                let mut problem = error.unwrap_or_else(|| {
                    ProblemDetail::new(ProblemDetail::GENERIC_FAILURE, "Job failed")
                });
                if problem.detail.is_none()
                    && let Some(reason) = &reason
                {
                    problem.detail = Some(reason.clone());
                }
                job.status_message = Some(reason.unwrap_or_else(|| problem.summary()));
                job.error = Some(problem.clone());

                self.settle_execution(&job, JobStatus::Failed, Some(problem), false)
                    .await?;
                transition(&mut job, JobStatus::Failed, "fail")?;

                let job = self.data.put_job(job).await?;
                self.notify(ctx, &job).await;
                Ok(OperationOutcome::Updated(job))
            })
            .await
    }

    /// Cancel and relaunch in one mutex hold so nothing interleaves between
    /// stopping the old execution and recording the new one.
    pub(super) async fn restart_job(
        &self,
        ctx: &OperationContext,
        job_id: &JobId,
    ) -> Result<OperationOutcome> {
        let mutex = self.data.create_mutex(job_id, &ctx.request_id);
        mutex
            .run_locked(async move {
                let mut job = self.data.require_job(job_id).await?;
                if !job.status.is_restartable() {
                    return Err(invalid_state(&job, "restart"));
                }

                let previous = job.job_execution_id.clone();
                self.settle_execution(&job, JobStatus::Canceled, None, true)
                    .await?;
                job.reset_outcome();
                transition(&mut job, JobStatus::Scheduled, "restart")?;

                match self.launch_execution(&job).await {
                    Ok(launched) => apply_launch(&mut job, launched)?,
                    Err(err) => return self.abort_launch(ctx, job, err).await,
                }
                info!(
                    previous_execution = previous.as_ref().map(|id| id.as_str()).unwrap_or("none"),
                    execution = job.job_execution_id.as_ref().map(|id| id.as_str()).unwrap_or("none"),
                    "job restarted"
                );

                let job = self.data.put_job(job).await?;
                self.notify(ctx, &job).await;
                Ok(OperationOutcome::Updated(job))
            })
            .await
    }

    pub(super) async fn delete_job(
        &self,
        ctx: &OperationContext,
        job_id: &JobId,
    ) -> Result<OperationOutcome> {
        let mutex = self.data.create_mutex(job_id, &ctx.request_id);
        mutex
            .run_locked(async move {
                let job = self.data.require_job(job_id).await?;
                if !job.is_terminal() {
                    return Err(invalid_state(&job, "delete"));
                }
                self.data.delete_job(&job.id).await?;
                Ok(OperationOutcome::Deleted(job.id))
            })
            .await
    }

    pub(super) async fn process_notification(
        &self,
        ctx: &OperationContext,
        job_id: &JobId,
        notification: Notification,
    ) -> Result<OperationOutcome> {
        let mutex = self.data.create_mutex(job_id, &ctx.request_id);
        mutex
            .run_locked(async move {
                let mut job = self.data.require_job(job_id).await?;
                let Some(report) = notification.status_report() else {
                    warn!(source = ?notification.source, "ignoring notification without a status report");
                    return Ok(OperationOutcome::Unchanged(job));
                };
                if job.is_terminal() {
                    debug!(status = %job.status, reported = %report.status, "ignoring notification for finished job");
                    return Ok(OperationOutcome::Unchanged(job));
                }
                let Some(execution_id) = job.job_execution_id.clone() else {
                    warn!("ignoring notification for job without an execution");
                    return Ok(OperationOutcome::Unchanged(job));
                };

                let execution = self.data.get_execution(&job.id, &execution_id).await?;
                let current_assignment = execution
                    .as_ref()
                    .and_then(|execution| execution.job_assignment_id.as_deref());
                if let (Some(source), Some(current)) = (notification.source.as_deref(), current_assignment)
                    && source != current
                {
                    debug!(source, current, "ignoring notification from superseded assignment");
                    return Ok(OperationOutcome::Unchanged(job));
                }

                let advances = matches!(
                    report.status,
                    JobStatus::Running | JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled
                ) && job.status.can_transition_to(report.status);
                if report.status != job.status && !advances {
                    warn!(from = %job.status, to = %report.status, "ignoring notification with illegal transition");
                    return Ok(OperationOutcome::Unchanged(job));
                }

                if let Some(message) = &report.status_message {
                    job.status_message = Some(message.clone());
                }
                if let Some(progress) = report.progress {
                    job.progress = Some(progress.min(100));
                }
                match report.status {
                    JobStatus::Completed => {
                        job.job_output = report.job_output.clone().unwrap_or_default();
                        job.progress = Some(100);
                    }
                    JobStatus::Failed => {
                        let problem = report.error.clone().unwrap_or_else(|| {
                            ProblemDetail::new(
                                ProblemDetail::EXECUTION_FAILURE,
                                "Job execution failed",
                            )
                        });
                        if report.status_message.is_none() {
                            job.status_message = Some(problem.summary());
                        }
                        job.error = Some(problem);
                    }
                    _ => {}
                }
                if report.status != job.status {
                    transition(&mut job, report.status, "process notification for")?;
                }

                if let Some(mut execution) = execution {
                    execution.record_status(report.status, timestamp::now());
                    execution.status_message = job.status_message.clone();
                    execution.progress = job.progress;
                    execution.error = job.error.clone();
                    execution.job_output = job.job_output.clone();
                    self.data.put_execution(&job.id, execution).await?;
                }

                let job = self.data.put_job(job).await?;
                self.notify(ctx, &job).await;
                Ok(OperationOutcome::Updated(job))
            })
            .await
    }

    /// Resolves the job's profile to a service and creates an assignment
    /// there, recording the new execution.
    async fn launch_execution(&self, job: &Job) -> Result<Launched> {
        let profile: JobProfile = self
            .resources
            .get::<JobProfile>(&job.job_profile_id)
            .await?
            .ok_or_else(|| ProcessorError::ProfileResolution {
                profile_id: job.job_profile_id.clone(),
                reason: "job profile not found".into(),
            })?;

        let missing = profile.missing_inputs(&job.job_input);
        if !missing.is_empty() {
            return Err(ProcessorError::InvalidInput {
                profile_id: job.job_profile_id.clone(),
                reason: format!("missing required input parameters: {}", missing.join(", ")),
            });
        }

        let services: Vec<Service> = self.resources.query::<Service>(&[]).await?;
        let accepts = |service: &Service| {
            service.supports(&job.job_profile_id, &job.job_type)
                || profile
                    .id
                    .as_deref()
                    .is_some_and(|id| service.supports(id, &job.job_type))
        };
        let (service, endpoint) = services
            .iter()
            .filter(|&service| accepts(service))
            .find_map(|service| {
                service
                    .job_assignment_endpoint()
                    .map(|endpoint| (service, endpoint))
            })
            .ok_or_else(|| ProcessorError::ProfileResolution {
                profile_id: job.job_profile_id.clone(),
                reason: format!(
                    "none of {} registered services accepts {} jobs for profile {}",
                    services.len(),
                    job.job_type,
                    profile.name
                ),
            })?;

        let now = timestamp::now();
        let mut execution = JobExecution::new(job.id.new_execution_id(), now);
        let mut assignment = JobAssignment::new(job.id.as_str());
        assignment.tracker = job.tracker.clone();
        assignment.notification_endpoint = Some(execution.id.notification_endpoint());

        let created = self.resources.create_at(endpoint, &assignment).await?;
        let assignment_id = created.id.clone().ok_or_else(|| {
            ProcessorError::backend(endpoint, "job assignment was created without an id")
        })?;
        let running = created.status == JobStatus::Running;

        execution.job_assignment_id = Some(assignment_id.clone());
        execution.record_status(JobStatus::Scheduled, now);
        if running {
            execution.record_status(JobStatus::Running, now);
        }
        let execution = match self.data.put_execution(&job.id, execution).await {
            Ok(execution) => execution,
            Err(err) => {
                // Nothing records the assignment, so stop it rather than orphan it.
                if let Err(cancel_err) =
                    self.resources.invoke_action(&assignment_id, "cancel").await
                {
                    warn!(
                        assignment_id = %assignment_id,
                        error = %cancel_err,
                        "failed to cancel unrecorded assignment"
                    );
                }
                return Err(err);
            }
        };

        info!(
            service = %service.name,
            execution_id = %execution.id,
            assignment_id = execution.job_assignment_id.as_deref().unwrap_or(""),
            running,
            "execution launched"
        );
        Ok(Launched {
            execution_id: execution.id,
            running,
        })
    }

    /// Records a failed launch on the job and hands the error back.
    async fn abort_launch(
        &self,
        ctx: &OperationContext,
        mut job: Job,
        err: ProcessorError,
    ) -> Result<OperationOutcome> {
        let problem = ProblemDetail::new(ProblemDetail::START_FAILURE, "Failed to start job")
            .with_detail(err.to_string());
        job.status_message = Some(problem.summary());
        job.error = Some(problem);
        if let Err(transition_err) = transition(&mut job, JobStatus::Failed, "fail") {
            warn!(error = %transition_err, "could not mark job failed after launch error");
            return Err(err);
        }

        match self.data.put_job(job).await {
            Ok(job) => self.notify(ctx, &job).await,
            Err(store_err) => {
                warn!(error = %store_err, "failed to persist launch failure");
            }
        }
        Err(err)
    }

    /// Moves the job's current execution to `status` unless it already
    /// finished, optionally asking the backend to cancel it first. A failed
    /// backend cancel is logged; the execution is still closed locally.
    async fn settle_execution(
        &self,
        job: &Job,
        status: JobStatus,
        error: Option<ProblemDetail>,
        cancel_backend: bool,
    ) -> Result<()> {
        let Some(execution_id) = &job.job_execution_id else {
            return Ok(());
        };
        let Some(mut execution) = self.data.get_execution(&job.id, execution_id).await? else {
            warn!(execution_id = %execution_id, "current execution record is missing");
            return Ok(());
        };
        if execution.status.is_terminal() {
            return Ok(());
        }

        if cancel_backend && let Some(assignment_id) = &execution.job_assignment_id {
            match self.resources.invoke_action(assignment_id, "cancel").await {
                Ok(()) => debug!(assignment_id, "backend execution cancel requested"),
                Err(err) => warn!(assignment_id, error = %err, "backend cancel failed"),
            }
        }

        execution.record_status(status, timestamp::now());
        if error.is_some() {
            execution.error = error;
        }
        self.data.put_execution(&job.id, execution).await?;
        Ok(())
    }
}

fn apply_launch(job: &mut Job, launched: Launched) -> Result<()> {
    job.job_execution_id = Some(launched.execution_id);
    if launched.running {
        transition(job, JobStatus::Running, "start")?;
    }
    Ok(())
}
