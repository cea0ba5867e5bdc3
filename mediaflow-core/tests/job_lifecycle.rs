mod support;

use mediaflow_core::{JobOperation, OperationOutcome, ProcessorError};
use mediaflow_model::{JobId, JobStatus, ProblemDetail};
use serde_json::json;
use support::{ASSIGNMENTS_URL, CALLER_ENDPOINT, FakeResourceManager, Harness, PROFILE_ID};

#[tokio::test]
async fn start_job_schedules_execution_and_notifies_caller() {
    let h = Harness::new();
    let job = h.submit().await;

    let outcome = h.start(&job.id).await.unwrap();
    assert!(matches!(outcome, OperationOutcome::Updated(_)));

    let stored = h.job(&job.id).await;
    assert_eq!(stored.status, JobStatus::Scheduled);
    let execution_id = stored.job_execution_id.clone().expect("execution id");
    assert!(
        execution_id
            .as_str()
            .starts_with(&format!("{}/executions/", job.id))
    );

    let execution = h
        .data
        .get_execution(&job.id, &execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, JobStatus::Scheduled);
    assert_eq!(
        execution.job_assignment_id.as_deref(),
        Some(format!("{ASSIGNMENTS_URL}/1").as_str())
    );

    let assignments = h.resources.created_assignments();
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0]["jobId"], json!(job.id.as_str()));
    assert_eq!(
        assignments[0]["notificationEndpoint"],
        json!(execution_id.notification_endpoint())
    );

    let notifications = h.resources.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].0, CALLER_ENDPOINT);
    assert_eq!(notifications[0].1.source.as_deref(), Some(job.id.as_str()));
    assert_eq!(notifications[0].1.content["status"], json!("Scheduled"));
}

#[tokio::test]
async fn start_job_is_running_when_backend_acknowledges() {
    let h = Harness::new();
    h.resources.assignments_report(JobStatus::Running);
    let job = h.submit().await;

    h.start(&job.id).await.unwrap();

    let stored = h.job(&job.id).await;
    assert_eq!(stored.status, JobStatus::Running);
    let execution = h
        .data
        .get_execution(&job.id, stored.job_execution_id.as_ref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(execution.actual_start_date.is_some());
}

#[tokio::test]
async fn start_job_rejects_unknown_and_started_jobs() {
    let h = Harness::new();
    let missing = h.start(&JobId::new("http://mediaflow.test/jobs/nope")).await;
    assert!(matches!(missing, Err(ProcessorError::NotFound { .. })));

    let job = h.submit().await;
    h.start(&job.id).await.unwrap();
    let again = h.start(&job.id).await;
    assert!(matches!(
        again,
        Err(ProcessorError::InvalidState {
            status: JobStatus::Scheduled,
            ..
        })
    ));
    assert_eq!(h.resources.created_assignments().len(), 1);
}

#[tokio::test]
async fn start_job_without_matching_service_fails_the_job() {
    let resources = FakeResourceManager::default();
    resources.add_profile(PROFILE_ID, &[]);
    resources.add_service("captioner", &["http://registry.test/job-profiles/other"], Some(ASSIGNMENTS_URL));
    resources.add_service("no-endpoint", &[PROFILE_ID], None);
    let h = Harness::with_resources(resources);
    let job = h.submit().await;

    let err = h.start(&job.id).await.unwrap_err();
    assert!(matches!(err, ProcessorError::ProfileResolution { .. }));

    let stored = h.job(&job.id).await;
    assert_eq!(stored.status, JobStatus::Failed);
    let problem = stored.error.expect("error recorded");
    assert_eq!(problem.problem_type, ProblemDetail::START_FAILURE);
    assert!(h.resources.created_assignments().is_empty());
    assert_eq!(h.resources.notifications().len(), 1);
}

#[tokio::test]
async fn start_job_validates_required_inputs() {
    let h = Harness::new();
    let mut job = h.submit().await;
    job.job_input.clear();
    let job = h.data.put_job(job).await.unwrap();

    let err = h.start(&job.id).await.unwrap_err();
    assert!(matches!(err, ProcessorError::InvalidInput { .. }));
    assert!(err.to_string().contains("inputFile"));
    assert_eq!(h.job(&job.id).await.status, JobStatus::Failed);
}

#[tokio::test]
async fn notification_failures_never_roll_back_state() {
    let h = Harness::new();
    h.resources.fail_notifications(true);
    let job = h.submit().await;

    h.start(&job.id).await.unwrap();
    assert_eq!(h.job(&job.id).await.status, JobStatus::Scheduled);
}

#[tokio::test]
async fn cancel_stops_backend_execution() {
    let h = Harness::new();
    let job = h.submit().await;
    h.start(&job.id).await.unwrap();
    let assignment = h.current_assignment(&job.id).await;

    h.run(JobOperation::CancelJob {
        job_id: job.id.clone(),
    })
    .await
    .unwrap();

    let stored = h.job(&job.id).await;
    assert_eq!(stored.status, JobStatus::Canceled);
    assert_eq!(h.resources.actions(), vec![(assignment, "cancel".to_string())]);
    let execution = h
        .data
        .get_execution(&job.id, stored.job_execution_id.as_ref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, JobStatus::Canceled);
    assert!(execution.actual_end_date.is_some());
}

#[tokio::test]
async fn cancel_succeeds_even_if_backend_cancel_fails() {
    let h = Harness::new();
    h.resources.fail_cancel(true);
    let job = h.submit().await;
    h.start(&job.id).await.unwrap();

    h.run(JobOperation::CancelJob {
        job_id: job.id.clone(),
    })
    .await
    .unwrap();
    assert_eq!(h.job(&job.id).await.status, JobStatus::Canceled);
}

#[tokio::test]
async fn cancel_on_completed_job_is_a_no_op() {
    let h = Harness::new();
    let job = h.submit().await;
    let job = h.force_status(&job, JobStatus::Completed).await;

    let outcome = h
        .run(JobOperation::CancelJob {
            job_id: job.id.clone(),
        })
        .await
        .unwrap();

    assert!(matches!(outcome, OperationOutcome::Unchanged(_)));
    let stored = h.job(&job.id).await;
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.date_modified, job.date_modified);
    assert!(h.resources.actions().is_empty());
}

#[tokio::test]
async fn fail_job_records_reason() {
    let h = Harness::new();
    let job = h.submit().await;
    h.start(&job.id).await.unwrap();

    h.run(JobOperation::FailJob {
        job_id: job.id.clone(),
        reason: Some("source file is corrupt".into()),
        error: None,
    })
    .await
    .unwrap();

    let stored = h.job(&job.id).await;
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.status_message.as_deref(), Some("source file is corrupt"));
    let problem = stored.error.unwrap();
    assert_eq!(problem.problem_type, ProblemDetail::GENERIC_FAILURE);
    assert_eq!(problem.detail.as_deref(), Some("source file is corrupt"));

    let missing = h
        .run(JobOperation::FailJob {
            job_id: JobId::new("http://mediaflow.test/jobs/missing"),
            reason: None,
            error: None,
        })
        .await;
    assert!(matches!(missing, Err(ProcessorError::NotFound { .. })));
}

#[tokio::test]
async fn restart_failed_job_creates_fresh_execution() {
    let h = Harness::new();
    let job = h.submit().await;
    h.start(&job.id).await.unwrap();
    h.run(JobOperation::FailJob {
        job_id: job.id.clone(),
        reason: Some("transient".into()),
        error: None,
    })
    .await
    .unwrap();
    let before = h.job(&job.id).await;
    let old_execution = before.job_execution_id.clone().unwrap();

    h.run(JobOperation::RestartJob {
        job_id: job.id.clone(),
    })
    .await
    .unwrap();

    let after = h.job(&job.id).await;
    assert_eq!(after.status, JobStatus::Scheduled);
    assert!(after.error.is_none());
    assert!(after.status_message.is_none());
    let new_execution = after.job_execution_id.clone().unwrap();
    assert_ne!(new_execution, old_execution);

    let history = h.data.list_executions(&job.id).await.unwrap();
    assert_eq!(history.len(), 2);
    let old = history.iter().find(|e| e.id == old_execution).unwrap();
    assert_eq!(old.status, JobStatus::Failed);
    assert_eq!(h.resources.created_assignments().len(), 2);
}

#[tokio::test]
async fn restart_running_job_cancels_prior_execution_under_one_lock() {
    let h = Harness::new();
    h.resources.assignments_report(JobStatus::Running);
    let job = h.submit().await;
    h.start(&job.id).await.unwrap();
    let old_assignment = h.current_assignment(&job.id).await;
    let old_execution = h.job(&job.id).await.job_execution_id.unwrap();

    h.run(JobOperation::RestartJob {
        job_id: job.id.clone(),
    })
    .await
    .unwrap();

    assert_eq!(h.resources.actions(), vec![(old_assignment.clone(), "cancel".to_string())]);
    let old = h
        .data
        .get_execution(&job.id, &old_execution)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(old.status, JobStatus::Canceled);

    // Late news from the superseded assignment does not touch the new run.
    let outcome = h
        .report(
            &job.id,
            &old_assignment,
            json!({ "jobId": job.id.as_str(), "status": "Completed" }),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, OperationOutcome::Unchanged(_)));
    assert_eq!(h.job(&job.id).await.status, JobStatus::Running);
}

#[tokio::test]
async fn restart_requires_terminal_or_running_job() {
    let h = Harness::new();
    let job = h.submit().await;
    let err = h
        .run(JobOperation::RestartJob {
            job_id: job.id.clone(),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProcessorError::InvalidState {
            status: JobStatus::New,
            ..
        }
    ));
}

#[tokio::test]
async fn delete_running_job_is_rejected_and_record_kept() {
    let h = Harness::new();
    let job = h.submit().await;
    let job = h.force_status(&job, JobStatus::Running).await;

    let err = h
        .run(JobOperation::DeleteJob {
            job_id: job.id.clone(),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProcessorError::InvalidState {
            operation: "delete",
            status: JobStatus::Running,
            ..
        }
    ));
    assert_eq!(h.job(&job.id).await, job);
}

#[tokio::test]
async fn delete_terminal_job_removes_history() {
    let h = Harness::new();
    let job = h.submit().await;
    h.start(&job.id).await.unwrap();
    h.run(JobOperation::CancelJob {
        job_id: job.id.clone(),
    })
    .await
    .unwrap();

    let outcome = h
        .run(JobOperation::DeleteJob {
            job_id: job.id.clone(),
        })
        .await
        .unwrap();
    assert_eq!(outcome, OperationOutcome::Deleted(job.id.clone()));
    assert!(h.data.get_job(&job.id).await.unwrap().is_none());
    assert!(h.data.list_executions(&job.id).await.unwrap().is_empty());
    // No job, execution or mutex records are left behind.
    assert!(h.table.is_empty().await);
}

#[tokio::test]
async fn notifications_drive_job_to_completion() {
    let h = Harness::new();
    let job = h.submit().await;
    h.start(&job.id).await.unwrap();
    let assignment = h.current_assignment(&job.id).await;

    h.report(
        &job.id,
        &assignment,
        json!({ "jobId": job.id.as_str(), "status": "Running", "progress": 10 }),
    )
    .await
    .unwrap();
    let running = h.job(&job.id).await;
    assert_eq!(running.status, JobStatus::Running);
    assert_eq!(running.progress, Some(10));

    h.report(
        &job.id,
        &assignment,
        json!({
            "jobId": job.id.as_str(),
            "status": "Running",
            "progress": 55,
            "statusMessage": "encoding pass 2"
        }),
    )
    .await
    .unwrap();
    let progressed = h.job(&job.id).await;
    assert_eq!(progressed.status, JobStatus::Running);
    assert_eq!(progressed.progress, Some(55));
    assert_eq!(progressed.status_message.as_deref(), Some("encoding pass 2"));

    h.report(
        &job.id,
        &assignment,
        json!({
            "jobId": job.id.as_str(),
            "status": "Completed",
            "jobOutput": { "outputFile": "s3://bucket/out.mp4" }
        }),
    )
    .await
    .unwrap();
    let done = h.job(&job.id).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress, Some(100));
    assert_eq!(done.job_output["outputFile"], json!("s3://bucket/out.mp4"));

    let execution = h
        .data
        .get_execution(&job.id, done.job_execution_id.as_ref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, JobStatus::Completed);
    assert!(execution.actual_duration.is_some());

    // start + 3 updates
    assert_eq!(h.resources.notifications().len(), 4);
}

#[tokio::test]
async fn failure_notification_records_problem() {
    let h = Harness::new();
    let job = h.submit().await;
    h.start(&job.id).await.unwrap();
    let assignment = h.current_assignment(&job.id).await;

    h.report(
        &job.id,
        &assignment,
        json!({
            "jobId": job.id.as_str(),
            "status": "Failed",
            "error": { "type": "uri://transcoder/codec", "title": "Unsupported codec" }
        }),
    )
    .await
    .unwrap();

    let failed = h.job(&job.id).await;
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error.unwrap().title, "Unsupported codec");
    assert_eq!(failed.status_message.as_deref(), Some("Unsupported codec"));
}

#[tokio::test]
async fn failure_without_message_replaces_stale_progress_text() {
    let h = Harness::new();
    let job = h.submit().await;
    h.start(&job.id).await.unwrap();
    let assignment = h.current_assignment(&job.id).await;

    h.report(
        &job.id,
        &assignment,
        json!({ "status": "Running", "statusMessage": "encoding pass 2" }),
    )
    .await
    .unwrap();
    h.report(
        &job.id,
        &assignment,
        json!({
            "status": "Failed",
            "error": { "type": "uri://transcoder/io", "title": "Output unwritable" }
        }),
    )
    .await
    .unwrap();

    let failed = h.job(&job.id).await;
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.status_message.as_deref(), Some("Output unwritable"));
}

#[tokio::test]
async fn terminal_reports_with_odd_progress_still_finish_the_job() {
    let h = Harness::new();
    let completed = h.submit().await;
    h.start(&completed.id).await.unwrap();
    let assignment = h.current_assignment(&completed.id).await;

    h.report(
        &completed.id,
        &assignment,
        json!({ "status": "Running", "progress": 42.7 }),
    )
    .await
    .unwrap();
    assert_eq!(h.job(&completed.id).await.progress, Some(43));

    let outcome = h
        .report(
            &completed.id,
            &assignment,
            json!({ "status": "Completed", "progress": 100.0 }),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, OperationOutcome::Updated(_)));
    let done = h.job(&completed.id).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress, Some(100));

    let failed = h.submit().await;
    h.start(&failed.id).await.unwrap();
    let assignment = h.current_assignment(&failed.id).await;
    h.report(
        &failed.id,
        &assignment,
        json!({ "status": "Failed", "progress": 300 }),
    )
    .await
    .unwrap();
    assert_eq!(h.job(&failed.id).await.status, JobStatus::Failed);
}

#[tokio::test]
async fn start_accepts_fractional_progress_from_the_backend() {
    let resources = FakeResourceManager::with_transcoder();
    resources.assignments_report(JobStatus::Running);
    resources.assignments_progress(json!(12.5));
    let h = Harness::with_resources(resources);
    let job = h.submit().await;

    h.start(&job.id).await.unwrap();
    assert_eq!(h.job(&job.id).await.status, JobStatus::Running);
}

#[tokio::test]
async fn unrecorded_assignments_are_canceled() {
    let h = Harness::with_failing_execution_writes();
    let job = h.submit().await;

    let err = h.start(&job.id).await.unwrap_err();
    assert!(matches!(err, ProcessorError::Storage(_)));

    let created = h.resources.created_assignments();
    assert_eq!(created.len(), 1);
    let assignment_id = created[0]["id"].as_str().unwrap().to_string();
    assert_eq!(
        h.resources.actions(),
        vec![(assignment_id, "cancel".to_string())]
    );

    let stored = h.job(&job.id).await;
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.job_execution_id.is_none());
}

#[tokio::test]
async fn alias_ids_wait_for_the_canonical_lock() {
    let h = Harness::new();
    let job = h.submit().await;
    let alias = JobId::for_guid("https://elsewhere.example", job.id.guid());

    let held = h.data.create_mutex(&job.id, "someone-else");
    held.lock().await.unwrap();
    assert!(!h.data.create_mutex(&alias, "intruder").try_lock().await.unwrap());
    held.unlock().await.unwrap();

    let err = h.start(&alias).await.unwrap_err();
    assert!(matches!(err, ProcessorError::NotFound { .. }));
    assert_eq!(h.job(&job.id).await.status, JobStatus::New);
}

#[tokio::test]
async fn odd_notifications_are_ignored() {
    let h = Harness::new();
    let job = h.submit().await;

    // No execution yet.
    let early = h
        .report(&job.id, "anything", json!({ "status": "Running" }))
        .await
        .unwrap();
    assert!(matches!(early, OperationOutcome::Unchanged(_)));

    h.start(&job.id).await.unwrap();
    let assignment = h.current_assignment(&job.id).await;

    let shapeless = h
        .report(&job.id, &assignment, json!({ "hello": "world" }))
        .await
        .unwrap();
    assert!(matches!(shapeless, OperationOutcome::Unchanged(_)));

    let backwards = h
        .report(&job.id, &assignment, json!({ "status": "New" }))
        .await
        .unwrap();
    assert!(matches!(backwards, OperationOutcome::Unchanged(_)));
    assert_eq!(h.job(&job.id).await.status, JobStatus::Scheduled);

    h.report(&job.id, &assignment, json!({ "status": "Completed" }))
        .await
        .unwrap();
    let after_terminal = h
        .report(&job.id, &assignment, json!({ "status": "Running" }))
        .await
        .unwrap();
    assert!(matches!(after_terminal, OperationOutcome::Unchanged(_)));
    assert_eq!(h.job(&job.id).await.status, JobStatus::Completed);
}

#[tokio::test]
async fn concurrent_operations_on_one_job_serialize() {
    let h = Harness::new();
    let job = h.submit().await;
    h.start(&job.id).await.unwrap();

    let cancel = {
        let processor = h.processor.clone();
        let job_id = job.id.clone();
        tokio::spawn(async move {
            processor
                .execute(mediaflow_core::WorkerRequest::new(JobOperation::CancelJob { job_id }))
                .await
        })
    };
    let fail = {
        let processor = h.processor.clone();
        let job_id = job.id.clone();
        tokio::spawn(async move {
            processor
                .execute(mediaflow_core::WorkerRequest::new(JobOperation::FailJob {
                    job_id,
                    reason: Some("operator abort".into()),
                    error: None,
                }))
                .await
        })
    };

    let outcomes = [cancel.await.unwrap().unwrap(), fail.await.unwrap().unwrap()];
    let updated = outcomes
        .iter()
        .filter(|o| matches!(o, OperationOutcome::Updated(_)))
        .count();
    let unchanged = outcomes
        .iter()
        .filter(|o| matches!(o, OperationOutcome::Unchanged(_)))
        .count();
    assert_eq!((updated, unchanged), (1, 1));

    let stored = h.job(&job.id).await;
    match stored.status {
        JobStatus::Canceled => assert!(stored.error.is_none()),
        JobStatus::Failed => assert!(stored.error.is_some()),
        other => panic!("unexpected final status {other}"),
    }
}

#[tokio::test]
async fn status_history_only_takes_legal_transitions() {
    let h = Harness::new();
    let job = h.submit().await;
    let mut previous = JobStatus::New;

    let steps: Vec<JobOperation> = vec![
        JobOperation::CancelJob { job_id: job.id.clone() },
        JobOperation::StartJob { job_id: job.id.clone() },
        JobOperation::RestartJob { job_id: job.id.clone() },
        JobOperation::StartJob { job_id: job.id.clone() },
        JobOperation::FailJob {
            job_id: job.id.clone(),
            reason: None,
            error: None,
        },
        JobOperation::DeleteJob { job_id: job.id.clone() },
    ];

    // New -> Canceled, then Start is rejected, Restart -> Scheduled,
    // Start is rejected again, Fail -> Failed, Delete removes it.
    for operation in steps {
        let _ = h.run(operation).await;
        match h.data.get_job(&job.id).await.unwrap() {
            Some(current) => {
                assert!(
                    current.status == previous || previous.can_transition_to(current.status),
                    "{previous} -> {}",
                    current.status
                );
                previous = current.status;
            }
            None => assert!(previous.is_terminal()),
        }
    }
    assert!(h.data.get_job(&job.id).await.unwrap().is_none());
}
