#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use mediaflow_core::{
    DataController, InMemoryTable, JobOperation, JobProcessor, MutexConfig,
    OperationOutcome, ProcessorError, ResourceManager, Result, Table,
    WorkerRequest,
    table::{FilterExpression, Query, QueryResults, WriteCondition},
};
use mediaflow_model::{
    Job, JobId, JobParameterBag, JobStatus, JobType, NewJob, Notification,
};
use serde_json::{Value, json};

pub const PUBLIC_URL: &str = "http://mediaflow.test";
pub const SERVICES_URL: &str = "http://registry.test/services";
pub const ASSIGNMENTS_URL: &str = "http://transcoder.test/job-assignments";
pub const PROFILE_ID: &str = "http://registry.test/job-profiles/profile-x";
pub const CALLER_ENDPOINT: &str = "http://caller.test/notify";

#[derive(Default)]
struct FakeState {
    resources: HashMap<String, Value>,
    services: Vec<Value>,
    assignment_status: Option<JobStatus>,
    assignment_progress: Option<Value>,
    fail_cancel: bool,
    fail_notifications: bool,
    created: Vec<Value>,
    actions: Vec<(String, String)>,
    notifications: Vec<(String, Notification)>,
}

/// In-memory resource manager that records every outbound call.
#[derive(Clone, Default)]
pub struct FakeResourceManager {
    state: Arc<Mutex<FakeState>>,
}

impl FakeResourceManager {
    /// Registry with `profile-x` (requires `inputFile`) served by one
    /// transcoder.
    pub fn with_transcoder() -> Self {
        let fake = Self::default();
        fake.add_profile(PROFILE_ID, &["inputFile"]);
        fake.add_service("transcoder", &[PROFILE_ID], Some(ASSIGNMENTS_URL));
        fake
    }

    pub fn add_profile(&self, id: &str, required_inputs: &[&str]) {
        let inputs: Vec<Value> = required_inputs
            .iter()
            .map(|name| json!({ "parameterName": name }))
            .collect();
        self.state.lock().unwrap().resources.insert(
            id.to_string(),
            json!({ "id": id, "name": "profile", "inputParameters": inputs }),
        );
    }

    pub fn add_service(&self, name: &str, profiles: &[&str], assignments: Option<&str>) {
        let resources: Vec<Value> = assignments
            .map(|url| json!({ "resourceType": "JobAssignment", "httpEndpoint": url }))
            .into_iter()
            .collect();
        self.state.lock().unwrap().services.push(json!({
            "id": format!("{SERVICES_URL}/{name}"),
            "name": name,
            "jobProfileIds": profiles,
            "resources": resources,
        }));
    }

    /// Status created assignments report back (default `New`).
    pub fn assignments_report(&self, status: JobStatus) {
        self.state.lock().unwrap().assignment_status = Some(status);
    }

    /// Raw `progress` value created assignments carry.
    pub fn assignments_progress(&self, progress: Value) {
        self.state.lock().unwrap().assignment_progress = Some(progress);
    }

    pub fn fail_cancel(&self, fail: bool) {
        self.state.lock().unwrap().fail_cancel = fail;
    }

    pub fn fail_notifications(&self, fail: bool) {
        self.state.lock().unwrap().fail_notifications = fail;
    }

    pub fn created_assignments(&self) -> Vec<Value> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn actions(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().actions.clone()
    }

    pub fn notifications(&self) -> Vec<(String, Notification)> {
        self.state.lock().unwrap().notifications.clone()
    }
}

#[async_trait]
impl ResourceManager for FakeResourceManager {
    async fn resolve_endpoint(&self, resource_type: &str) -> Result<String> {
        match resource_type {
            "Service" => Ok(SERVICES_URL.to_string()),
            "JobAssignment" => Ok(ASSIGNMENTS_URL.to_string()),
            other => Err(ProcessorError::NotFound {
                kind: "resource endpoint",
                id: other.to_string(),
            }),
        }
    }

    async fn get_value(&self, url: &str) -> Result<Option<Value>> {
        Ok(self.state.lock().unwrap().resources.get(url).cloned())
    }

    async fn create_value(&self, endpoint: &str, mut value: Value) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        let id = format!("{endpoint}/{}", state.created.len() + 1);
        let status = state.assignment_status.unwrap_or(JobStatus::New);
        value["id"] = json!(id);
        value["status"] = json!(status);
        if let Some(progress) = state.assignment_progress.clone() {
            value["progress"] = progress;
        }
        state.resources.insert(id, value.clone());
        state.created.push(value.clone());
        Ok(value)
    }

    async fn update_value(&self, url: &str, value: Value) -> Result<Value> {
        self.state
            .lock()
            .unwrap()
            .resources
            .insert(url.to_string(), value.clone());
        Ok(value)
    }

    async fn delete_value(&self, url: &str) -> Result<()> {
        self.state.lock().unwrap().resources.remove(url);
        Ok(())
    }

    async fn query_values(
        &self,
        resource_type: &str,
        _filter: &[(String, String)],
    ) -> Result<Vec<Value>> {
        let state = self.state.lock().unwrap();
        Ok(match resource_type {
            "Service" => state.services.clone(),
            _ => Vec::new(),
        })
    }

    async fn invoke_action(&self, url: &str, action: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.actions.push((url.to_string(), action.to_string()));
        if state.fail_cancel {
            return Err(ProcessorError::backend(url, "service unavailable"));
        }
        Ok(())
    }

    async fn send_notification(
        &self,
        endpoint: &str,
        notification: &Notification,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_notifications {
            return Err(ProcessorError::backend(endpoint, "connection refused"));
        }
        state
            .notifications
            .push((endpoint.to_string(), notification.clone()));
        Ok(())
    }
}

/// Processor wired to an in-memory table and the fake resource manager.
pub struct Harness {
    pub table: Arc<InMemoryTable>,
    pub data: DataController,
    pub resources: FakeResourceManager,
    pub processor: Arc<JobProcessor>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_resources(FakeResourceManager::with_transcoder())
    }

    pub fn with_resources(resources: FakeResourceManager) -> Self {
        let table = Arc::new(InMemoryTable::new());
        Self::over_table(resources, table.clone(), table)
    }

    /// Harness whose execution writes fail while everything else is stored.
    pub fn with_failing_execution_writes() -> Self {
        let table = Arc::new(InMemoryTable::new());
        let storage = Arc::new(ExecutionWritesFail {
            inner: table.clone(),
        });
        Self::over_table(FakeResourceManager::with_transcoder(), table, storage)
    }

    fn over_table(
        resources: FakeResourceManager,
        table: Arc<InMemoryTable>,
        storage: Arc<dyn Table>,
    ) -> Self {
        let data = DataController::new(storage, PUBLIC_URL, fast_mutex());
        let processor = Arc::new(JobProcessor::new(
            data.clone(),
            Arc::new(resources.clone()),
        ));
        Self {
            table,
            data,
            resources,
            processor,
        }
    }

    /// Submits a job for `profile-x` with its required input present.
    pub async fn submit(&self) -> Job {
        let mut input = JobParameterBag::new();
        input.insert("inputFile".into(), json!("s3://bucket/in.mov"));
        self.data
            .add_job(NewJob {
                job_type: JobType::Transform,
                job_profile_id: PROFILE_ID.into(),
                job_input: input,
                tracker: None,
                notification_endpoint: Some(CALLER_ENDPOINT.into()),
            })
            .await
            .unwrap()
    }

    /// Stores `job` with a forced status, bypassing the state machine.
    pub async fn force_status(&self, job: &Job, status: JobStatus) -> Job {
        let mut job = job.clone();
        job.status = status;
        self.data.put_job(job).await.unwrap()
    }

    pub async fn run(&self, operation: JobOperation) -> Result<OperationOutcome> {
        self.processor.execute(WorkerRequest::new(operation)).await
    }

    pub async fn start(&self, job_id: &JobId) -> Result<OperationOutcome> {
        self.run(JobOperation::StartJob {
            job_id: job_id.clone(),
        })
        .await
    }

    pub async fn job(&self, job_id: &JobId) -> Job {
        self.data.get_job(job_id).await.unwrap().expect("job exists")
    }

    /// Backend notification as the assignment at `source` would post it.
    pub async fn report(
        &self,
        job_id: &JobId,
        source: &str,
        content: Value,
    ) -> Result<OperationOutcome> {
        self.run(JobOperation::ProcessNotification {
            job_id: job_id.clone(),
            notification: Notification::new(source, content),
        })
        .await
    }

    /// Assignment id recorded on the job's current execution.
    pub async fn current_assignment(&self, job_id: &JobId) -> String {
        let job = self.job(job_id).await;
        let execution_id = job.job_execution_id.expect("execution id");
        self.data
            .get_execution(job_id, &execution_id)
            .await
            .unwrap()
            .expect("execution")
            .job_assignment_id
            .expect("assignment id")
    }
}

/// Delegates to an in-memory table but rejects writes of execution records.
struct ExecutionWritesFail {
    inner: Arc<InMemoryTable>,
}

#[async_trait]
impl Table for ExecutionWritesFail {
    async fn get(&self, id: &str) -> Result<Option<Value>> {
        self.inner.get(id).await
    }

    async fn put(&self, id: &str, item: Value) -> Result<()> {
        if id.contains("/executions/") {
            return Err(ProcessorError::Storage("disk full".into()));
        }
        self.inner.put(id, item).await
    }

    async fn put_if(
        &self,
        id: &str,
        item: Value,
        condition: &WriteCondition,
    ) -> Result<bool> {
        self.inner.put_if(id, item, condition).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.inner.delete(id).await
    }

    async fn delete_if(&self, id: &str, condition: &FilterExpression) -> Result<bool> {
        self.inner.delete_if(id, condition).await
    }

    async fn query(&self, query: &Query) -> Result<QueryResults<Value>> {
        self.inner.query(query).await
    }
}

pub fn fast_mutex() -> MutexConfig {
    MutexConfig {
        lease_ms: 10_000,
        retry_base_ms: 1,
        retry_max_ms: 10,
        jitter_ratio: 0.25,
        acquire_timeout_ms: 5_000,
    }
}
