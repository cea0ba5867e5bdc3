#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header::CONTENT_TYPE},
};
use mediaflow_core::{
    CleanupConfig, InMemoryTable, LocalWorkerInvoker, MutexConfig,
    ProcessorConfig, ProcessorError, ResourceManager, Result,
};
use mediaflow_model::Notification;
use mediaflow_server::{
    AppState,
    infra::config::{
        AuthSettings, Config, ConfigMetadata, ResourceManagerConfig,
        ServerConfig, TableConfig, WorkerConfig, WorkerTarget,
    },
    routes::create_router,
};
use serde_json::{Value, json};
use tower::ServiceExt;

pub const PUBLIC_URL: &str = "http://mediaflow.test";
pub const SERVICES_URL: &str = "http://registry.test/services";
pub const ASSIGNMENTS_URL: &str = "http://transcoder.test/job-assignments";
pub const PROFILE_ID: &str = "http://registry.test/job-profiles/thumbnail";
pub const CALLER_ENDPOINT: &str = "http://caller.test/notify";

#[derive(Default)]
struct Recorded {
    resources: HashMap<String, Value>,
    assignments: usize,
    actions: Vec<(String, String)>,
    notifications: Vec<(String, Notification)>,
}

/// Registry with one thumbnail profile served by one transcoder.
#[derive(Clone, Default)]
pub struct StubResources {
    state: Arc<Mutex<Recorded>>,
}

impl StubResources {
    pub fn new() -> Self {
        let stub = Self::default();
        stub.state.lock().unwrap().resources.insert(
            PROFILE_ID.to_string(),
            json!({
                "id": PROFILE_ID,
                "name": "ExtractThumbnail",
                "inputParameters": [{ "parameterName": "inputFile" }]
            }),
        );
        stub
    }

    pub fn actions(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().actions.clone()
    }

    pub fn notifications(&self) -> Vec<(String, Notification)> {
        self.state.lock().unwrap().notifications.clone()
    }
}

#[async_trait]
impl ResourceManager for StubResources {
    async fn resolve_endpoint(&self, resource_type: &str) -> Result<String> {
        match resource_type {
            "Service" => Ok(SERVICES_URL.into()),
            "JobAssignment" => Ok(ASSIGNMENTS_URL.into()),
            other => Err(ProcessorError::NotFound {
                kind: "resource endpoint",
                id: other.into(),
            }),
        }
    }

    async fn get_value(&self, url: &str) -> Result<Option<Value>> {
        Ok(self.state.lock().unwrap().resources.get(url).cloned())
    }

    async fn create_value(&self, endpoint: &str, mut value: Value) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        state.assignments += 1;
        value["id"] = json!(format!("{endpoint}/{}", state.assignments));
        value["status"] = json!("New");
        Ok(value)
    }

    async fn update_value(&self, _url: &str, value: Value) -> Result<Value> {
        Ok(value)
    }

    async fn delete_value(&self, _url: &str) -> Result<()> {
        Ok(())
    }

    async fn query_values(
        &self,
        resource_type: &str,
        _filter: &[(String, String)],
    ) -> Result<Vec<Value>> {
        if resource_type != "Service" {
            return Ok(Vec::new());
        }
        Ok(vec![json!({
            "id": format!("{SERVICES_URL}/transcoder"),
            "name": "transcoder",
            "jobProfileIds": [PROFILE_ID],
            "resources": [
                { "resourceType": "JobAssignment", "httpEndpoint": ASSIGNMENTS_URL }
            ]
        })])
    }

    async fn invoke_action(&self, url: &str, action: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .actions
            .push((url.into(), action.into()));
        Ok(())
    }

    async fn send_notification(
        &self,
        endpoint: &str,
        notification: &Notification,
    ) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .notifications
            .push((endpoint.into(), notification.clone()));
        Ok(())
    }
}

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
        },
        public_url: PUBLIC_URL.into(),
        table: TableConfig {
            name: "mediaflow_jobs".into(),
            database_url: None,
            max_connections: 1,
        },
        resources: ResourceManagerConfig {
            services_url: Some(SERVICES_URL.into()),
            auth: AuthSettings::None,
            request_timeout_secs: 5,
        },
        worker: WorkerConfig {
            target: WorkerTarget::Local,
            request_timeout_secs: 5,
        },
        processor: ProcessorConfig {
            mutex: MutexConfig {
                lease_ms: 10_000,
                retry_base_ms: 1,
                retry_max_ms: 10,
                jitter_ratio: 0.25,
                acquire_timeout_ms: 200,
            },
            cleanup: CleanupConfig::default(),
        },
        metadata: ConfigMetadata::default(),
    }
}

/// Router over an in-memory table and the stub registry.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub resources: StubResources,
}

impl TestApp {
    pub fn new() -> Self {
        let resources = StubResources::new();
        let state = AppState::new(
            Arc::new(test_config()),
            Arc::new(InMemoryTable::new()),
            Arc::new(resources.clone()),
            |processor| Arc::new(LocalWorkerInvoker::new(processor)),
        );
        Self {
            router: create_router(state.clone()),
            state,
            resources,
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, value)
    }

    /// Submits a thumbnail job and returns the created record.
    pub async fn submit(&self) -> Value {
        let (status, _, job) = self
            .send(
                Method::POST,
                "/jobs",
                Some(json!({
                    "type": "TransformJob",
                    "jobProfileId": PROFILE_ID,
                    "jobInput": { "inputFile": "s3://bucket/in.mov" },
                    "notificationEndpoint": CALLER_ENDPOINT
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        job
    }
}

/// Trailing path segment of a job or execution id.
pub fn guid(id: &Value) -> String {
    id.as_str()
        .and_then(|id| id.rsplit('/').next())
        .expect("id string")
        .to_string()
}
