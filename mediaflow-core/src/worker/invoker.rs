//! How triggers hand work to a job worker.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::debug;

use super::{JobProcessor, WorkerRequest};
use crate::{
    error::{ProcessorError, Result},
    resource_manager::{RequestSigner, http::send_signed},
};

/// Delivers a [`WorkerRequest`] to whatever executes job operations.
#[async_trait]
pub trait WorkerInvoker: Send + Sync + fmt::Debug {
    async fn invoke(&self, request: WorkerRequest) -> Result<()>;
}

/// Runs the operation in this process.
#[derive(Clone, Debug)]
pub struct LocalWorkerInvoker {
    processor: Arc<JobProcessor>,
}

impl LocalWorkerInvoker {
    pub fn new(processor: Arc<JobProcessor>) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl WorkerInvoker for LocalWorkerInvoker {
    async fn invoke(&self, request: WorkerRequest) -> Result<()> {
        self.processor.execute(request).await.map(|_| ())
    }
}

/// Posts the request as JSON to a remote worker endpoint.
pub struct HttpWorkerInvoker {
    client: Client,
    worker_url: String,
    signer: Arc<dyn RequestSigner>,
}

impl fmt::Debug for HttpWorkerInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpWorkerInvoker")
            .field("worker_url", &self.worker_url)
            .field("signer", &self.signer)
            .finish()
    }
}

impl HttpWorkerInvoker {
    pub fn new(
        worker_url: impl Into<String>,
        signer: Arc<dyn RequestSigner>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ProcessorError::Configuration(format!("failed to build HTTP client: {e}"))
        })?;
        Ok(Self {
            client,
            worker_url: worker_url.into(),
            signer,
        })
    }
}

#[async_trait]
impl WorkerInvoker for HttpWorkerInvoker {
    async fn invoke(&self, request: WorkerRequest) -> Result<()> {
        debug!(
            worker = %self.worker_url,
            operation = request.operation.name(),
            job_id = %request.operation.job_id(),
            "invoking remote worker"
        );
        let body = serde_json::to_value(&request)?;
        send_signed(
            &self.client,
            self.signer.as_ref(),
            Method::POST,
            &self.worker_url,
            Some(&body),
            &[],
        )
        .await
        .map_err(|err| remote_error(&request, err))?;
        Ok(())
    }
}

/// Maps the remote worker's HTTP verdict back onto the error the operation
/// raised there, so callers can tell lock contention from a real failure.
fn remote_error(request: &WorkerRequest, err: ProcessorError) -> ProcessorError {
    let job_id = request.operation.job_id();
    match err {
        ProcessorError::BackendCall {
            status: Some(404),
            ..
        } => ProcessorError::job_not_found(job_id.as_str()),
        ProcessorError::BackendCall {
            status: Some(503),
            ..
        } => ProcessorError::MutexTimeout {
            name: format!("job:{}", job_id.guid()),
            waited: Duration::ZERO,
        },
        other => other,
    }
}
