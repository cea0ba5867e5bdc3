use std::{fmt, sync::Arc};

use mediaflow_core::{
    CleanupScheduler, DataController, JobProcessor, ResourceManager, Table,
    WorkerInvoker,
};

use crate::infra::config::Config;

/// Everything request handlers need, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub data: DataController,
    /// Executes operations posted to the worker endpoint.
    pub processor: Arc<JobProcessor>,
    /// Hands operations triggered by API calls to the configured worker.
    pub invoker: Arc<dyn WorkerInvoker>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("public_url", &self.config.public_url)
            .field("invoker", &self.invoker)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Wires the processor over `table` and `resources`; the worker invoker
    /// is supplied by the caller.
    pub fn new(
        config: Arc<Config>,
        table: Arc<dyn Table>,
        resources: Arc<dyn ResourceManager>,
        invoker: impl FnOnce(Arc<JobProcessor>) -> Arc<dyn WorkerInvoker>,
    ) -> Self {
        let data = DataController::new(
            table,
            config.public_url.clone(),
            config.processor.mutex,
        );
        let processor = Arc::new(JobProcessor::new(data.clone(), resources));
        let invoker = invoker(Arc::clone(&processor));
        Self {
            config,
            data,
            processor,
            invoker,
        }
    }

    pub fn cleanup_scheduler(&self) -> CleanupScheduler {
        CleanupScheduler::new(
            self.data.clone(),
            Arc::clone(&self.invoker),
            self.config.processor.cleanup,
        )
    }
}
