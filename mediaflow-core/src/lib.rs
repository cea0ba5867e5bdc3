//! Job processor core: table abstraction, distributed mutex, data
//! controller, resource-manager client, job state machine and retention
//! sweep.
#![allow(missing_docs)]

pub mod cleanup;
pub mod config;
pub mod data_controller;
pub mod error;
pub mod mutex;
pub mod resource_manager;
pub mod table;
pub mod worker;

pub use cleanup::{CleanupScheduler, SweepReport};
pub use config::{CleanupConfig, MutexConfig, ProcessorConfig};
pub use data_controller::{DataController, JobQuery};
pub use error::{ProcessorError, Result};
pub use mutex::{MutexRecord, TableMutex};
pub use resource_manager::{
    BearerToken, HmacSigner, HttpResourceManager, NoAuth, RequestSigner,
    ResourceManager, ResourceManagerExt,
};
pub use table::{InMemoryTable, Table};
#[cfg(feature = "postgres")]
pub use table::PostgresTable;
pub use worker::{
    HttpWorkerInvoker, JobOperation, JobProcessor, LocalWorkerInvoker,
    OperationOutcome, WorkerInvoker, WorkerRequest,
};
