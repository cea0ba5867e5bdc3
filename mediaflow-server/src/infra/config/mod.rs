pub mod loader;
pub mod models;
pub mod sources;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{
    AuthSettings, Config, ConfigMetadata, ConfigWarning, ConfigWarnings,
    ResourceManagerConfig, ServerConfig, TableConfig, WorkerConfig,
    WorkerTarget,
};
