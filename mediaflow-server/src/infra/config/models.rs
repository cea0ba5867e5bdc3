use std::{fmt, path::PathBuf, time::Duration};

use mediaflow_core::ProcessorConfig;
use serde::{Deserialize, Serialize};

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    /// Base URL job ids are minted under and backends call back to.
    pub public_url: String,
    pub table: TableConfig,
    pub resources: ResourceManagerConfig,
    pub worker: WorkerConfig,
    pub processor: ProcessorConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    pub name: String,
    /// Postgres connection string; the in-memory table is used when absent.
    pub database_url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceManagerConfig {
    pub services_url: Option<String>,
    pub auth: AuthSettings,
    pub request_timeout_secs: u64,
}

impl ResourceManagerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Credentials attached to outbound resource-manager and worker calls.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthSettings {
    #[default]
    None,
    Bearer {
        token: String,
    },
    Hmac {
        key_id: String,
        secret: String,
    },
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthSettings::None => f.write_str("None"),
            AuthSettings::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
            AuthSettings::Hmac { key_id, .. } => f
                .debug_struct("Hmac")
                .field("key_id", key_id)
                .field("secret", &"<redacted>")
                .finish(),
        }
    }
}

/// Where job operations run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerTarget {
    /// In this process.
    Local,
    /// POSTed to a remote worker endpoint.
    Remote(String),
}

impl WorkerTarget {
    /// `local` (or blank) selects the in-process worker; anything else is the
    /// remote worker's URL.
    pub fn from_function_id(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("local") {
            WorkerTarget::Local
        } else {
            WorkerTarget::Remote(trimmed.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub target: WorkerTarget,
    pub request_timeout_secs: u64,
}

impl WorkerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

/// Non-fatal findings collected while composing the configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push(&mut self, message: impl Into<String>) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint(
        &mut self,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
