use mediaflow_core::ProcessorConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::models::AuthSettings;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub table: FileTableConfig,
    #[serde(default)]
    pub resources: FileResourceConfig,
    #[serde(default)]
    pub worker: FileWorkerConfig,
    pub processor: Option<ProcessorConfig>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileTableConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileResourceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    pub auth: Option<AuthSettings>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileWorkerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub public_url: Option<String>,
    pub table_name: Option<String>,
    pub database_url: Option<String>,
    pub database_max_connections: Option<u32>,
    pub services_url: Option<String>,
    pub services_auth_type: Option<String>,
    pub services_auth_token: Option<String>,
    pub services_auth_key_id: Option<String>,
    pub services_auth_secret: Option<String>,
    pub resource_timeout_secs: Option<u64>,
    pub worker_function_id: Option<String>,
    pub worker_timeout_secs: Option<u64>,
    pub retention_days: Option<i64>,
    pub cleanup_interval_secs: Option<u64>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: var("MEDIAFLOW_CONFIG_PATH").map(PathBuf::from),
            server_host: var("SERVER_HOST"),
            server_port: parse_var("SERVER_PORT"),
            public_url: var("PUBLIC_URL"),
            table_name: var("TABLE_NAME"),
            database_url: var("DATABASE_URL"),
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS"),
            services_url: var("SERVICES_URL"),
            services_auth_type: var("SERVICES_AUTH_TYPE"),
            services_auth_token: var("SERVICES_AUTH_TOKEN"),
            services_auth_key_id: var("SERVICES_AUTH_KEY_ID"),
            services_auth_secret: var("SERVICES_AUTH_SECRET"),
            resource_timeout_secs: parse_var("SERVICES_TIMEOUT_SECS"),
            worker_function_id: var("WORKER_FUNCTION_ID"),
            worker_timeout_secs: parse_var("WORKER_TIMEOUT_SECS"),
            retention_days: parse_var("JOB_RETENTION_PERIOD_IN_DAYS"),
            cleanup_interval_secs: parse_var("JOB_CLEANUP_INTERVAL_SECS"),
        }
    }
}

/// Unset and blank variables are treated alike.
fn var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    var(name).and_then(|raw| raw.parse().ok())
}
