use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use url::Url;

use super::{
    models::{
        AuthSettings, Config, ConfigMetadata, ConfigWarnings,
        ResourceManagerConfig, ServerConfig, TableConfig, WorkerConfig,
        WorkerTarget,
    },
    sources::{EnvConfig, FileConfig},
};

const DEFAULT_CONFIG_LOCATIONS: &[&str] =
    &["mediaflow.toml", "config/mediaflow.toml"];

const DEFAULT_TABLE_NAME: &str = "mediaflow_jobs";

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Loads `.env`, the optional TOML file and the process environment.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Composes the configuration from an already gathered environment.
    pub fn load_with_env(
        &self,
        env: EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        self.compose_config(file_config, env, config_path)
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env.config_path.clone());

        let path = match explicit {
            Some(path) if !path.exists() => {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            Some(path) => path,
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists())
            {
                Some(path) => path,
                None => return Ok((None, None)),
            },
        };

        let contents =
            fs::read_to_string(&path).map_err(|err| ConfigLoadError::Io {
                path: path.clone(),
                source: err,
            })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
                path: path.clone(),
                source: err,
            })?;

        Ok((Some(file_config), Some(path)))
    }

    fn compose_config(
        &self,
        file_config: Option<FileConfig>,
        env: EnvConfig,
        config_path: Option<PathBuf>,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();

        if file_config.is_none() {
            warnings.push_with_hint(
                "No mediaflow.toml detected; falling back to environment variables",
                "Pass --config or set MEDIAFLOW_CONFIG_PATH to use a file",
            );
        }

        let FileConfig {
            public_url: file_public_url,
            server: file_server,
            table: file_table,
            resources: file_resources,
            worker: file_worker,
            processor: file_processor,
        } = file_config.unwrap_or_default();

        let server = ServerConfig {
            host: env
                .server_host
                .clone()
                .or(file_server.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env.server_port.or(file_server.port).unwrap_or(3000),
        };

        let public_url = match env.public_url.clone().or(file_public_url) {
            Some(raw) => validate_url("PUBLIC_URL", &raw)?,
            None => {
                let fallback = default_public_url(&server);
                warnings.push_with_hint(
                    format!("PUBLIC_URL not set; job ids will be minted under {fallback}"),
                    "Set PUBLIC_URL to the address backends can reach",
                );
                fallback
            }
        };

        let table_name = env
            .table_name
            .clone()
            .or(file_table.name)
            .unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string());
        if !is_valid_table_name(&table_name) {
            return Err(ConfigLoadError::InvalidValue {
                key: "TABLE_NAME",
                value: table_name,
                reason: "use letters, digits and underscores, starting with a letter",
            });
        }
        let table = TableConfig {
            name: table_name,
            database_url: env.database_url.clone().or(file_table.database_url),
            max_connections: env
                .database_max_connections
                .or(file_table.max_connections)
                .unwrap_or(10),
        };
        if table.database_url.is_none() {
            warnings.push_with_hint(
                "DATABASE_URL not set; jobs are kept in memory and lost on restart",
                "Point DATABASE_URL at PostgreSQL for durable storage",
            );
        }

        let services_url = env
            .services_url
            .clone()
            .or(file_resources.services_url)
            .map(|raw| validate_url("SERVICES_URL", &raw))
            .transpose()?;
        let auth = match resolve_env_auth(&env)? {
            Some(auth) => auth,
            None => file_resources.auth.unwrap_or_default(),
        };
        let resources = ResourceManagerConfig {
            services_url,
            auth,
            request_timeout_secs: env
                .resource_timeout_secs
                .or(file_resources.request_timeout_secs)
                .unwrap_or(30),
        };

        let target = WorkerTarget::from_function_id(
            env.worker_function_id
                .as_deref()
                .or(file_worker.function_id.as_deref())
                .unwrap_or("local"),
        );
        if let WorkerTarget::Remote(url) = &target {
            validate_url("WORKER_FUNCTION_ID", url)?;
        }
        let worker = WorkerConfig {
            target,
            request_timeout_secs: env
                .worker_timeout_secs
                .or(file_worker.request_timeout_secs)
                .unwrap_or(60),
        };

        let mut processor = file_processor.unwrap_or_default();
        if let Some(days) = env.retention_days {
            processor.cleanup.retention_days = days;
        }
        if let Some(secs) = env.cleanup_interval_secs {
            processor.cleanup.interval_secs = secs;
        }
        if processor.cleanup.interval_secs == 0 {
            warnings.push("cleanup interval of 0s raised to 1s");
            processor.cleanup.interval_secs = 1;
        }
        if !processor.cleanup.is_enabled() {
            warnings.push("job retention is disabled; finished jobs are never deleted");
        }

        let config = Config {
            server,
            public_url,
            table,
            resources,
            worker,
            processor,
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded: false,
            },
        };

        Ok(ConfigLoad { config, warnings })
    }
}

fn resolve_env_auth(env: &EnvConfig) -> Result<Option<AuthSettings>, ConfigLoadError> {
    let Some(kind) = env.services_auth_type.as_deref() else {
        return Ok(None);
    };
    let missing = |key: &'static str| ConfigLoadError::InvalidValue {
        key,
        value: String::new(),
        reason: "required by SERVICES_AUTH_TYPE",
    };

    match kind.to_ascii_lowercase().as_str() {
        "none" => Ok(Some(AuthSettings::None)),
        "bearer" => Ok(Some(AuthSettings::Bearer {
            token: env
                .services_auth_token
                .clone()
                .ok_or_else(|| missing("SERVICES_AUTH_TOKEN"))?,
        })),
        "hmac" => Ok(Some(AuthSettings::Hmac {
            key_id: env
                .services_auth_key_id
                .clone()
                .ok_or_else(|| missing("SERVICES_AUTH_KEY_ID"))?,
            secret: env
                .services_auth_secret
                .clone()
                .ok_or_else(|| missing("SERVICES_AUTH_SECRET"))?,
        })),
        other => Err(ConfigLoadError::InvalidValue {
            key: "SERVICES_AUTH_TYPE",
            value: other.to_string(),
            reason: "expected none, bearer or hmac",
        }),
    }
}

fn validate_url(key: &'static str, raw: &str) -> Result<String, ConfigLoadError> {
    let parsed = Url::parse(raw.trim())
        .map_err(|source| ConfigLoadError::InvalidUrl { key, source })?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

fn default_public_url(server: &ServerConfig) -> String {
    let host = match server.host.as_str() {
        "0.0.0.0" | "::" => "localhost",
        other => other,
    };
    format!("http://{host}:{}", server.port)
}

fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file not found at {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{key} is not a valid URL: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid {key} value {value:?}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

impl ConfigLoadError {
    /// File the error originated from, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigLoadError::MissingConfig { path }
            | ConfigLoadError::Io { path, .. }
            | ConfigLoadError::Parse { path, .. } => Some(path),
            _ => None,
        }
    }
}
