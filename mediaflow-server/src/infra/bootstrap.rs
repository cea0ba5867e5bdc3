//! Turns a [`Config`] into live collaborators.

use std::sync::Arc;

use anyhow::Context;
use mediaflow_core::{
    BearerToken, HmacSigner, HttpResourceManager, HttpWorkerInvoker,
    InMemoryTable, LocalWorkerInvoker, NoAuth, RequestSigner, ResourceManager,
    Table, WorkerInvoker,
};
use tracing::{info, warn};

use crate::infra::{
    app_state::AppState,
    config::{AuthSettings, Config, TableConfig, WorkerTarget},
};

pub async fn open_table(config: &TableConfig) -> anyhow::Result<Arc<dyn Table>> {
    match config.database_url.as_deref() {
        Some(url) => open_postgres(config, url).await,
        None => {
            warn!("using the in-memory job table");
            Ok(Arc::new(InMemoryTable::new()))
        }
    }
}

#[cfg(feature = "postgres")]
async fn open_postgres(
    config: &TableConfig,
    url: &str,
) -> anyhow::Result<Arc<dyn Table>> {
    use mediaflow_core::PostgresTable;
    use sqlx::postgres::PgPoolOptions;

    if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
        anyhow::bail!(
            "Invalid database URL: must start with postgres:// or postgresql://"
        );
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .connect(url)
        .await
        .context("failed to connect to PostgreSQL")?;
    let table = PostgresTable::new(pool, &config.name)
        .await
        .with_context(|| format!("failed to prepare job table {}", config.name))?;
    Ok(Arc::new(table))
}

#[cfg(not(feature = "postgres"))]
async fn open_postgres(
    _config: &TableConfig,
    _url: &str,
) -> anyhow::Result<Arc<dyn Table>> {
    anyhow::bail!("DATABASE_URL is set but this build has no postgres support")
}

pub fn build_signer(auth: &AuthSettings) -> Arc<dyn RequestSigner> {
    match auth {
        AuthSettings::None => Arc::new(NoAuth),
        AuthSettings::Bearer { token } => Arc::new(BearerToken::new(token.clone())),
        AuthSettings::Hmac { key_id, secret } => {
            Arc::new(HmacSigner::new(key_id.clone(), secret.as_bytes()))
        }
    }
}

pub fn build_resource_manager(
    config: &Config,
    signer: Arc<dyn RequestSigner>,
) -> anyhow::Result<Arc<dyn ResourceManager>> {
    let services_url = config
        .resources
        .services_url
        .clone()
        .context("SERVICES_URL must point at the service registry")?;
    let manager = HttpResourceManager::new(
        services_url,
        signer,
        config.resources.request_timeout(),
    )
    .context("failed to build resource manager client")?;
    Ok(Arc::new(manager))
}

/// Connects every collaborator named by `config`.
pub async fn build_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let table = open_table(&config.table).await?;
    let signer = build_signer(&config.resources.auth);
    let resources = build_resource_manager(&config, Arc::clone(&signer))?;

    let remote = match &config.worker.target {
        WorkerTarget::Local => None,
        WorkerTarget::Remote(url) => Some(
            HttpWorkerInvoker::new(url.clone(), signer, config.worker.request_timeout())
                .context("failed to build worker client")?,
        ),
    };

    info!(
        table = %config.table.name,
        durable = config.table.database_url.is_some(),
        worker = ?config.worker.target,
        "job processor wired"
    );

    Ok(AppState::new(config, table, resources, move |processor| {
        match remote {
            Some(remote) => Arc::new(remote) as Arc<dyn WorkerInvoker>,
            None => Arc::new(LocalWorkerInvoker::new(processor)),
        }
    }))
}
