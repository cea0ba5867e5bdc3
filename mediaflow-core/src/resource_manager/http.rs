use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use mediaflow_model::{Notification, Resource, Service};
use reqwest::{Client, Method};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{RequestSigner, ResourceManager};
use crate::error::{ProcessorError, Result};

const ERROR_BODY_LIMIT: usize = 512;

/// [`ResourceManager`] speaking JSON over HTTP.
///
/// Collection endpoints are discovered from the service registry at
/// `services_url` and cached until [`refresh_endpoints`] runs again.
///
/// [`refresh_endpoints`]: HttpResourceManager::refresh_endpoints
pub struct HttpResourceManager {
    client: Client,
    services_url: String,
    signer: Arc<dyn RequestSigner>,
    endpoints: RwLock<HashMap<String, String>>,
}

impl fmt::Debug for HttpResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResourceManager")
            .field("services_url", &self.services_url)
            .field("signer", &self.signer)
            .field(
                "cached_endpoints",
                &self.endpoints.try_read().map(|e| e.len()).unwrap_or(0),
            )
            .finish()
    }
}

impl HttpResourceManager {
    pub fn new(
        services_url: impl Into<String>,
        signer: Arc<dyn RequestSigner>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ProcessorError::Configuration(format!("failed to build HTTP client: {e}"))
        })?;
        Ok(Self::with_client(client, services_url, signer))
    }

    pub fn with_client(
        client: Client,
        services_url: impl Into<String>,
        signer: Arc<dyn RequestSigner>,
    ) -> Self {
        Self {
            client,
            services_url: services_url.into(),
            signer,
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    pub fn services_url(&self) -> &str {
        &self.services_url
    }

    /// Reloads the registry; returns the number of endpoints now known.
    pub async fn refresh_endpoints(&self) -> Result<usize> {
        let listing = self.send(Method::GET, &self.services_url, None, &[]).await?;
        let services: Vec<Service> = serde_json::from_value(into_list(
            &self.services_url,
            listing.unwrap_or(Value::Array(Vec::new())),
        )?)?;

        let mut discovered = HashMap::new();
        for service in &services {
            for endpoint in &service.resources {
                discovered
                    .entry(endpoint.resource_type.clone())
                    .or_insert_with(|| endpoint.http_endpoint.clone());
            }
        }

        let count = discovered.len();
        *self.endpoints.write().await = discovered;
        info!(services = services.len(), endpoints = count, "resource endpoints refreshed");
        Ok(count)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        query: &[(String, String)],
    ) -> Result<Option<Value>> {
        send_signed(&self.client, self.signer.as_ref(), method, url, body, query).await
    }
}

/// Sends one signed JSON request. Non-2xx answers become
/// [`ProcessorError::BackendCall`] carrying the status; an empty body is
/// `Ok(None)`.
pub(crate) async fn send_signed(
    client: &Client,
    signer: &dyn RequestSigner,
    method: Method,
    url: &str,
    body: Option<&Value>,
    query: &[(String, String)],
) -> Result<Option<Value>> {
    let mut builder = client.request(method.clone(), url);
    if !query.is_empty() {
        builder = builder.query(query);
    }
    if let Some(body) = body {
        builder = builder.json(body);
    }
    let mut request = builder
        .build()
        .map_err(|e| ProcessorError::backend(url, e.to_string()))?;
    signer.sign(&mut request)?;

    debug!(%method, url, "outbound request");
    let response = client
        .execute(request)
        .await
        .map_err(|e| ProcessorError::backend(url, e.to_string()))?;
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ProcessorError::backend(url, e.to_string()))?;

    if !status.is_success() {
        let text: String = String::from_utf8_lossy(&bytes)
            .chars()
            .take(ERROR_BODY_LIMIT)
            .collect();
        return Err(ProcessorError::BackendCall {
            url: url.to_string(),
            status: Some(status.as_u16()),
            message: if text.trim().is_empty() {
                status.to_string()
            } else {
                text
            },
        });
    }

    if bytes.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| ProcessorError::backend(url, format!("invalid JSON response: {e}")))
}

/// Accepts a bare array or a `{ "results": [...] }` page.
fn into_list(url: &str, value: Value) -> Result<Value> {
    match value {
        Value::Array(_) => Ok(value),
        Value::Object(mut page) => match page.remove("results") {
            Some(results @ Value::Array(_)) => Ok(results),
            _ => Err(ProcessorError::backend(url, "expected a list of resources")),
        },
        _ => Err(ProcessorError::backend(url, "expected a list of resources")),
    }
}

#[async_trait]
impl ResourceManager for HttpResourceManager {
    async fn resolve_endpoint(&self, resource_type: &str) -> Result<String> {
        if resource_type == Service::RESOURCE_TYPE {
            return Ok(self.services_url.clone());
        }
        if let Some(endpoint) = self.endpoints.read().await.get(resource_type) {
            return Ok(endpoint.clone());
        }

        self.refresh_endpoints().await?;
        self.endpoints
            .read()
            .await
            .get(resource_type)
            .cloned()
            .ok_or_else(|| ProcessorError::NotFound {
                kind: "resource endpoint",
                id: resource_type.to_string(),
            })
    }

    async fn get_value(&self, url: &str) -> Result<Option<Value>> {
        match self.send(Method::GET, url, None, &[]).await {
            Ok(value) => Ok(value),
            Err(ProcessorError::BackendCall {
                status: Some(404), ..
            }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn create_value(&self, endpoint: &str, value: Value) -> Result<Value> {
        self.send(Method::POST, endpoint, Some(&value), &[])
            .await?
            .ok_or_else(|| ProcessorError::backend(endpoint, "empty response to create"))
    }

    async fn update_value(&self, url: &str, value: Value) -> Result<Value> {
        let updated = self.send(Method::PUT, url, Some(&value), &[]).await?;
        Ok(updated.unwrap_or(value))
    }

    async fn delete_value(&self, url: &str) -> Result<()> {
        self.send(Method::DELETE, url, None, &[]).await?;
        Ok(())
    }

    async fn query_values(
        &self,
        resource_type: &str,
        filter: &[(String, String)],
    ) -> Result<Vec<Value>> {
        let endpoint = self.resolve_endpoint(resource_type).await?;
        let listing = self.send(Method::GET, &endpoint, None, filter).await?;
        match into_list(&endpoint, listing.unwrap_or(Value::Array(Vec::new())))? {
            Value::Array(items) => Ok(items),
            _ => Ok(Vec::new()),
        }
    }

    async fn invoke_action(&self, url: &str, action: &str) -> Result<()> {
        let target = format!("{}/{}", url.trim_end_matches('/'), action);
        self.send(Method::POST, &target, None, &[]).await?;
        Ok(())
    }

    async fn send_notification(
        &self,
        endpoint: &str,
        notification: &Notification,
    ) -> Result<()> {
        let body = serde_json::to_value(notification)?;
        self.send(Method::POST, endpoint, Some(&body), &[]).await?;
        Ok(())
    }
}
