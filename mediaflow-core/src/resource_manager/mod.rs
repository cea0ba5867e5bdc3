//! Client for remote resources owned by other services: job profiles,
//! service registrations and job assignments.
//!
//! [`ResourceManager`] works on raw JSON so it stays object safe and can be
//! injected as `Arc<dyn ResourceManager>`; [`ResourceManagerExt`] layers the
//! typed API on top for every [`Resource`].

pub mod auth;
pub mod http;

use async_trait::async_trait;
use mediaflow_model::{Notification, Resource};
use serde_json::Value;

use crate::error::{ProcessorError, Result};

pub use auth::{BearerToken, HmacSigner, NoAuth, RequestSigner};
pub use http::HttpResourceManager;

#[async_trait]
pub trait ResourceManager: Send + Sync {
    /// URL of the collection serving `resource_type`.
    async fn resolve_endpoint(&self, resource_type: &str) -> Result<String>;

    /// Fetches a resource; a missing resource is `Ok(None)`.
    async fn get_value(&self, url: &str) -> Result<Option<Value>>;

    /// Creates a resource in the collection at `endpoint`, returning the
    /// stored representation.
    async fn create_value(&self, endpoint: &str, value: Value) -> Result<Value>;

    async fn update_value(&self, url: &str, value: Value) -> Result<Value>;

    async fn delete_value(&self, url: &str) -> Result<()>;

    async fn query_values(
        &self,
        resource_type: &str,
        filter: &[(String, String)],
    ) -> Result<Vec<Value>>;

    /// Triggers a named action on a resource (`POST {url}/{action}`).
    async fn invoke_action(&self, url: &str, action: &str) -> Result<()>;

    async fn send_notification(
        &self,
        endpoint: &str,
        notification: &Notification,
    ) -> Result<()>;
}

/// Typed helpers for any [`ResourceManager`].
#[async_trait]
pub trait ResourceManagerExt: ResourceManager {
    async fn get<T: Resource>(&self, url: &str) -> Result<Option<T>> {
        match self.get_value(url).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Creates the resource in the collection registered for its type.
    async fn create<T: Resource>(&self, resource: &T) -> Result<T> {
        let endpoint = self.resolve_endpoint(T::RESOURCE_TYPE).await?;
        self.create_at(&endpoint, resource).await
    }

    async fn create_at<T: Resource>(&self, endpoint: &str, resource: &T) -> Result<T> {
        let created = self
            .create_value(endpoint, serde_json::to_value(resource)?)
            .await?;
        Ok(serde_json::from_value(created)?)
    }

    async fn update<T: Resource>(&self, resource: &T) -> Result<T> {
        let url = resource_url(resource)?;
        let updated = self
            .update_value(&url, serde_json::to_value(resource)?)
            .await?;
        Ok(serde_json::from_value(updated)?)
    }

    async fn delete<T: Resource>(&self, resource: &T) -> Result<()> {
        let url = resource_url(resource)?;
        self.delete_value(&url).await
    }

    async fn query<T: Resource>(&self, filter: &[(&str, &str)]) -> Result<Vec<T>> {
        let filter: Vec<(String, String)> = filter
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.query_values(T::RESOURCE_TYPE, &filter)
            .await?
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(ProcessorError::from))
            .collect()
    }
}

impl<R: ResourceManager + ?Sized> ResourceManagerExt for R {}

fn resource_url<T: Resource>(resource: &T) -> Result<String> {
    resource.id().map(str::to_string).ok_or_else(|| {
        ProcessorError::Internal(format!(
            "{} has no id and cannot be addressed",
            T::RESOURCE_TYPE
        ))
    })
}
