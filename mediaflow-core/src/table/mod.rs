//! Key-value document table with conditional writes.
//!
//! Items are JSON documents keyed by a slash-separated path such as
//! `/jobs/{guid}` or `/jobs/{guid}/executions/{guid}`. Queries address a
//! parent path and optionally every descendant below it. Provider adapters
//! implement [`Table`]; the rest of the crate never talks to a backend
//! directly.

pub mod filter;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Value;

use crate::error::{ProcessorError, Result};

pub use filter::{FilterExpression, FilterOperator, FilterValue};
pub use memory::InMemoryTable;
#[cfg(feature = "postgres")]
pub use postgres::PostgresTable;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    pub property: String,
    pub order: SortOrder,
}

impl SortKey {
    pub fn descending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            order: SortOrder::Descending,
        }
    }

    pub fn ascending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            order: SortOrder::Ascending,
        }
    }
}

/// Precondition for a conditional write, evaluated atomically against the
/// item currently stored under the same id.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteCondition {
    /// Only write when nothing is stored.
    Absent,
    /// Write when nothing is stored or the stored item matches.
    AbsentOr(FilterExpression),
    /// Only write over a stored item that matches.
    Matches(FilterExpression),
}

impl WriteCondition {
    pub fn allows(&self, existing: Option<&Value>) -> bool {
        match (self, existing) {
            (WriteCondition::Absent, existing) => existing.is_none(),
            (WriteCondition::AbsentOr(_), None) => true,
            (WriteCondition::AbsentOr(filter), Some(item)) => filter.matches(item),
            (WriteCondition::Matches(_), None) => false,
            (WriteCondition::Matches(filter), Some(item)) => filter.matches(item),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub path: String,
    pub include_descendants: bool,
    pub filter: Option<FilterExpression>,
    pub sort: Option<SortKey>,
    pub page_size: Option<usize>,
    pub page_start_token: Option<String>,
}

impl Query {
    pub fn children_of(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// True when `id` falls under this query's path.
    pub fn covers(&self, id: &str) -> bool {
        let prefix = self.path.trim_end_matches('/');
        if self.include_descendants {
            id.strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1)
        } else {
            parent_of(id) == prefix
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueryResults<T> {
    pub results: Vec<T>,
    pub next_page_start_token: Option<String>,
}

impl<T> QueryResults<T> {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            next_page_start_token: None,
        }
    }

    pub fn try_map<U, E>(
        self,
        f: impl FnMut(T) -> std::result::Result<U, E>,
    ) -> std::result::Result<QueryResults<U>, E> {
        Ok(QueryResults {
            results: self.results.into_iter().map(f).collect::<std::result::Result<_, _>>()?,
            next_page_start_token: self.next_page_start_token,
        })
    }
}

/// Parent path of an item id; `/jobs/a/executions/b` -> `/jobs/a/executions`.
pub fn parent_of(id: &str) -> &str {
    let trimmed = id.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[..idx],
        None => "",
    }
}

/// Opaque continuation token carrying the offset of the next page.
pub(crate) fn encode_page_token(offset: usize) -> String {
    URL_SAFE_NO_PAD.encode(format!("o:{offset}"))
}

pub(crate) fn decode_page_token(token: &str) -> Result<usize> {
    let invalid = || ProcessorError::Storage(format!("invalid page token: {token}"));
    let raw = URL_SAFE_NO_PAD.decode(token).map_err(|_| invalid())?;
    let raw = String::from_utf8(raw).map_err(|_| invalid())?;
    raw.strip_prefix("o:")
        .and_then(|offset| offset.parse().ok())
        .ok_or_else(invalid)
}

#[async_trait]
pub trait Table: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Value>>;

    /// Unconditional upsert.
    async fn put(&self, id: &str, item: Value) -> Result<()>;

    /// Upsert guarded by `condition`; returns whether the write happened.
    async fn put_if(
        &self,
        id: &str,
        item: Value,
        condition: &WriteCondition,
    ) -> Result<bool>;

    /// Removes the item if present. Deleting a missing id is not an error.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Removes the item only if it matches; returns whether it was removed.
    async fn delete_if(&self, id: &str, condition: &FilterExpression) -> Result<bool>;

    async fn query(&self, query: &Query) -> Result<QueryResults<Value>>;
}
