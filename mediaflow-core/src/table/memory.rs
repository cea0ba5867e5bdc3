use std::{collections::BTreeMap, fmt, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{
    FilterExpression, Query, QueryResults, SortOrder, Table, WriteCondition,
    decode_page_token, encode_page_token, filter::compare_documents,
};
use crate::error::Result;

/// Process-local table. Conditional writes are atomic because every write
/// takes the same lock.
#[derive(Clone, Default)]
pub struct InMemoryTable {
    items: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl fmt::Debug for InMemoryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("InMemoryTable");
        match self.items.try_read() {
            Ok(items) => debug.field("items", &items.len()),
            Err(_) => debug.field("items", &"<locked>"),
        };
        debug.finish()
    }
}

impl InMemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl Table for InMemoryTable {
    async fn get(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.items.read().await.get(id).cloned())
    }

    async fn put(&self, id: &str, item: Value) -> Result<()> {
        self.items.write().await.insert(id.to_string(), item);
        Ok(())
    }

    async fn put_if(
        &self,
        id: &str,
        item: Value,
        condition: &WriteCondition,
    ) -> Result<bool> {
        let mut items = self.items.write().await;
        if !condition.allows(items.get(id)) {
            return Ok(false);
        }
        items.insert(id.to_string(), item);
        Ok(true)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.items.write().await.remove(id);
        Ok(())
    }

    async fn delete_if(&self, id: &str, condition: &FilterExpression) -> Result<bool> {
        let mut items = self.items.write().await;
        match items.get(id) {
            Some(item) if condition.matches(item) => {
                items.remove(id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn query(&self, query: &Query) -> Result<QueryResults<Value>> {
        let offset = match &query.page_start_token {
            Some(token) => decode_page_token(token)?,
            None => 0,
        };

        let mut matched: Vec<Value> = {
            let items = self.items.read().await;
            items
                .iter()
                .filter(|(id, _)| query.covers(id))
                .filter(|(_, item)| {
                    query.filter.as_ref().is_none_or(|f| f.matches(item))
                })
                .map(|(_, item)| item.clone())
                .collect()
        };

        if let Some(sort) = &query.sort {
            matched.sort_by(|a, b| {
                let ordering = compare_documents(a, b, &sort.property);
                match sort.order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
        }

        let total = matched.len();
        let page_size = query.page_size.unwrap_or(total.max(1));
        let results: Vec<Value> =
            matched.into_iter().skip(offset).take(page_size).collect();
        let next_offset = offset + results.len();
        let next_page_start_token = (next_offset < total && !results.is_empty())
            .then(|| encode_page_token(next_offset));

        Ok(QueryResults {
            results,
            next_page_start_token,
        })
    }
}
