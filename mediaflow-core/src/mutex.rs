//! Lease-based mutual exclusion on top of a [`Table`].
//!
//! A lock is a record under `/mutexes/{name}` written with a conditional put
//! that only succeeds when no record exists or the existing lease has
//! expired. Release is a conditional delete keyed on the holder, so a holder
//! whose lease was reclaimed can never release the new owner's lock.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use mediaflow_model::timestamp;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    config::MutexConfig,
    error::{ProcessorError, Result},
    table::{FilterExpression, FilterOperator, Table, WriteCondition},
};

pub const MUTEX_PATH: &str = "/mutexes";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutexRecord {
    pub name: String,
    pub holder: String,
    #[serde(with = "timestamp")]
    pub acquired_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub expiry: DateTime<Utc>,
}

pub struct TableMutex {
    table: Arc<dyn Table>,
    name: String,
    holder: String,
    config: MutexConfig,
}

impl fmt::Debug for TableMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableMutex")
            .field("name", &self.name)
            .field("holder", &self.holder)
            .field("lease_ms", &self.config.lease_ms)
            .finish()
    }
}

impl TableMutex {
    pub fn new(
        table: Arc<dyn Table>,
        name: impl Into<String>,
        holder: impl Into<String>,
        config: MutexConfig,
    ) -> Self {
        Self {
            table,
            name: name.into(),
            holder: holder.into(),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Table key of the lock record. Names may contain `/`, so they are
    /// percent-encoded into a single path segment.
    pub fn record_id(&self) -> String {
        let encoded: String =
            url::form_urlencoded::byte_serialize(self.name.as_bytes()).collect();
        format!("{MUTEX_PATH}/{encoded}")
    }

    /// Single acquisition attempt.
    pub async fn try_lock(&self) -> Result<bool> {
        let now = timestamp::now();
        let lease = chrono::Duration::from_std(self.config.lease())
            .map_err(|e| ProcessorError::Configuration(format!("mutex lease: {e}")))?;
        let record = MutexRecord {
            name: self.name.clone(),
            holder: self.holder.clone(),
            acquired_at: now,
            expiry: now + lease,
        };
        let expired = FilterExpression::condition("expiry", FilterOperator::Lt, now);

        self.table
            .put_if(
                &self.record_id(),
                serde_json::to_value(&record)?,
                &WriteCondition::AbsentOr(expired),
            )
            .await
    }

    /// Acquires the lock, retrying with jittered exponential backoff until
    /// the configured acquire timeout elapses.
    pub async fn lock(&self) -> Result<()> {
        let started = Instant::now();
        let deadline = self.config.acquire_timeout();
        let mut attempt: u32 = 0;

        loop {
            if self.try_lock().await? {
                debug!(mutex = %self.name, holder = %self.holder, attempts = attempt + 1, "mutex acquired");
                return Ok(());
            }

            attempt += 1;
            let waited = started.elapsed();
            if waited >= deadline {
                warn!(mutex = %self.name, holder = %self.holder, ?waited, "mutex acquisition timed out");
                return Err(ProcessorError::MutexTimeout {
                    name: self.name.clone(),
                    waited,
                });
            }

            let delay = self.retry_delay(attempt).min(deadline - waited);
            tokio::time::sleep(delay).await;
        }
    }

    /// Releases the lock if this holder still owns it. Returns whether a
    /// record was removed.
    pub async fn unlock(&self) -> Result<bool> {
        let released = self
            .table
            .delete_if(&self.record_id(), &FilterExpression::eq("holder", self.holder.as_str()))
            .await?;
        if released {
            debug!(mutex = %self.name, holder = %self.holder, "mutex released");
        } else {
            warn!(mutex = %self.name, holder = %self.holder, "mutex was no longer held at release");
        }
        Ok(released)
    }

    /// Runs `work` while holding the lock. The lock is released on every
    /// path; a release failure never masks the outcome of `work`.
    pub async fn run_locked<T, F>(&self, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.lock().await?;
        let outcome = work.await;

        if let Err(err) = self.unlock().await {
            warn!(mutex = %self.name, holder = %self.holder, error = %err, "failed to release mutex");
        }
        outcome
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay(attempt);
        let ratio = f64::from(self.config.jitter_ratio.clamp(0.0, 1.0));
        if ratio == 0.0 {
            return base;
        }
        let factor = 1.0 + rand::rng().random_range(-ratio..=ratio);
        base.mul_f64(factor)
    }
}
