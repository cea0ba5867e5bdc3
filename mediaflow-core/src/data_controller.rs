//! Persistence facade for jobs and their executions.
//!
//! Jobs live under `/jobs/{guid}` and executions under
//! `/jobs/{guid}/executions/{guid}`, so deleting a job can sweep its
//! execution history with one descendant query.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use mediaflow_model::{
    ExecutionId, Job, JobExecution, JobId, JobStatus, NewJob, timestamp,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    config::MutexConfig,
    error::{ProcessorError, Result},
    mutex::TableMutex,
    table::{
        FilterExpression, FilterOperator, Query, QueryResults, SortKey,
        SortOrder, Table, WriteCondition,
    },
};

pub const JOBS_PATH: &str = "/jobs";

/// Filter for [`DataController::query_jobs`]. Date bounds are inclusive.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JobQuery {
    pub status: Option<JobStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub order: SortOrder,
    pub page_size: Option<usize>,
    pub page_start_token: Option<String>,
}

impl JobQuery {
    pub fn with_status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    fn filter(&self) -> Option<FilterExpression> {
        let mut conditions = Vec::new();
        if let Some(status) = self.status {
            conditions.push(FilterExpression::eq("status", status.as_str()));
        }
        if let Some(from) = self.from {
            conditions.push(FilterExpression::condition(
                "dateCreated",
                FilterOperator::Ge,
                from,
            ));
        }
        if let Some(to) = self.to {
            conditions.push(FilterExpression::condition(
                "dateCreated",
                FilterOperator::Le,
                to,
            ));
        }
        match conditions.len() {
            0 => None,
            1 => conditions.pop(),
            _ => Some(FilterExpression::And(conditions)),
        }
    }
}

#[derive(Clone)]
pub struct DataController {
    table: Arc<dyn Table>,
    public_url: String,
    mutex_config: MutexConfig,
}

impl fmt::Debug for DataController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataController")
            .field("public_url", &self.public_url)
            .field("mutex_config", &self.mutex_config)
            .finish_non_exhaustive()
    }
}

impl DataController {
    pub fn new(
        table: Arc<dyn Table>,
        public_url: impl Into<String>,
        mutex_config: MutexConfig,
    ) -> Self {
        Self {
            table,
            public_url: public_url.into().trim_end_matches('/').to_string(),
            mutex_config,
        }
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    /// Full job id for a bare guid taken from a request path.
    pub fn job_id(&self, guid: &str) -> JobId {
        JobId::for_guid(&self.public_url, guid)
    }

    fn job_key(job_id: &JobId) -> String {
        format!("{JOBS_PATH}/{}", job_id.guid())
    }

    fn mutex_name(job_id: &JobId) -> String {
        format!("job:{}", job_id.guid())
    }

    fn execution_key(job_id: &JobId, execution_id: &ExecutionId) -> String {
        format!("{}/executions/{}", Self::job_key(job_id), execution_id.guid())
    }

    /// Loads the job stored under `job_id`'s guid. An id minted under another
    /// base URL that happens to share the guid does not name this job.
    pub async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>> {
        let job: Option<Job> = self
            .table
            .get(&Self::job_key(job_id))
            .await?
            .map(serde_json::from_value)
            .transpose()?;
        Ok(job.filter(|job| {
            let same = job.id == *job_id;
            if !same {
                debug!(requested = %job_id, stored = %job.id, "job id does not match stored record");
            }
            same
        }))
    }

    /// Like [`get_job`](Self::get_job) but a missing job is an error.
    pub async fn require_job(&self, job_id: &JobId) -> Result<Job> {
        self.get_job(job_id)
            .await?
            .ok_or_else(|| ProcessorError::job_not_found(job_id.as_str()))
    }

    /// Stores a freshly submitted job with status `New` under a new id.
    pub async fn add_job(&self, request: NewJob) -> Result<Job> {
        let job = Job::new(JobId::generate(&self.public_url), request, timestamp::now());
        let inserted = self
            .table
            .put_if(
                &Self::job_key(&job.id),
                serde_json::to_value(&job)?,
                &WriteCondition::Absent,
            )
            .await?;
        if !inserted {
            return Err(ProcessorError::Internal(format!(
                "job id collision for {}",
                job.id
            )));
        }
        info!(job_id = %job.id, job_type = %job.job_type, "job created");
        Ok(job)
    }

    /// Upserts the job, stamping `dateModified`.
    pub async fn put_job(&self, mut job: Job) -> Result<Job> {
        job.date_modified = timestamp::now();
        self.table
            .put(&Self::job_key(&job.id), serde_json::to_value(&job)?)
            .await?;
        debug!(job_id = %job.id, status = %job.status, "job persisted");
        Ok(job)
    }

    /// Removes the job and every execution recorded for it.
    pub async fn delete_job(&self, job_id: &JobId) -> Result<()> {
        let key = Self::job_key(job_id);
        let mut query = Query {
            include_descendants: true,
            ..Query::children_of(key.clone())
        };

        // Collect first: deleting while paging would shift offsets.
        let mut doomed = Vec::new();
        loop {
            let page = self.table.query(&query).await?;
            for item in &page.results {
                if let Some(id) = item.get("id").and_then(Value::as_str) {
                    doomed.push(Self::execution_key(job_id, &ExecutionId::new(id)));
                }
            }
            match page.next_page_start_token {
                Some(token) => query.page_start_token = Some(token),
                None => break,
            }
        }

        for execution_key in &doomed {
            self.table.delete(execution_key).await?;
        }
        self.table.delete(&key).await?;
        info!(job_id = %job_id, executions = doomed.len(), "job deleted");
        Ok(())
    }

    /// One page of jobs, newest first unless `query.order` says otherwise.
    pub async fn query_jobs(&self, query: &JobQuery) -> Result<QueryResults<Job>> {
        let table_query = Query {
            filter: query.filter(),
            sort: Some(SortKey {
                property: "dateCreated".into(),
                order: query.order,
            }),
            page_size: query.page_size,
            page_start_token: query.page_start_token.clone(),
            ..Query::children_of(JOBS_PATH)
        };
        let page = self.table.query(&table_query).await?;
        Ok(page.try_map(serde_json::from_value)?)
    }

    pub async fn get_execution(
        &self,
        job_id: &JobId,
        execution_id: &ExecutionId,
    ) -> Result<Option<JobExecution>> {
        self.table
            .get(&Self::execution_key(job_id, execution_id))
            .await?
            .map(serde_json::from_value)
            .transpose()
            .map_err(ProcessorError::from)
    }

    /// Every execution of the job, newest first.
    pub async fn list_executions(&self, job_id: &JobId) -> Result<Vec<JobExecution>> {
        let mut query = Query {
            sort: Some(SortKey::descending("dateCreated")),
            ..Query::children_of(format!("{}/executions", Self::job_key(job_id)))
        };
        let mut executions = Vec::new();
        loop {
            let page = self.table.query(&query).await?;
            for item in page.results {
                executions.push(serde_json::from_value(item)?);
            }
            match page.next_page_start_token {
                Some(token) => query.page_start_token = Some(token),
                None => break,
            }
        }
        Ok(executions)
    }

    pub async fn put_execution(
        &self,
        job_id: &JobId,
        mut execution: JobExecution,
    ) -> Result<JobExecution> {
        execution.date_modified = timestamp::now();
        self.table
            .put(
                &Self::execution_key(job_id, &execution.id),
                serde_json::to_value(&execution)?,
            )
            .await?;
        Ok(execution)
    }

    /// Mutex guarding one job's record. It is named after the record key, so
    /// every id that resolves to the same record shares one lock.
    pub fn create_mutex(&self, job_id: &JobId, holder: impl Into<String>) -> TableMutex {
        TableMutex::new(
            self.table.clone(),
            Self::mutex_name(job_id),
            holder,
            self.mutex_config,
        )
    }
}
