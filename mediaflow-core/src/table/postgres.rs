//! Postgres adapter: one JSONB document table per deployment.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;

use super::{
    FilterExpression, FilterValue, Query, QueryResults, SortOrder, Table,
    WriteCondition, decode_page_token, encode_page_token, parent_of,
};
use crate::error::{ProcessorError, Result};

#[derive(Clone)]
pub struct PostgresTable {
    pool: PgPool,
    table: String,
}

impl fmt::Debug for PostgresTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresTable")
            .field("table", &self.table)
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .finish()
    }
}

impl PostgresTable {
    /// Connects the adapter to `table_name`, verifying DB health and creating
    /// the table when it does not exist yet.
    pub async fn new(pool: PgPool, table_name: &str) -> Result<Self> {
        if !is_valid_identifier(table_name) {
            return Err(ProcessorError::Configuration(format!(
                "table name {table_name:?} must be alphanumeric/underscore"
            )));
        }

        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| {
                ProcessorError::Storage(format!(
                    "table adapter failed Postgres health check: {e}"
                ))
            })?;

        let table = Self {
            pool,
            table: table_name.to_string(),
        };
        table.ensure_schema().await?;
        info!(table = %table.table, "Postgres table adapter ready");
        Ok(table)
    }

    async fn ensure_schema(&self) -> Result<()> {
        let create = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{t}" (
                id TEXT PRIMARY KEY,
                parent TEXT NOT NULL,
                data JSONB NOT NULL
            )
            "#,
            t = self.table
        );
        sqlx::query(&create).execute(&self.pool).await?;

        let index = format!(
            r#"CREATE INDEX IF NOT EXISTS "{t}_parent_idx" ON "{t}" (parent)"#,
            t = self.table
        );
        sqlx::query(&index).execute(&self.pool).await?;
        Ok(())
    }

    fn insert_prefix<'a>(&self, id: &'a str, item: Value) -> QueryBuilder<'a, Postgres> {
        let mut qb = QueryBuilder::new(format!(
            r#"INSERT INTO "{}" (id, parent, data) VALUES ("#,
            self.table
        ));
        qb.push_bind(id)
            .push(", ")
            .push_bind(parent_of(id).to_string())
            .push(", ")
            .push_bind(item)
            .push(")");
        qb
    }
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= 48
}

fn property_path(property: &str) -> Vec<String> {
    property.split('.').map(str::to_string).collect()
}

/// Appends `expr` as a SQL predicate over the JSONB column `column`.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, expr: &FilterExpression, column: &str) {
    match expr {
        FilterExpression::Condition {
            property,
            operator,
            value,
        } => {
            let path = property_path(property);
            let op = operator.as_sql();
            match value {
                FilterValue::String(s) => {
                    qb.push(format!("({column} #>> "))
                        .push_bind(path)
                        .push("::text[]) ");
                    if op == "<>" {
                        qb.push("IS DISTINCT FROM ");
                    } else {
                        qb.push(format!("{op} "));
                    }
                    qb.push_bind(s.clone());
                }
                FilterValue::Number(n) => {
                    qb.push(format!("(CASE WHEN jsonb_typeof({column} #> "))
                        .push_bind(path.clone())
                        .push(format!("::text[]) = 'number' THEN ({column} #>> "))
                        .push_bind(path)
                        .push("::text[])::double precision END) ");
                    if op == "<>" {
                        qb.push("IS DISTINCT FROM ");
                    } else {
                        qb.push(format!("{op} "));
                    }
                    qb.push_bind(*n);
                }
                FilterValue::Bool(b) => {
                    qb.push(format!("({column} #>> "))
                        .push_bind(path)
                        .push("::text[]) ");
                    if op == "<>" {
                        qb.push("IS DISTINCT FROM ");
                    } else {
                        qb.push(format!("{op} "));
                    }
                    qb.push_bind(b.to_string());
                }
            }
        }
        FilterExpression::And(all) | FilterExpression::Or(all) => {
            let joiner = if matches!(expr, FilterExpression::And(_)) {
                " AND "
            } else {
                " OR "
            };
            if all.is_empty() {
                qb.push(if joiner == " AND " { "TRUE" } else { "FALSE" });
                return;
            }
            qb.push("(");
            for (idx, inner) in all.iter().enumerate() {
                if idx > 0 {
                    qb.push(joiner);
                }
                push_filter(qb, inner, column);
            }
            qb.push(")");
        }
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl Table for PostgresTable {
    async fn get(&self, id: &str) -> Result<Option<Value>> {
        let sql = format!(r#"SELECT data FROM "{}" WHERE id = $1"#, self.table);
        let data = sqlx::query_scalar::<_, Value>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(data)
    }

    async fn put(&self, id: &str, item: Value) -> Result<()> {
        let mut qb = self.insert_prefix(id, item);
        qb.push(
            " ON CONFLICT (id) DO UPDATE SET parent = EXCLUDED.parent, data = EXCLUDED.data",
        );
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn put_if(
        &self,
        id: &str,
        item: Value,
        condition: &WriteCondition,
    ) -> Result<bool> {
        let affected = match condition {
            WriteCondition::Absent => {
                let mut qb = self.insert_prefix(id, item);
                qb.push(" ON CONFLICT (id) DO NOTHING");
                qb.build().execute(&self.pool).await?.rows_affected()
            }
            WriteCondition::AbsentOr(filter) => {
                let mut qb = self.insert_prefix(id, item);
                qb.push(
                    " ON CONFLICT (id) DO UPDATE SET parent = EXCLUDED.parent, data = EXCLUDED.data WHERE ",
                );
                push_filter(&mut qb, filter, &format!(r#""{}".data"#, self.table));
                qb.build().execute(&self.pool).await?.rows_affected()
            }
            WriteCondition::Matches(filter) => {
                let mut qb = QueryBuilder::new(format!(r#"UPDATE "{}" SET data = "#, self.table));
                qb.push_bind(item).push(" WHERE id = ").push_bind(id).push(" AND ");
                push_filter(&mut qb, filter, "data");
                qb.build().execute(&self.pool).await?.rows_affected()
            }
        };
        Ok(affected == 1)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let sql = format!(r#"DELETE FROM "{}" WHERE id = $1"#, self.table);
        sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_if(&self, id: &str, condition: &FilterExpression) -> Result<bool> {
        let mut qb = QueryBuilder::new(format!(r#"DELETE FROM "{}" WHERE id = "#, self.table));
        qb.push_bind(id).push(" AND ");
        push_filter(&mut qb, condition, "data");
        let affected = qb.build().execute(&self.pool).await?.rows_affected();
        Ok(affected == 1)
    }

    async fn query(&self, query: &Query) -> Result<QueryResults<Value>> {
        let offset = match &query.page_start_token {
            Some(token) => decode_page_token(token)?,
            None => 0,
        };
        let prefix = query.path.trim_end_matches('/').to_string();

        let mut qb = QueryBuilder::new(format!(r#"SELECT data FROM "{}" WHERE "#, self.table));
        if query.include_descendants {
            qb.push("id LIKE ")
                .push_bind(format!("{}/_%", escape_like(&prefix)))
                .push(" ESCAPE '\\'");
        } else {
            qb.push("parent = ").push_bind(prefix);
        }

        if let Some(filter) = &query.filter {
            qb.push(" AND ");
            push_filter(&mut qb, filter, "data");
        }

        qb.push(" ORDER BY ");
        if let Some(sort) = &query.sort {
            qb.push("data #>> ")
                .push_bind(property_path(&sort.property))
                .push("::text[]");
            qb.push(match sort.order {
                SortOrder::Ascending => " ASC NULLS FIRST, ",
                SortOrder::Descending => " DESC NULLS LAST, ",
            });
        }
        qb.push("id ASC");

        // Fetch one extra row to learn whether another page exists.
        let page_size = query.page_size;
        if let Some(size) = page_size {
            qb.push(" LIMIT ").push_bind((size + 1) as i64);
        }
        qb.push(" OFFSET ").push_bind(offset as i64);

        let mut rows: Vec<Value> = qb
            .build_query_scalar::<Value>()
            .fetch_all(&self.pool)
            .await?;

        let next_page_start_token = match page_size {
            Some(size) if rows.len() > size => {
                rows.truncate(size);
                Some(encode_page_token(offset + size))
            }
            _ => None,
        };

        Ok(QueryResults {
            results: rows,
            next_page_start_token,
        })
    }
}
