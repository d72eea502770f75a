//! Database access for query-backed tools.
//!
//! [`QueryBackend`] is the seam between the dispatcher and the database so
//! tool semantics (argument binding, row flattening, sentinels) can be tested
//! without PostgreSQL.

use agentkit_core::error::ToolError;
use async_trait::async_trait;

/// One result row: `(column, value)` pairs in select-list order.
pub type Row = Vec<(String, String)>;

#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Run `sql` on `conn` with positional text arguments (`$1`, `$2`, …).
    async fn query_rows(&self, conn: &str, sql: &str, args: &[String])
    -> Result<Vec<Row>, ToolError>;

    /// The `column` values of the `top_k` rows of `table` closest to
    /// `embedding` by cosine distance, closest first.
    async fn nearest_neighbors(
        &self,
        conn: &str,
        table: &str,
        column: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<String>, ToolError>;
}

/// Render a JSON scalar the way it reads in a `col=value` line.
pub(crate) fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".into(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Turn a JSON object into a row, keeping key order.
pub(crate) fn object_to_row(object: &serde_json::Map<String, serde_json::Value>) -> Row {
    object
        .iter()
        .map(|(k, v)| (k.clone(), render_value(v)))
        .collect()
}

/// A table reference: an identifier, optionally schema-qualified.
pub(crate) fn is_table_ref(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 2 && parts.iter().all(|p| agentkit_core::memory::is_sql_identifier(p))
}

#[cfg(feature = "postgres")]
pub use pg::PgQueryBackend;

#[cfg(feature = "postgres")]
mod pg {
    use super::*;
    use agentkit_memory::encode_vector;
    use sqlx::Row as _;
    use sqlx::postgres::{PgPool, PgPoolOptions};
    use std::collections::HashMap;
    use tokio::sync::Mutex;
    use tracing::debug;

    /// PostgreSQL backend with one lazily created pool per connection string.
    ///
    /// Arguments are bound as text; templates cast them where a column has
    /// another type (`WHERE id = $1::bigint`).
    #[derive(Default)]
    pub struct PgQueryBackend {
        pools: Mutex<HashMap<String, PgPool>>,
    }

    impl PgQueryBackend {
        pub fn new() -> Self {
            Self::default()
        }

        async fn pool(&self, conn: &str) -> Result<PgPool, ToolError> {
            if conn.is_empty() {
                return Err(failed("no connection string configured".into()));
            }

            let mut pools = self.pools.lock().await;
            if let Some(pool) = pools.get(conn) {
                return Ok(pool.clone());
            }

            let pool = PgPoolOptions::new()
                .max_connections(4)
                .connect(conn)
                .await
                .map_err(|e| failed(format!("connection failed: {e}")))?;
            pools.insert(conn.to_string(), pool.clone());
            debug!("Opened tool connection pool");
            Ok(pool)
        }
    }

    fn failed(reason: String) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: String::new(),
            reason,
        }
    }

    #[async_trait]
    impl QueryBackend for PgQueryBackend {
        async fn query_rows(
            &self,
            conn: &str,
            sql: &str,
            args: &[String],
        ) -> Result<Vec<Row>, ToolError> {
            let pool = self.pool(conn).await?;

            // Every row comes back as one JSON object so arbitrary column
            // types can be rendered without a per-type decoder.
            let wrapped = format!(
                "SELECT row_to_json(t)::text AS payload FROM ({}) t",
                sql.trim().trim_end_matches(';')
            );
            let mut query = sqlx::query(&wrapped);
            for arg in args {
                query = query.bind(arg);
            }

            let rows = query
                .fetch_all(&pool)
                .await
                .map_err(|e| failed(e.to_string()))?;

            rows.iter()
                .map(|row| {
                    let text: String = row.try_get("payload").map_err(|e| failed(e.to_string()))?;
                    match serde_json::from_str::<serde_json::Value>(&text) {
                        Ok(serde_json::Value::Object(object)) => Ok(object_to_row(&object)),
                        Ok(_) | Err(_) => Err(failed("row is not a JSON object".into())),
                    }
                })
                .collect()
        }

        async fn nearest_neighbors(
            &self,
            conn: &str,
            table: &str,
            column: &str,
            embedding: &[f32],
            top_k: usize,
        ) -> Result<Vec<String>, ToolError> {
            if !is_table_ref(table) || !agentkit_core::memory::is_sql_identifier(column) {
                return Err(ToolError::InvalidArguments(format!(
                    "invalid table/column '{table}'/'{column}'"
                )));
            }
            let pool = self.pool(conn).await?;

            let sql = format!(
                "SELECT {column}::text AS content FROM {table} \
                 WHERE embedding IS NOT NULL \
                 ORDER BY embedding <=> $1::vector \
                 LIMIT $2"
            );
            let rows = sqlx::query(&sql)
                .bind(encode_vector(embedding))
                .bind(top_k as i64)
                .fetch_all(&pool)
                .await
                .map_err(|e| failed(e.to_string()))?;

            rows.iter()
                .map(|row| {
                    row.try_get::<Option<String>, _>("content")
                        .map(Option::unwrap_or_default)
                        .map_err(|e| failed(e.to_string()))
                })
                .collect()
        }
    }
}
