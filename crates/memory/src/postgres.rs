//! PostgreSQL + pgvector turn store.
//!
//! Implements [`TurnStore`] with:
//! - An append-only `chat_memory` table with an optional `vector(N)` column
//! - A `metadata` table of JSONB values keyed per turn
//! - Similarity search using pgvector's `<=>` (cosine distance) operator
//!
//! All tables live in one schema whose name is validated as an identifier
//! before it is spliced into SQL. The migration is idempotent and runs at
//! construction.
//!
//! # Setup
//!
//! The pgvector extension must be installable by the connecting role:
//!
//! ```sql
//! CREATE EXTENSION IF NOT EXISTS vector;
//! ```

use agentkit_core::error::MemoryError;
use agentkit_core::memory::{MetadataRecord, TurnStore, is_sql_identifier};
use agentkit_core::message::{Role, Turn};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::vector::encode_vector;

static SHARED: OnceCell<Arc<PgTurnStore>> = OnceCell::const_new();

/// PostgreSQL turn store with pgvector similarity search.
pub struct PgTurnStore {
    pool: PgPool,
    schema: String,
    embedding_dim: usize,
}

impl PgTurnStore {
    /// Connect, then run the schema migration.
    pub async fn connect(
        database_url: &str,
        schema: &str,
        embedding_dim: usize,
    ) -> Result<Self, MemoryError> {
        if !is_sql_identifier(schema) {
            return Err(MemoryError::Storage(format!(
                "invalid schema name '{schema}'"
            )));
        }
        if embedding_dim == 0 {
            return Err(MemoryError::Storage("embedding dimension must be > 0".into()));
        }

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| MemoryError::Storage(format!("PostgreSQL connection failed: {e}")))?;

        info!(schema, embedding_dim, "Connected to PostgreSQL turn store");

        let store = Self {
            pool,
            schema: schema.to_string(),
            embedding_dim,
        };
        store.migrate().await?;
        Ok(store)
    }

    /// The process-wide store.
    ///
    /// The first successful initialization wins; later calls return the same
    /// handle whatever arguments they pass. A failed initialization is
    /// returned to its caller and the next call tries again.
    pub async fn shared(
        database_url: &str,
        schema: &str,
        embedding_dim: usize,
    ) -> Result<Arc<Self>, MemoryError> {
        SHARED
            .get_or_try_init(|| async {
                Self::connect(database_url, schema, embedding_dim)
                    .await
                    .map(Arc::new)
            })
            .await
            .cloned()
    }

    /// Run the idempotent schema migration.
    ///
    /// Creating the extension and the indexes is best-effort; the schema and
    /// both tables are required.
    pub async fn migrate(&self) -> Result<(), MemoryError> {
        if let Err(e) = sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
        {
            warn!(error = %e, "Could not create the vector extension, assuming it exists");
        }

        for sql in migration_statements(&self.schema, self.embedding_dim) {
            let required = !sql.starts_with("CREATE INDEX");
            match sqlx::raw_sql(&sql).execute(&self.pool).await {
                Ok(_) => {}
                Err(e) if required => {
                    return Err(MemoryError::MigrationFailed(format!("{e} (in: {sql})")));
                }
                Err(e) => warn!(error = %e, "Optional index not created"),
            }
        }

        info!(schema = %self.schema, "Turn store migration complete");
        Ok(())
    }

    fn table(&self, name: &str) -> String {
        format!("{}.{}", self.schema, name)
    }

    fn check_dim(&self, embedding: &[f32]) -> Result<(), MemoryError> {
        if embedding.len() != self.embedding_dim {
            return Err(MemoryError::DimensionMismatch {
                expected: self.embedding_dim,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

/// DDL for one schema. Identifiers must be validated by the caller.
fn migration_statements(schema: &str, embedding_dim: usize) -> Vec<String> {
    vec![
        format!("CREATE SCHEMA IF NOT EXISTS {schema}"),
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.chat_memory (\
             id BIGSERIAL PRIMARY KEY, \
             session_id TEXT NOT NULL, \
             role TEXT NOT NULL, \
             text TEXT NOT NULL, \
             embedding vector({embedding_dim}), \
             created_at TIMESTAMPTZ NOT NULL DEFAULT now())"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS chat_memory_session_idx \
             ON {schema}.chat_memory (session_id, created_at DESC, id DESC)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS chat_memory_embedding_idx \
             ON {schema}.chat_memory USING ivfflat (embedding vector_cosine_ops) WITH (lists = 100)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.metadata (\
             id BIGSERIAL PRIMARY KEY, \
             message_id BIGINT NOT NULL REFERENCES {schema}.chat_memory(id) ON DELETE CASCADE, \
             key TEXT NOT NULL, \
             value JSONB NOT NULL, \
             created_at TIMESTAMPTZ NOT NULL DEFAULT now())"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS metadata_message_idx ON {schema}.metadata (message_id, key)"
        ),
    ]
}

fn query_failed(what: &str) -> impl Fn(sqlx::Error) -> MemoryError + '_ {
    move |e| MemoryError::QueryFailed(format!("{what}: {e}"))
}

/// Convert a `chat_memory` row into a Turn. Embeddings are not loaded.
fn row_to_turn(row: &PgRow) -> Result<Turn, MemoryError> {
    let decode = query_failed("decoding turn");
    let role: String = row.try_get("role").map_err(&decode)?;
    Ok(Turn {
        id: row.try_get("id").map_err(&decode)?,
        session_id: row.try_get("session_id").map_err(&decode)?,
        role: role.parse::<Role>().map_err(MemoryError::QueryFailed)?,
        text: row.try_get("text").map_err(&decode)?,
        embedding: None,
        created_at: row.try_get("created_at").map_err(&decode)?,
    })
}

fn row_to_metadata(row: &PgRow) -> Result<MetadataRecord, MemoryError> {
    let decode = query_failed("decoding metadata");
    let value: String = row.try_get("value").map_err(&decode)?;
    Ok(MetadataRecord {
        message_id: row.try_get("message_id").map_err(&decode)?,
        key: row.try_get("key").map_err(&decode)?,
        value: serde_json::from_str(&value)
            .map_err(|e| MemoryError::QueryFailed(format!("metadata value is not JSON: {e}")))?,
        created_at: row.try_get("created_at").map_err(&decode)?,
    })
}

#[async_trait]
impl TurnStore for PgTurnStore {
    fn name(&self) -> &str {
        "postgres"
    }

    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    async fn append(
        &self,
        session_id: &str,
        role: Role,
        text: &str,
        embedding: Option<&[f32]>,
    ) -> Result<i64, MemoryError> {
        let embedding = embedding.filter(|e| !e.is_empty());
        if let Some(e) = embedding {
            self.check_dim(e)?;
        }
        let vector = embedding.map(encode_vector);

        let sql = format!(
            "INSERT INTO {} (session_id, role, text, embedding) \
             VALUES ($1, $2, $3, $4::vector) RETURNING id",
            self.table("chat_memory")
        );
        let row = sqlx::query(&sql)
            .bind(session_id)
            .bind(role.as_str())
            .bind(text)
            .bind(vector.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to append turn: {e}")))?;

        let id: i64 = row.try_get("id").map_err(query_failed("reading turn id"))?;
        debug!(session = session_id, id, role = %role, embedded = vector.is_some(), "Appended turn");
        Ok(id)
    }

    async fn attach_metadata(
        &self,
        message_id: i64,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), MemoryError> {
        let sql = format!(
            "INSERT INTO {} (message_id, key, value) VALUES ($1, $2, $3::jsonb)",
            self.table("metadata")
        );
        sqlx::query(&sql)
            .bind(message_id)
            .bind(key)
            .bind(value.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to attach metadata: {e}")))?;
        Ok(())
    }

    async fn similarity_search(
        &self,
        session_id: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<Turn>, MemoryError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        self.check_dim(query_embedding)?;

        let sql = format!(
            "SELECT id, session_id, role, text, created_at FROM {} \
             WHERE session_id = $1 AND embedding IS NOT NULL \
             ORDER BY embedding <=> $2::vector ASC, id ASC \
             LIMIT $3",
            self.table("chat_memory")
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .bind(encode_vector(query_embedding))
            .bind(top_k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("Similarity search failed"))?;

        rows.iter().map(row_to_turn).collect()
    }

    async fn recent(&self, session_id: &str, depth: usize) -> Result<Vec<Turn>, MemoryError> {
        if depth == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, session_id, role, text, created_at FROM {} \
             WHERE session_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2",
            self.table("chat_memory")
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .bind(depth as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("Recent turns query failed"))?;

        let mut turns = rows
            .iter()
            .map(row_to_turn)
            .collect::<Result<Vec<_>, _>>()?;
        turns.reverse();
        Ok(turns)
    }

    async fn metadata(
        &self,
        session_id: &str,
        key: &str,
    ) -> Result<Vec<MetadataRecord>, MemoryError> {
        let sql = format!(
            "SELECT m.message_id, m.key, m.value::text AS value, m.created_at \
             FROM {} m JOIN {} c ON c.id = m.message_id \
             WHERE c.session_id = $1 AND m.key = $2 \
             ORDER BY c.created_at ASC, c.id ASC, m.id ASC",
            self.table("metadata"),
            self.table("chat_memory")
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("Metadata query failed"))?;

        rows.iter().map(row_to_metadata).collect()
    }
}

// ── Unit tests (no DB required) ──────────────────────────────────────────
