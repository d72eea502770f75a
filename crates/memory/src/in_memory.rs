//! In-memory turn store, useful for testing and ephemeral sessions.
//!
//! Follows the same ordering rules as the PostgreSQL store.

use agentkit_core::error::MemoryError;
use agentkit_core::memory::{MetadataRecord, TurnStore};
use agentkit_core::message::{Role, Turn};
use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::vector::cosine_distance;

/// NaN and infinite components become 0, matching [`crate::encode_vector`].
fn finite_components(v: &[f32]) -> Vec<f32> {
    v.iter()
        .map(|x| if x.is_finite() { *x } else { 0.0 })
        .collect()
}

#[derive(Default)]
struct State {
    turns: Vec<Turn>,
    metadata: Vec<MetadataRecord>,
    last_id: i64,
}

/// A turn store that keeps everything in process memory.
#[derive(Clone)]
pub struct InMemoryTurnStore {
    state: Arc<RwLock<State>>,
    embedding_dim: usize,
}

impl InMemoryTurnStore {
    pub fn new(embedding_dim: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            embedding_dim,
        }
    }

    /// Number of stored turns across all sessions.
    pub async fn len(&self) -> usize {
        self.state.read().await.turns.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Every turn of a session in insertion order, embeddings included.
    pub async fn turns(&self, session_id: &str) -> Vec<Turn> {
        self.state
            .read()
            .await
            .turns
            .iter()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect()
    }

    /// Metadata records attached to one turn.
    pub async fn metadata_for(&self, message_id: i64) -> Vec<MetadataRecord> {
        self.state
            .read()
            .await
            .metadata
            .iter()
            .filter(|m| m.message_id == message_id)
            .cloned()
            .collect()
    }
}

fn chronological(a: &Turn, b: &Turn) -> Ordering {
    a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
}

#[async_trait]
impl TurnStore for InMemoryTurnStore {
    fn name(&self) -> &str {
        "in_memory"
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
            if e.len() != self.embedding_dim {
                return Err(MemoryError::DimensionMismatch {
                    expected: self.embedding_dim,
                    actual: e.len(),
                });
            }
        }

        let mut state = self.state.write().await;
        state.last_id += 1;
        let id = state.last_id;
        state.turns.push(Turn {
            id,
            session_id: session_id.to_string(),
            role,
            text: text.to_string(),
            embedding: embedding.map(finite_components),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn attach_metadata(
        &self,
        message_id: i64,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), MemoryError> {
        let mut state = self.state.write().await;
        if !state.turns.iter().any(|t| t.id == message_id) {
            return Err(MemoryError::UnknownMessage(message_id));
        }
        state.metadata.push(MetadataRecord {
            message_id,
            key: key.to_string(),
            value: value.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn similarity_search(
        &self,
        session_id: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<Turn>, MemoryError> {
        let state = self.state.read().await;
        let mut scored: Vec<(f32, &Turn)> = state
            .turns
            .iter()
            .filter(|t| t.session_id == session_id)
            .filter_map(|t| {
                let emb = t.embedding.as_ref()?;
                Some((cosine_distance(emb, query_embedding), t))
            })
            .collect();

        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.id.cmp(&b.1.id)));
        scored.truncate(top_k);
        Ok(scored.into_iter().map(|(_, t)| t.clone()).collect())
    }

    async fn recent(&self, session_id: &str, depth: usize) -> Result<Vec<Turn>, MemoryError> {
        if depth == 0 {
            return Ok(Vec::new());
        }
        let state = self.state.read().await;
        let mut newest_first: Vec<Turn> = state
            .turns
            .iter()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect();
        newest_first.sort_by(|a, b| chronological(b, a));
        newest_first.truncate(depth);
        newest_first.reverse();
        Ok(newest_first)
    }

    async fn metadata(
        &self,
        session_id: &str,
        key: &str,
    ) -> Result<Vec<MetadataRecord>, MemoryError> {
        let state = self.state.read().await;
        let mut owners: Vec<&Turn> = state
            .turns
            .iter()
            .filter(|t| t.session_id == session_id)
            .collect();
        owners.sort_by(|a, b| chronological(a, b));

        let mut out = Vec::new();
        for turn in owners {
            out.extend(
                state
                    .metadata
                    .iter()
                    .filter(|m| m.message_id == turn.id && m.key == key)
                    .cloned(),
            );
        }
        Ok(out)
    }
}
