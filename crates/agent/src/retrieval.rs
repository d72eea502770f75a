//! Hybrid memory retrieval: recent turns, structured facts and semantically
//! similar turns, fetched concurrently and best-effort.
//!
//! Every result is an explicit `Option`. A failed or cancelled fetch is
//! logged and comes back as `None`; it never fails the turn.

use agentkit_core::memory::{StructuredFacts, TurnStore};
use agentkit_core::message::Turn;
use agentkit_core::provider::{EmbeddingRequest, Provider};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::memory_block;

/// What retrieval needs from configuration.
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub embedding_model: String,
    pub recent_depth: usize,
    pub semantic_top_k: usize,
    pub fact_tool: String,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            embedding_model: "text-embedding-3-small".into(),
            recent_depth: 4,
            semantic_top_k: 5,
            fact_tool: "db_boleto".into(),
        }
    }
}

/// The outcome of one retrieval pass.
#[derive(Debug, Clone, Default)]
pub struct Retrieved {
    /// Embedding of the user message, with the store's dimensionality
    pub embedding: Option<Vec<f32>>,
    pub recent: Option<Vec<Turn>>,
    pub facts: Option<StructuredFacts>,
    /// Present only when `embedding` is
    pub similar: Option<Vec<Turn>>,
}

impl Retrieved {
    /// The rendered memory block; empty when nothing was retrieved.
    pub fn memory_block(&self) -> String {
        memory_block::render(
            self.recent.as_deref().unwrap_or_default(),
            self.facts.as_ref().unwrap_or(&StructuredFacts::new()),
            self.similar.as_deref().unwrap_or_default(),
        )
    }
}

#[derive(Clone)]
pub struct Retriever {
    provider: Arc<dyn Provider>,
    store: Arc<dyn TurnStore>,
    settings: RetrievalSettings,
}

impl Retriever {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<dyn TurnStore>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            provider,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// Embed `text` for storage or search. `None` when the provider fails or
    /// returns a vector the store cannot hold.
    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let request = EmbeddingRequest::new(&self.settings.embedding_model, text);
        match self.provider.embed(request).await {
            Ok(v) if v.len() == self.store.embedding_dim() => Some(v),
            Ok(v) => {
                warn!(
                    expected = self.store.embedding_dim(),
                    actual = v.len(),
                    "Embedding has the wrong dimension, ignoring it"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "Embedding failed");
                None
            }
        }
    }

    /// Run the three independent fetches concurrently, then the similarity
    /// search if the embedding succeeded. All of it stops early when
    /// `cancel` fires.
    pub async fn retrieve(
        &self,
        session_id: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Retrieved {
        let scope = cancel.child_token();
        let settings = &self.settings;

        let (embedding, recent, facts) = tokio::join!(
            scope.run_until_cancelled(self.embed(message)),
            scope.run_until_cancelled(self.store.recent(session_id, settings.recent_depth)),
            scope.run_until_cancelled(self.store.derive_facts(session_id, &settings.fact_tool)),
        );

        let embedding = embedding.flatten();
        let recent = settle("recent turns", session_id, recent);
        let facts = settle("structured facts", session_id, facts);

        let similar = match &embedding {
            Some(vector) => settle(
                "similar turns",
                session_id,
                scope
                    .run_until_cancelled(self.store.similarity_search(
                        session_id,
                        vector,
                        settings.semantic_top_k,
                    ))
                    .await,
            ),
            None => None,
        };

        debug!(
            session = session_id,
            embedded = embedding.is_some(),
            recent = recent.as_ref().map_or(0, Vec::len),
            facts = facts.as_ref().map_or(0, |f| f.len()),
            similar = similar.as_ref().map_or(0, Vec::len),
            "Retrieved memory"
        );

        Retrieved {
            embedding,
            recent,
            facts,
            similar,
        }
    }
}

fn settle<T, E: std::fmt::Display>(
    what: &str,
    session_id: &str,
    outcome: Option<Result<T, E>>,
) -> Option<T> {
    match outcome {
        Some(Ok(value)) => Some(value),
        Some(Err(e)) => {
            warn!(session = session_id, error = %e, "Could not fetch {what}");
            None
        }
        None => {
            debug!(session = session_id, "Fetch of {what} cancelled");
            None
        }
    }
}
