//! Scripted doubles for the agent's unit tests.

use agentkit_core::error::{MemoryError, ProviderError, ToolError};
use agentkit_core::memory::{MetadataRecord, TurnStore};
use agentkit_core::message::{Role, Turn};
use agentkit_core::provider::{EmbeddingRequest, Provider, ProviderRequest, ProviderResponse};
use agentkit_memory::InMemoryTurnStore;
use agentkit_tools::QueryBackend;
use agentkit_tools::backend::Row;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A provider that replays queued replies and records every request.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    embedding: Option<Vec<f32>>,
    failing_embeddings: HashSet<String>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<&str>) -> Self {
        let replies = replies
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                Ok(ProviderResponse {
                    id: Some(format!("resp_{i}")),
                    output_text: text.to_string(),
                    raw: serde_json::json!({ "id": format!("resp_{i}"), "output_text": text }),
                })
            })
            .collect();
        Self {
            replies: Mutex::new(replies),
            ..Self::default()
        }
    }

    /// The first completion fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Err(error)])),
            ..Self::default()
        }
    }

    /// Embed every input as `vector`. Without this, embedding fails.
    pub fn with_embedding(mut self, vector: Vec<f32>) -> Self {
        self.embedding = Some(vector);
        self
    }

    /// Fail the embedding of exactly this input.
    pub fn failing_embedding_for(mut self, input: &str) -> Self {
        self.failing_embeddings.insert(input.to_string());
        self
    }

    /// Sleep before every completion.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::InvalidResponse("script exhausted".into())))
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<Vec<f32>, ProviderError> {
        if self.failing_embeddings.contains(&request.input) {
            return Err(ProviderError::Network("embedding refused".into()));
        }
        self.embedding
            .clone()
            .ok_or_else(|| ProviderError::NotConfigured("no scripted embedding".into()))
    }
}

/// A turn store whose every operation fails.
pub struct FailingStore {
    dim: usize,
}

impl FailingStore {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn down() -> MemoryError {
        MemoryError::Storage("database unavailable".into())
    }
}

#[async_trait]
impl TurnStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    fn embedding_dim(&self) -> usize {
        self.dim
    }

    async fn append(
        &self,
        _session_id: &str,
        _role: Role,
        _text: &str,
        _embedding: Option<&[f32]>,
    ) -> Result<i64, MemoryError> {
        Err(Self::down())
    }

    async fn attach_metadata(
        &self,
        _message_id: i64,
        _key: &str,
        _value: &serde_json::Value,
    ) -> Result<(), MemoryError> {
        Err(Self::down())
    }

    async fn similarity_search(
        &self,
        _session_id: &str,
        _query_embedding: &[f32],
        _top_k: usize,
    ) -> Result<Vec<Turn>, MemoryError> {
        Err(Self::down())
    }

    async fn recent(&self, _session_id: &str, _depth: usize) -> Result<Vec<Turn>, MemoryError> {
        Err(Self::down())
    }

    async fn metadata(
        &self,
        _session_id: &str,
        _key: &str,
    ) -> Result<Vec<MetadataRecord>, MemoryError> {
        Err(Self::down())
    }
}

/// An in-memory store whose writes fire `on_append` and then stall.
pub struct StallingStore {
    inner: InMemoryTurnStore,
    on_append: CancellationToken,
    stall: Duration,
}

impl StallingStore {
    pub fn new(dim: usize, on_append: CancellationToken, stall: Duration) -> Self {
        Self {
            inner: InMemoryTurnStore::new(dim),
            on_append,
            stall,
        }
    }

    pub async fn turns(&self, session_id: &str) -> Vec<Turn> {
        self.inner.turns(session_id).await
    }
}

#[async_trait]
impl TurnStore for StallingStore {
    fn name(&self) -> &str {
        "stalling"
    }

    fn embedding_dim(&self) -> usize {
        self.inner.embedding_dim()
    }

    async fn append(
        &self,
        session_id: &str,
        role: Role,
        text: &str,
        embedding: Option<&[f32]>,
    ) -> Result<i64, MemoryError> {
        self.on_append.cancel();
        tokio::time::sleep(self.stall).await;
        self.inner.append(session_id, role, text, embedding).await
    }

    async fn attach_metadata(
        &self,
        message_id: i64,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), MemoryError> {
        self.inner.attach_metadata(message_id, key, value).await
    }

    async fn similarity_search(
        &self,
        session_id: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<Turn>, MemoryError> {
        self.inner
            .similarity_search(session_id, query_embedding, top_k)
            .await
    }

    async fn recent(&self, session_id: &str, depth: usize) -> Result<Vec<Turn>, MemoryError> {
        self.inner.recent(session_id, depth).await
    }

    async fn metadata(
        &self,
        session_id: &str,
        key: &str,
    ) -> Result<Vec<MetadataRecord>, MemoryError> {
        self.inner.metadata(session_id, key).await
    }
}

/// A query backend with canned rows that records its argument lists.
#[derive(Default)]
pub struct StubQueryBackend {
    rows: Vec<Row>,
    error: Option<String>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl StubQueryBackend {
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            error: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    fn outcome<T>(&self, ok: T) -> Result<T, ToolError> {
        match &self.error {
            Some(reason) => Err(ToolError::ExecutionFailed {
                tool_name: String::new(),
                reason: reason.clone(),
            }),
            None => Ok(ok),
        }
    }
}

#[async_trait]
impl QueryBackend for StubQueryBackend {
    async fn query_rows(
        &self,
        _conn: &str,
        _sql: &str,
        args: &[String],
    ) -> Result<Vec<Row>, ToolError> {
        self.calls.lock().unwrap().push(args.to_vec());
        self.outcome(self.rows.clone())
    }

    async fn nearest_neighbors(
        &self,
        _conn: &str,
        _table: &str,
        _column: &str,
        _embedding: &[f32],
        _top_k: usize,
    ) -> Result<Vec<String>, ToolError> {
        self.outcome(Vec::new())
    }
}

/// Write `content` to a prompt file in a fresh temp dir. Keep the dir alive
/// for as long as the path is used.
pub fn prompt_file(content: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("base.md");
    std::fs::write(&path, content).unwrap();
    (dir, path)
}
