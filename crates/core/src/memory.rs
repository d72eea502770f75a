//! Memory trait: the durable per-session turn log.
//!
//! The store keeps three kinds of data:
//! - Turns (append-only, optionally embedded for similarity search)
//! - Metadata records attached to a turn after it exists
//! - Structured facts, which are never stored: they are projected from
//!   `tool_used` metadata on every read (last write wins per entity)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::MemoryError;
use crate::message::{Role, Turn};

/// Metadata key for the raw model payload of an assistant turn.
pub const RESPONSE_RAW_KEY: &str = "response_raw";

/// Metadata key for the tool invocation recorded on an assistant turn.
pub const TOOL_USED_KEY: &str = "tool_used";

/// Entity id → latest status, ordered by entity id.
pub type StructuredFacts = BTreeMap<String, String>;

/// A metadata record attached to a stored turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub message_id: i64,
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// The shape of a `tool_used` metadata value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolUsage {
    #[serde(default)]
    pub tool_requested: String,
    #[serde(default)]
    pub tool_args: Vec<String>,
    #[serde(default)]
    pub tool_output: String,
}

/// The core TurnStore trait.
///
/// Implementations: PostgreSQL + pgvector, in-memory (for tests).
#[async_trait]
pub trait TurnStore: Send + Sync {
    /// The backend name (e.g., "postgres", "in_memory").
    fn name(&self) -> &str;

    /// Dimensionality every stored embedding must have.
    fn embedding_dim(&self) -> usize;

    /// Append a turn. An empty embedding is stored as absent.
    /// Returned ids are strictly increasing.
    async fn append(
        &self,
        session_id: &str,
        role: Role,
        text: &str,
        embedding: Option<&[f32]>,
    ) -> Result<i64, MemoryError>;

    /// Attach a metadata record to an existing turn.
    async fn attach_metadata(
        &self,
        message_id: i64,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), MemoryError>;

    /// Nearest turns of the session by cosine distance, closest first.
    /// Turns without an embedding are never returned; equal distances are
    /// ordered by ascending turn id.
    async fn similarity_search(
        &self,
        session_id: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<Turn>, MemoryError>;

    /// The last `depth` turns of the session, oldest first.
    async fn recent(&self, session_id: &str, depth: usize) -> Result<Vec<Turn>, MemoryError>;

    /// All metadata records with `key` for the session, in chronological
    /// order of the owning turns.
    async fn metadata(
        &self,
        session_id: &str,
        key: &str,
    ) -> Result<Vec<MetadataRecord>, MemoryError>;

    /// Project structured facts for the session from its tool history.
    async fn derive_facts(
        &self,
        session_id: &str,
        fact_tool: &str,
    ) -> Result<StructuredFacts, MemoryError> {
        let records = self.metadata(session_id, TOOL_USED_KEY).await?;
        Ok(project_facts(&records, fact_tool))
    }
}

/// Fold `tool_used` records (oldest first) into entity → status.
///
/// Only invocations of `fact_tool` (case-insensitive) with at least one
/// argument and a `status=` marker in their output contribute.
pub fn project_facts(records: &[MetadataRecord], fact_tool: &str) -> StructuredFacts {
    let mut facts = StructuredFacts::new();
    for record in records {
        let Ok(usage) = serde_json::from_value::<ToolUsage>(record.value.clone()) else {
            continue;
        };
        if !usage.tool_requested.eq_ignore_ascii_case(fact_tool) {
            continue;
        }
        let Some(entity) = usage.tool_args.first().map(|a| a.trim()) else {
            continue;
        };
        if entity.is_empty() {
            continue;
        }
        if let Some(status) = parse_status(&usage.tool_output) {
            facts.insert(entity.to_string(), status.to_string());
        }
    }
    facts
}

/// Whether `name` can be spliced into SQL as an unquoted identifier.
///
/// Letters, digits and underscores, not starting with a digit, at most 63
/// bytes (the PostgreSQL limit).
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= 63
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Extract the token following a case-insensitive `status=` marker.
pub fn parse_status(output: &str) -> Option<&str> {
    const MARKER: &str = "status=";
    let output = output.trim();
    // ASCII lowercasing keeps byte offsets aligned with `output`.
    let idx = output.to_ascii_lowercase().find(MARKER)?;
    let rest = output[idx + MARKER.len()..].trim_start();
    let token = rest.split_whitespace().next()?;
    Some(token)
}
