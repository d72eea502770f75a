//! End-to-end tests for routed turns.
//!
//! These drive the router and orchestrator together against the in-memory
//! store, a scripted provider and a stub database, with prompts and the tool
//! catalog on disk.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use agentkit_agent::{
    Orchestrator, OrchestratorSettings, RetrievalSettings, RouteRequest, Router, RouterSettings,
    TurnRequest, context_cache_key,
};
use agentkit_config::load_tool_catalog;
use agentkit_core::error::{Error, MemoryError, ProviderError, ToolError};
use agentkit_core::memory::{MetadataRecord, TurnStore};
use agentkit_core::message::{Role, Turn};
use agentkit_core::provider::{EmbeddingRequest, Provider, ProviderRequest, ProviderResponse};
use agentkit_memory::InMemoryTurnStore;
use agentkit_tools::backend::Row;
use agentkit_tools::{QueryBackend, ScriptRegistry, ToolDispatcher};

const DIM: usize = 3;

// ── Mock Provider ────────────────────────────────────────────────────────

/// Replays scripted replies in order and embeds text by keyword.
struct ScriptedProvider {
    replies: Mutex<Vec<String>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| ProviderError::InvalidResponse("no more replies".into()))?;
        Ok(ProviderResponse {
            id: Some("resp_e2e".into()),
            raw: serde_json::json!({ "output_text": reply }),
            output_text: reply,
        })
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<Vec<f32>, ProviderError> {
        let text = request.input.to_lowercase();
        if text.contains("unembeddable") {
            return Err(ProviderError::Network("embedding service down".into()));
        }
        Ok(vec![
            if text.contains("invoice") { 1.0 } else { 0.0 },
            if text.contains("modem") { 1.0 } else { 0.0 },
            0.1,
        ])
    }
}

// ── Stub database ────────────────────────────────────────────────────────

/// Answers every query with one `id`/`status` row for the first argument.
#[derive(Default)]
struct InvoiceDb {
    queries: Mutex<Vec<(String, Vec<String>)>>,
}

#[async_trait::async_trait]
impl QueryBackend for InvoiceDb {
    async fn query_rows(&self, conn: &str, _sql: &str, args: &[String]) -> Result<Vec<Row>, ToolError> {
        self.queries
            .lock()
            .unwrap()
            .push((conn.to_string(), args.to_vec()));
        let id = args.first().cloned().unwrap_or_default();
        Ok(vec![vec![
            ("id".into(), id),
            ("status".into(), "paid".into()),
        ]])
    }

    async fn nearest_neighbors(
        &self,
        _conn: &str,
        _table: &str,
        _column: &str,
        _embedding: &[f32],
        _top_k: usize,
    ) -> Result<Vec<String>, ToolError> {
        Ok(Vec::new())
    }
}

/// Reads from an in-memory store but refuses every write.
struct ReadOnlyStore(InMemoryTurnStore);

#[async_trait::async_trait]
impl TurnStore for ReadOnlyStore {
    fn name(&self) -> &str {
        "read_only"
    }

    fn embedding_dim(&self) -> usize {
        self.0.embedding_dim()
    }

    async fn append(
        &self,
        _session_id: &str,
        _role: Role,
        _text: &str,
        _embedding: Option<&[f32]>,
    ) -> Result<i64, MemoryError> {
        Err(MemoryError::Storage("read-only replica".into()))
    }

    async fn attach_metadata(
        &self,
        _message_id: i64,
        _key: &str,
        _value: &serde_json::Value,
    ) -> Result<(), MemoryError> {
        Err(MemoryError::Storage("read-only replica".into()))
    }

    async fn similarity_search(
        &self,
        session_id: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<Turn>, MemoryError> {
        self.0.similarity_search(session_id, query_embedding, top_k).await
    }

    async fn recent(&self, session_id: &str, depth: usize) -> Result<Vec<Turn>, MemoryError> {
        self.0.recent(session_id, depth).await
    }

    async fn metadata(&self, session_id: &str, key: &str) -> Result<Vec<MetadataRecord>, MemoryError> {
        self.0.metadata(session_id, key).await
    }
}

// ── Fixture ──────────────────────────────────────────────────────────────

const CATALOG: &str = r#"
[[tools]]
name = "db_boleto"
description = "Invoice status by id"
type = "postgres"
conn = "ENV:BILLING_DB"
query_template = "SELECT id, status FROM boletos WHERE id = $1::bigint"

[[tools]]
name = "calc_interest"
type = "script"
function = "calc_interest($1, $2)"

[[tools]]
name = "ticket_search"
type = "http"
"#;

struct Workspace {
    _dir: tempfile::TempDir,
    base: PathBuf,
    router: PathBuf,
    tools: PathBuf,
}

fn workspace() -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::write(root.join("base.txt"), "You are the Acme support desk.").unwrap();

    let prompts = root.join("prompts");
    std::fs::create_dir(&prompts).unwrap();
    std::fs::write(prompts.join("router.md"), "Route by topic.").unwrap();
    std::fs::write(prompts.join("faturamento.md"), "You handle billing.").unwrap();
    std::fs::write(prompts.join("geral.md"), "You handle anything.").unwrap();
    std::fs::write(prompts.join("tecnico.md"), "You handle technical issues.").unwrap();

    std::fs::write(root.join("tools.toml"), CATALOG).unwrap();

    Workspace {
        base: root.join("base.txt"),
        router: prompts.join("router.md"),
        tools: root.join("tools.toml"),
        _dir: dir,
    }
}

fn interest_scripts() -> ScriptRegistry {
    ScriptRegistry::new().with("calc_interest", |args| {
        let principal: f64 = args.first().map(|s| s.parse()).transpose()?.unwrap_or(0.0);
        let rate: f64 = args.get(1).map(|s| s.parse()).transpose()?.unwrap_or(0.0);
        Ok(format!("interest={:.2}", principal * rate / 100.0))
    })
}

fn build(
    ws: &Workspace,
    provider: Arc<ScriptedProvider>,
    store: Arc<dyn TurnStore>,
    db: Arc<InvoiceDb>,
) -> Router {
    let catalog = load_tool_catalog(&ws.tools, |var| {
        (var == "BILLING_DB").then(|| "postgres://billing.internal/acme".to_string())
    })
    .unwrap();
    let dispatcher = ToolDispatcher::new(Arc::new(catalog), db, provider.clone())
        .with_scripts(interest_scripts());
    let settings = OrchestratorSettings {
        retrieval: RetrievalSettings {
            recent_depth: 4,
            semantic_top_k: 2,
            ..RetrievalSettings::default()
        },
        ..OrchestratorSettings::default()
    };
    let orchestrator = Orchestrator::new(provider, store, Arc::new(dispatcher), settings);
    Router::new(Arc::new(orchestrator), RouterSettings::default())
}

fn routed(ws: &Workspace, session: &str, message: &str) -> RouteRequest {
    RouteRequest::new(TurnRequest::new(session, &ws.base, message)).with_router(&ws.router)
}

fn routed_verbose(ws: &Workspace, session: &str, message: &str) -> RouteRequest {
    RouteRequest::new(TurnRequest::new(session, &ws.base, message).with_verbose(true))
        .with_router(&ws.router)
}

fn last_system(request: &ProviderRequest) -> &str {
    let messages = &request.messages;
    &messages[messages.len() - 2].content
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn billing_conversation_remembers_invoice_status() {
    let ws = workspace();
    let provider = Arc::new(ScriptedProvider::new(&[
        // turn 1: route, ask for the tool, answer with its output
        "faturamento.md",
        "TOOL:db_boleto 123",
        "Invoice 123 is paid.",
        // turn 2: route, answer from memory
        "Faturamento",
        "Yes, invoice 123 was already paid.",
    ]));
    let store = Arc::new(InMemoryTurnStore::new(DIM));
    let db = Arc::new(InvoiceDb::default());
    let router = build(&ws, provider.clone(), store.clone(), db.clone());

    let first = router
        .respond(routed(&ws, "alice", "Is invoice 123 paid?"))
        .await
        .unwrap();
    assert_eq!(first, "Invoice 123 is paid.");

    let queries = db.queries.lock().unwrap().clone();
    assert_eq!(
        queries,
        vec![(
            "postgres://billing.internal/acme".to_string(),
            vec!["123".to_string()]
        )]
    );

    let second = router
        .respond(routed(&ws, "alice", "Remind me about that invoice"))
        .await
        .unwrap();
    assert_eq!(second, "Yes, invoice 123 was already paid.");

    let requests = provider.requests();
    assert_eq!(requests.len(), 5);

    // The tool round-trip re-asked with the literal output.
    assert!(last_system(&requests[2]).contains("id=123 status=paid"));
    assert_eq!(last_system(&requests[1]), "You handle billing.");

    // The second turn sees history, facts and similar turns.
    let memory = &requests[4].messages[1].content;
    assert!(memory.contains("user: Is invoice 123 paid?"));
    assert!(memory.contains("assistant: Invoice 123 is paid."));
    assert!(memory.contains("== Structured facts =="));
    assert!(memory.contains("- 123: paid"));
    assert!(memory.contains("== Relevant semantic memory =="));

    // The router saw the same memory ahead of the message.
    let routing_query = &requests[3].messages[1].content;
    assert!(routing_query.contains("- 123: paid"));
    assert!(routing_query.ends_with("User now: Remind me about that invoice"));

    // Four turns stored, all embedded.
    let turns = store.turns("alice").await;
    assert_eq!(turns.len(), 4);
    assert!(turns.iter().all(|t| t.embedding.is_some()));
}

#[tokio::test]
async fn cache_key_depends_only_on_pinned_content() {
    let ws = workspace();
    let provider = Arc::new(ScriptedProvider::new(&[
        "tecnico", "Restart it.", "tecnico", "Check the cable.",
    ]));
    let router = build(
        &ws,
        provider.clone(),
        Arc::new(InMemoryTurnStore::new(DIM)),
        Arc::default(),
    );

    router
        .respond(routed(&ws, "bob", "my modem blinks red"))
        .await
        .unwrap();
    router
        .respond(routed(&ws, "bob", "still broken after restart"))
        .await
        .unwrap();

    let expected = context_cache_key("You are the Acme support desk.");
    let requests = provider.requests();
    assert_eq!(requests[0].prompt_cache_key, None);
    assert_eq!(requests[1].prompt_cache_key.as_deref(), Some(expected.as_str()));
    assert_eq!(requests[3].prompt_cache_key.as_deref(), Some(expected.as_str()));
    assert_ne!(requests[1].messages, requests[3].messages);
}

#[tokio::test]
async fn script_tool_output_reaches_the_model() {
    let ws = workspace();
    let provider = Arc::new(ScriptedProvider::new(&[
        "faturamento",
        "TOOL:calc_interest 1000 2.5",
        "You would pay 25.00 in interest.",
    ]));
    let router = build(
        &ws,
        provider.clone(),
        Arc::new(InMemoryTurnStore::new(DIM)),
        Arc::default(),
    );

    let reply = router
        .respond(routed_verbose(&ws, "carol", "interest on 1000 at 2.5%?"))
        .await
        .unwrap();

    let trace: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(trace["chosen"], "faturamento.md");
    assert_eq!(trace["tool_requested"], "calc_interest");
    assert_eq!(trace["tool_args"], serde_json::json!(["1000", "2.5"]));
    assert_eq!(trace["tool_output"], "interest=25.00");
    assert_eq!(trace["final_text"], "You would pay 25.00 in interest.");
    assert!(last_system(&provider.requests()[2]).contains("interest=25.00"));
}

#[tokio::test]
async fn unsupported_and_unknown_tools_degrade() {
    let ws = workspace();
    let provider = Arc::new(ScriptedProvider::new(&[
        "geral",
        "TOOL:ticket_search modem",
        "I cannot search tickets yet.",
        "geral",
        "TOOL:refund 123",
    ]));
    let router = build(
        &ws,
        provider.clone(),
        Arc::new(InMemoryTurnStore::new(DIM)),
        Arc::default(),
    );

    let reply = router
        .respond(routed_verbose(&ws, "dave", "find my ticket"))
        .await
        .unwrap();
    let trace: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(trace["tool_output"], "tool kind not supported yet");

    let reply = router
        .respond(routed_verbose(&ws, "dave", "refund please"))
        .await
        .unwrap();
    let trace: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(trace["tool_output"], "tool not found: refund");
    assert_eq!(provider.requests().len(), 5);
}

#[tokio::test]
async fn embedding_outage_still_answers() {
    let ws = workspace();
    let provider = Arc::new(ScriptedProvider::new(&["geral", "Sure."]));
    let store = Arc::new(InMemoryTurnStore::new(DIM));
    let router = build(&ws, provider.clone(), store.clone(), Arc::default());

    let reply = router
        .respond(routed(&ws, "erin", "unembeddable question"))
        .await
        .unwrap();
    assert_eq!(reply, "Sure.");

    let turns = store.turns("erin").await;
    let user = turns.iter().find(|t| t.role == Role::User).unwrap();
    let assistant = turns.iter().find(|t| t.role == Role::Assistant).unwrap();
    assert!(user.embedding.is_none());
    assert!(assistant.embedding.is_some());
}

#[tokio::test]
async fn failed_write_discards_the_answer() {
    let ws = workspace();
    let provider = Arc::new(ScriptedProvider::new(&["geral", "An answer nobody sees."]));
    let router = build(
        &ws,
        provider,
        Arc::new(ReadOnlyStore(InMemoryTurnStore::new(DIM))),
        Arc::default(),
    );

    let err = router
        .respond(routed(&ws, "frank", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Persistence(_)));
    assert!(err.to_string().contains("read-only replica"));
}
