//! The request orchestrator: one user message in, one finished reply out.
//!
//! A turn runs in two phases:
//!
//! 1. **Answer** (bounded by the deadline and the caller's cancellation):
//!    read the pinned context, retrieve memory, build the prompt, call the
//!    model, and run at most one tool round-trip.
//! 2. **Persist** (detached from both): append the user and assistant turns
//!    concurrently and attach metadata. A failed append fails the turn.

use agentkit_config::AppConfig;
use agentkit_core::error::{Error, MemoryError, Result};
use agentkit_core::memory::{RESPONSE_RAW_KEY, TOOL_USED_KEY, TurnStore};
use agentkit_core::message::Role;
use agentkit_core::provider::Provider;
use agentkit_tools::{Dispatch, ToolDispatcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::prompt::PromptBuilder;
use crate::protocol::parse_tool_call;
use crate::retrieval::{RetrievalSettings, Retriever};
use crate::trace::TurnTrace;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Chat model for both calls of a turn
    pub model: String,
    /// Deadline applied when the caller supplies none
    pub turn_timeout: Duration,
    pub retrieval: RetrievalSettings,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4.1-mini".into(),
            turn_timeout: Duration::from_secs(60),
            retrieval: RetrievalSettings::default(),
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            turn_timeout: Duration::from_secs(config.agent.turn_timeout_secs),
            retrieval: RetrievalSettings {
                embedding_model: config.embedding_model.clone(),
                recent_depth: config.memory.recent_depth,
                semantic_top_k: config.memory.semantic_top_k,
                fact_tool: config.memory.fact_tool.clone(),
            },
        }
    }
}

/// One turn's input.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub session_id: String,
    /// File whose content is pinned as the first system message
    pub prompt_path: PathBuf,
    pub message: String,
    /// Extra system messages, added after the memory block in order
    pub extra_system: Vec<String>,
    pub verbose: bool,
    pub deadline: Option<Instant>,
    pub cancel: Option<CancellationToken>,
}

impl TurnRequest {
    pub fn new(
        session_id: impl Into<String>,
        prompt_path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            prompt_path: prompt_path.into(),
            message: message.into(),
            extra_system: Vec::new(),
            verbose: false,
            deadline: None,
            cancel: None,
        }
    }

    pub fn with_system_prompt(mut self, text: impl Into<String>) -> Self {
        self.extra_system.push(text.into());
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Result of the answer phase, handed to persistence.
struct Answer {
    trace: TurnTrace,
    raw: serde_json::Value,
    user_embedding: Option<Vec<f32>>,
}

/// System message carrying a tool result into the second model call.
pub fn tool_result_message(tool: &str, output: &str) -> String {
    format!(
        "The result of tool '{tool}' was:\n{output}\nYou MUST use this information to answer the user."
    )
}

pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    store: Arc<dyn TurnStore>,
    dispatcher: Arc<ToolDispatcher>,
    retriever: Retriever,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<dyn TurnStore>,
        dispatcher: Arc<ToolDispatcher>,
        settings: OrchestratorSettings,
    ) -> Self {
        let retriever = Retriever::new(
            Arc::clone(&provider),
            Arc::clone(&store),
            settings.retrieval.clone(),
        );
        Self {
            provider,
            store,
            dispatcher,
            retriever,
            settings,
        }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run a turn and return its reply: the final text, or the pretty JSON
    /// trace when the request is verbose.
    pub async fn respond(&self, request: TurnRequest) -> Result<String> {
        let verbose = request.verbose;
        Ok(self.run(request).await?.render(verbose))
    }

    /// Run a turn and return its trace.
    pub async fn run(&self, request: TurnRequest) -> Result<TurnTrace> {
        let deadline = request
            .deadline
            .unwrap_or_else(|| Instant::now() + self.settings.turn_timeout);
        let cancel = request.cancel.clone().unwrap_or_default();

        info!(
            session = %request.session_id,
            prompt = %request.prompt_path.display(),
            extras = request.extra_system.len(),
            "Starting turn"
        );

        let answer = bounded(deadline, &cancel, self.answer(&request, &cancel)).await?;

        self.persist(&request.session_id, &request.message, &answer)
            .await?;

        info!(
            session = %request.session_id,
            tool = %answer.trace.tool_requested,
            "Turn complete"
        );
        Ok(answer.trace)
    }

    async fn answer(&self, request: &TurnRequest, cancel: &CancellationToken) -> Result<Answer> {
        let pinned = read_prompt(&request.prompt_path).await?;

        let retrieved = self
            .retriever
            .retrieve(&request.session_id, &request.message, cancel)
            .await;
        let memory_block = retrieved.memory_block();

        let mut builder = PromptBuilder::new()
            .with_cached_context(&pinned)
            .with_system_prompt(&memory_block);
        for extra in &request.extra_system {
            builder = builder.with_system_prompt(extra);
        }

        let mut response = self
            .provider
            .complete(builder.build(&self.settings.model, &request.message))
            .await?;

        let mut trace = TurnTrace {
            final_text: response.output_text.clone(),
            ..TurnTrace::default()
        };

        if let Some(call) = parse_tool_call(&response.output_text) {
            trace.tool_requested = call.name.clone();
            trace.tool_args = call.args.clone();

            match self
                .dispatcher
                .dispatch(&call.name, &call.args, &request.message)
                .await
            {
                Dispatch::NotFound => {
                    trace.tool_output = format!("tool not found: {}", call.name);
                }
                Dispatch::Executed(output) => {
                    let followup = builder
                        .clone()
                        .with_system_prompt(&tool_result_message(&call.name, &output));
                    trace.tool_output = output;

                    debug!(tool = %call.name, "Re-asking the model with the tool result");
                    response = self
                        .provider
                        .complete(followup.build(&self.settings.model, &request.message))
                        .await?;
                    trace.final_text = response.output_text.clone();
                }
            }
        }

        Ok(Answer {
            trace,
            raw: response.raw,
            user_embedding: retrieved.embedding,
        })
    }

    /// Store both turns in a task of its own so neither the caller's
    /// cancellation nor the deadline can cut it short.
    async fn persist(&self, session_id: &str, message: &str, answer: &Answer) -> Result<()> {
        let store = Arc::clone(&self.store);
        let retriever = self.retriever.clone();
        let session_id = session_id.to_string();
        let message = message.to_string();
        let user_embedding = answer.user_embedding.clone();
        let final_text = answer.trace.final_text.clone();
        let raw = answer.raw.clone();
        let tool_used = answer
            .trace
            .tool_fired()
            .then(|| serde_json::to_value(answer.trace.tool_usage()))
            .transpose()?;

        let task = tokio::spawn(async move {
            let user = store.append(&session_id, Role::User, &message, user_embedding.as_deref());

            let assistant = async {
                let embedding = retriever.embed(&final_text).await;
                let id = store
                    .append(&session_id, Role::Assistant, &final_text, embedding.as_deref())
                    .await?;

                if !raw.is_null() {
                    attach_best_effort(store.as_ref(), id, RESPONSE_RAW_KEY, &raw).await;
                }
                if let Some(value) = &tool_used {
                    attach_best_effort(store.as_ref(), id, TOOL_USED_KEY, value).await;
                }
                Ok::<_, MemoryError>(id)
            };

            tokio::try_join!(user, assistant)
        });

        let (user_id, assistant_id) = task
            .await
            .map_err(|e| Error::Internal(format!("persistence task failed: {e}")))?
            .map_err(Error::Persistence)?;

        debug!(user_id, assistant_id, "Persisted turn");
        Ok(())
    }
}

async fn attach_best_effort(
    store: &dyn TurnStore,
    message_id: i64,
    key: &str,
    value: &serde_json::Value,
) {
    if let Err(e) = store.attach_metadata(message_id, key, value).await {
        warn!(message_id, key, error = %e, "Could not attach metadata");
    }
}

/// Read a prompt file; failure is fatal for the turn.
pub(crate) async fn read_prompt(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Prompt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Drive `work` until it finishes, `deadline` passes, or `cancel` fires.
pub(crate) async fn bounded<T>(
    deadline: Instant,
    cancel: &CancellationToken,
    work: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    let budget = deadline.saturating_duration_since(Instant::now());
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        outcome = tokio::time::timeout_at(deadline, work) => match outcome {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(budget.as_secs())),
        },
    }
}
