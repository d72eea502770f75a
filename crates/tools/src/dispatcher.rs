//! Tool dispatcher: name → definition → textual result.
//!
//! Execution never fails the caller. Every error is folded into the output
//! text so a broken tool degrades a turn instead of aborting it.

use agentkit_core::error::ToolError;
use agentkit_core::provider::{EmbeddingRequest, Provider};
use agentkit_core::tool::{ToolCatalog, ToolDefinition, ToolKind};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{QueryBackend, Row};
use crate::script::ScriptRegistry;

/// Output for a query that returned nothing.
pub const NO_RESULTS: &str = "No results found.";

/// Output for a tool whose kind has no executor.
pub const UNSUPPORTED_KIND: &str = "tool kind not supported yet";

/// Separator between embedding-search hits.
pub const HIT_SEPARATOR: &str = "\n---\n";

const DEFAULT_TOP_K: usize = 5;

/// Outcome of dispatching a tool request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// No tool with that name is declared
    NotFound,
    /// The tool ran; holds its output or the error text
    Executed(String),
}

pub struct ToolDispatcher {
    catalog: Arc<ToolCatalog>,
    backend: Arc<dyn QueryBackend>,
    provider: Arc<dyn Provider>,
    scripts: Arc<ScriptRegistry>,
}

impl ToolDispatcher {
    pub fn new(
        catalog: Arc<ToolCatalog>,
        backend: Arc<dyn QueryBackend>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        Self {
            catalog,
            backend,
            provider,
            scripts: Arc::new(ScriptRegistry::new()),
        }
    }

    pub fn with_scripts(mut self, scripts: ScriptRegistry) -> Self {
        self.scripts = Arc::new(scripts);
        self
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Run the tool `name` with `args`. `user_message` is the fallback query
    /// for embedding searches called without arguments.
    pub async fn dispatch(&self, name: &str, args: &[String], user_message: &str) -> Dispatch {
        let Some(tool) = self.catalog.get(name) else {
            warn!(tool = name, "Requested tool is not declared");
            return Dispatch::NotFound;
        };

        info!(tool = name, kind = %tool.kind, args = args.len(), "Executing tool");

        match self.execute(tool, args, user_message).await {
            Ok(output) => {
                debug!(tool = name, bytes = output.len(), "Tool finished");
                Dispatch::Executed(output)
            }
            Err(e) => {
                let reason = describe(&e);
                warn!(tool = name, error = %reason, "Tool failed");
                Dispatch::Executed(format!("error executing tool {name}: {reason}"))
            }
        }
    }

    async fn execute(
        &self,
        tool: &ToolDefinition,
        args: &[String],
        user_message: &str,
    ) -> Result<String, ToolError> {
        match &tool.kind {
            ToolKind::Query => {
                let template = required(tool, "query_template", tool.query_template.as_deref())?;
                let rows = self.backend.query_rows(&tool.conn, template, args).await?;
                Ok(render_rows(&rows))
            }
            ToolKind::EmbeddingSearch => {
                let table = required(tool, "table", tool.table.as_deref())?;
                let column = required(tool, "column", tool.column.as_deref())?;
                let model = required(tool, "embedding_model", tool.embedding_model.as_deref())?;
                let top_k = tool.top_k.filter(|k| *k > 0).unwrap_or(DEFAULT_TOP_K);

                let query = if args.is_empty() {
                    user_message.to_string()
                } else {
                    args.join(" ")
                };
                let embedding = self
                    .provider
                    .embed(EmbeddingRequest::new(model, query))
                    .await
                    .map_err(|e| ToolError::ExecutionFailed {
                        tool_name: tool.name.clone(),
                        reason: format!("embedding failed: {e}"),
                    })?;

                let hits = self
                    .backend
                    .nearest_neighbors(&tool.conn, table, column, &embedding, top_k)
                    .await?;
                if hits.is_empty() {
                    Ok(NO_RESULTS.to_string())
                } else {
                    Ok(hits.join(HIT_SEPARATOR))
                }
            }
            ToolKind::Script => {
                let declaration = required(tool, "function", tool.function.as_deref())?;
                self.scripts.call(declaration, args)
            }
            ToolKind::Unsupported(_) => Ok(UNSUPPORTED_KIND.to_string()),
        }
    }
}

fn required<'a>(
    tool: &ToolDefinition,
    field: &str,
    value: Option<&'a str>,
) -> Result<&'a str, ToolError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ToolError::Misconfigured {
            tool_name: tool.name.clone(),
            reason: format!("missing '{field}'"),
        })
}

fn describe(e: &ToolError) -> String {
    match e {
        ToolError::ExecutionFailed { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

/// One `col=value col=value` line per row, or the no-results sentinel.
fn render_rows(rows: &[Row]) -> String {
    if rows.is_empty() {
        return NO_RESULTS.to_string();
    }
    let mut out = String::new();
    for row in rows {
        let line: Vec<String> = row.iter().map(|(c, v)| format!("{c}={v}")).collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    out
}
