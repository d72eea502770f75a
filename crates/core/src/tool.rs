//! Tool definitions: declarative capabilities the model can request.
//!
//! Tools are not code here: each one is a definition (kind + connection +
//! kind-specific parameters) that the dispatcher knows how to execute.
//! The catalog is built once at startup and shared read-only.

use serde::{Deserialize, Serialize};

/// How a tool is executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ToolKind {
    /// Parametrized SQL query (`postgres`)
    Query,
    /// Nearest-neighbour lookup over an embedding column (`postgres_embedding`)
    EmbeddingSearch,
    /// A function registered in the script registry (`script`)
    Script,
    /// Anything else; executes to a placeholder text
    Unsupported(String),
}

impl From<String> for ToolKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "postgres" => ToolKind::Query,
            "postgres_embedding" => ToolKind::EmbeddingSearch,
            "script" => ToolKind::Script,
            _ => ToolKind::Unsupported(kind),
        }
    }
}

impl From<ToolKind> for String {
    fn from(kind: ToolKind) -> Self {
        match kind {
            ToolKind::Query => "postgres".into(),
            ToolKind::EmbeddingSearch => "postgres_embedding".into(),
            ToolKind::Script => "script".into(),
            ToolKind::Unsupported(other) => other,
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolKind::Query => f.write_str("postgres"),
            ToolKind::EmbeddingSearch => f.write_str("postgres_embedding"),
            ToolKind::Script => f.write_str("script"),
            ToolKind::Unsupported(other) => f.write_str(other),
        }
    }
}

/// A declared tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The unique name the model uses to request this tool
    pub name: String,

    /// What the tool does (for prompt authors)
    #[serde(default)]
    pub description: String,

    #[serde(rename = "type")]
    pub kind: ToolKind,

    /// Connection string, or `ENV:<VAR>` before resolution
    #[serde(default)]
    pub conn: String,

    // --- postgres ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_template: Option<String>,

    // --- postgres_embedding ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,

    // --- script ---
    /// Call declaration such as `calc_interest($1, $2)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

/// Prefix marking a connection string that must be read from the environment.
pub const ENV_CONN_PREFIX: &str = "ENV:";

impl ToolDefinition {
    /// Replace an `ENV:<VAR>` connection with the variable's value
    /// (empty when unset).
    pub fn resolve_conn(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(var) = self.conn.strip_prefix(ENV_CONN_PREFIX) {
            self.conn = lookup(var).unwrap_or_default();
        }
    }
}

/// The ordered, read-only set of declared tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCatalog {
    #[serde(default)]
    tools: Vec<ToolDefinition>,
}

impl ToolCatalog {
    pub fn new(tools: Vec<ToolDefinition>) -> Self {
        Self { tools }
    }

    /// Look a tool up by exact name. The first declaration wins.
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Declared names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolve every `ENV:` connection reference.
    pub fn resolve_connections(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for tool in &mut self.tools {
            tool.resolve_conn(&lookup);
        }
    }
}
