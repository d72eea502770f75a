//! Configuration loading, validation, and management for agentkit.
//!
//! Loads configuration from `~/.agentkit/config.toml` (or an explicit path)
//! with environment variable overrides, and the tool catalog from its own
//! TOML file. Validates all settings at startup.

use agentkit_core::ToolCatalog;
use agentkit_core::memory::is_sql_identifier;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model service API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Chat model used for turns and routing
    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding model used for memory
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Path of the tool catalog
    #[serde(default = "default_tools_path")]
    pub tools_path: PathBuf,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub router: RouterConfig,
}

fn default_model() -> String {
    "gpt-4.1-mini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_tools_path() -> PathBuf {
    PathBuf::from("tools.toml")
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("tools_path", &self.tools_path)
            .field("provider", &self.provider)
            .field("memory", &self.memory)
            .field("agent", &self.agent)
            .field("router", &self.router)
            .finish()
    }
}

/// HTTP transport to the model service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request client timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts per call, first one included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Linear backoff unit; attempt `n` waits `n * backoff_ms`
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    300
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// PostgreSQL URL; when absent the process runs on an in-memory store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default = "default_schema")]
    pub schema: String,

    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    /// Recent turns included in every prompt
    #[serde(default = "default_recent_depth")]
    pub recent_depth: usize,

    /// Similar turns included in every prompt
    #[serde(default = "default_semantic_top_k")]
    pub semantic_top_k: usize,

    /// Tool whose outputs feed the structured facts
    #[serde(default = "default_fact_tool")]
    pub fact_tool: String,
}

fn default_schema() -> String {
    "agentkit".into()
}
fn default_embedding_dim() -> usize {
    1536
}
fn default_recent_depth() -> usize {
    4
}
fn default_semantic_top_k() -> usize {
    5
}
fn default_fact_tool() -> String {
    "db_boleto".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            schema: default_schema(),
            embedding_dim: default_embedding_dim(),
            recent_depth: default_recent_depth(),
            semantic_top_k: default_semantic_top_k(),
            fact_tool: default_fact_tool(),
        }
    }
}

// The URL carries credentials.
impl std::fmt::Debug for MemoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConfig")
            .field("database_url", &redact(&self.database_url))
            .field("schema", &self.schema)
            .field("embedding_dim", &self.embedding_dim)
            .field("recent_depth", &self.recent_depth)
            .field("semantic_top_k", &self.semantic_top_k)
            .field("fact_tool", &self.fact_tool)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Deadline applied to a turn when the caller supplies none
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,
}

fn default_turn_timeout_secs() -> u64 {
    60
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            turn_timeout_secs: default_turn_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Candidate used when the router's answer matches nothing
    #[serde(default = "default_route")]
    pub default_route: String,

    /// Extension of specialized prompt files, without the dot
    #[serde(default = "default_extension")]
    pub extension: String,

    #[serde(default = "default_router_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_route() -> String {
    "geral.md".into()
}
fn default_extension() -> String {
    "md".into()
}
fn default_router_max_output_tokens() -> u32 {
    32
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_route: default_route(),
            extension: default_extension(),
            max_output_tokens: default_router_max_output_tokens(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.agentkit/config.toml)
    /// and apply process environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, apply process environment overrides, validate.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Load from `path`, apply overrides resolved through `lookup`, then
    /// validate the merged result.
    pub fn load_with(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a specific file path without validating it.
    ///
    /// A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// String values replace the configured ones when non-empty. Numeric
    /// values apply only when they parse to a positive integer.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.api_key.is_none() {
            self.api_key = non_empty("AGENTKIT_API_KEY").or_else(|| non_empty("OPENAI_API_KEY"));
        }
        if let Some(model) = non_empty("GPT_MODEL") {
            self.model = model;
        }
        if let Some(model) = non_empty("EMBEDDING_MODEL") {
            self.embedding_model = model;
        }
        if let Some(path) = non_empty("TOOLS_PATH") {
            self.tools_path = PathBuf::from(path);
        }
        if let Some(url) = non_empty("PGSQL").or_else(|| non_empty("DATABASE_URL")) {
            self.memory.database_url = Some(url);
        }
        if let Some(schema) = non_empty("DB_SCHEMA") {
            self.memory.schema = schema;
        }

        let positive = |key: &str| {
            non_empty(key)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
        };
        if let Some(dim) = positive("EMBEDDING_DIM") {
            self.memory.embedding_dim = dim;
        }
        if let Some(depth) = positive("MEM_DEPTH") {
            self.memory.recent_depth = depth;
        }
        if let Some(k) = positive("MEM_SEM_TOPK") {
            self.memory.semantic_top_k = k;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentkit")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.embedding_dim == 0 {
            return Err(ConfigError::ValidationError(
                "memory.embedding_dim must be > 0".into(),
            ));
        }

        if !is_sql_identifier(&self.memory.schema) {
            return Err(ConfigError::ValidationError(format!(
                "memory.schema '{}' is not a valid SQL identifier",
                self.memory.schema
            )));
        }

        if self.agent.turn_timeout_secs == 0 || self.provider.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts must be > 0 seconds".into(),
            ));
        }

        if self.provider.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "provider.max_attempts must be >= 1".into(),
            ));
        }

        if self.router.extension.is_empty() || self.router.extension.starts_with('.') {
            return Err(ConfigError::ValidationError(
                "router.extension must be non-empty and given without the dot".into(),
            ));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            embedding_model: default_embedding_model(),
            tools_path: default_tools_path(),
            provider: ProviderConfig::default(),
            memory: MemoryConfig::default(),
            agent: AgentConfig::default(),
            router: RouterConfig::default(),
        }
    }
}

/// Load the tool catalog from a TOML file of `[[tools]]` tables and resolve
/// `ENV:` connection references through `lookup`.
///
/// A missing file yields an empty catalog.
pub fn load_tool_catalog(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ToolCatalog, ConfigError> {
    if !path.exists() {
        tracing::info!("No tool catalog at {}, no tools available", path.display());
        return Ok(ToolCatalog::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut catalog: ToolCatalog = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    catalog.resolve_connections(lookup);

    tracing::debug!(tools = catalog.len(), "Loaded tool catalog");
    Ok(catalog)
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
