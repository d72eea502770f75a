//! # agentkit core
//!
//! Domain types, traits, and error definitions for the agentkit turn pipeline.
//! This crate has **no I/O dependencies**: it defines the model that the
//! memory, tools, providers and agent crates implement against.
//!
//! ## Layout
//!
//! - [`message`]: roles, prompt messages and stored turns
//! - [`provider`]: the language-model service seam
//! - [`memory`]: the turn store seam and the structured-fact projection
//! - [`tool`]: declarative tool definitions and the read-only catalog

pub mod error;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use memory::{MetadataRecord, StructuredFacts, ToolUsage, TurnStore};
pub use message::{PromptMessage, Role, Turn};
pub use provider::{EmbeddingRequest, Provider, ProviderRequest, ProviderResponse};
pub use tool::{ToolCatalog, ToolDefinition, ToolKind};
