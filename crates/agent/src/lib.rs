//! The agentkit turn engine.
//!
//! A turn goes through the [`Router`] (optional prompt selection) into the
//! [`Orchestrator`]:
//!
//! 1. **Retrieve** recent turns, structured facts and similar turns, in
//!    parallel and best-effort
//! 2. **Prompt** with the pinned context, the memory block, caller extras
//!    and the user message
//! 3. **Answer**, with at most one `TOOL:` round-trip through the dispatcher
//! 4. **Persist** both turns and their metadata in a detached task

pub mod memory_block;
pub mod orchestrator;
pub mod prompt;
pub mod protocol;
pub mod retrieval;
pub mod router;
pub mod trace;

#[cfg(test)]
mod test_helpers;

pub use orchestrator::{Orchestrator, OrchestratorSettings, TurnRequest};
pub use prompt::{PromptBuilder, context_cache_key};
pub use protocol::{ToolInvocation, parse_tool_call};
pub use retrieval::{RetrievalSettings, Retrieved, Retriever};
pub use router::{RouteRequest, Router, RouterSettings};
pub use trace::{RouteTrace, TurnTrace};
