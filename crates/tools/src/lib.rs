//! Declarative tool execution for agentkit.
//!
//! Tools are definitions from the catalog, not code. The dispatcher knows
//! three kinds:
//! - `postgres`: a parametrized query whose rows are flattened to text
//! - `postgres_embedding`: a nearest-neighbour lookup over an embedding column
//! - `script`: a Rust closure from an explicit [`ScriptRegistry`]
//!
//! Anything else executes to a fixed placeholder.

pub mod backend;
pub mod dispatcher;
pub mod script;

pub use backend::QueryBackend;
#[cfg(feature = "postgres")]
pub use backend::PgQueryBackend;
pub use dispatcher::{Dispatch, ToolDispatcher};
pub use script::ScriptRegistry;
