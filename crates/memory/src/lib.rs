//! Turn store implementations for agentkit.

pub mod in_memory;
pub mod vector;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryTurnStore;
pub use vector::{cosine_distance, cosine_similarity, encode_vector};

#[cfg(feature = "postgres")]
pub use postgres::PgTurnStore;
