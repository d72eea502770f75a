//! Language-model service providers for agentkit.
//!
//! All providers implement the `agentkit_core::Provider` trait.

pub mod openai;
pub mod retry;

pub use openai::OpenAiProvider;
pub use retry::RetryPolicy;
