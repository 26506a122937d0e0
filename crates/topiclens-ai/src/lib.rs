//! Embedding and LLM providers for topiclens.
//!
//! Stages depend on the [`EmbeddingProvider`] and [`LlmProvider`] traits and
//! receive a concrete client by injection, so tests can pass stubs.

pub mod error;
pub mod openai;
pub mod provider;
pub mod retry;
pub mod schema;

pub use error::ProviderError;
pub use openai::{OpenAiClient, OpenAiConfig};
pub use provider::{CompletionRequest, EmbeddingProvider, LlmProvider};
pub use retry::RetryPolicy;
pub use schema::{ResponseSchema, StructuredOutput};
