use async_trait::async_trait;

use crate::error::ProviderError;
use crate::schema::ResponseSchema;

/// Turns text into a fixed-dimension vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier stored next to every vector.
    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// One structured-output completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub schema: ResponseSchema,
}

/// Chat model constrained to answer with JSON matching a schema.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn model_name(&self) -> &str;

    /// Returns the raw JSON text of the answer. Parsing and validation are
    /// the caller's job.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}
