use thiserror::Error;
use topiclens_ai::ProviderError;
use topiclens_db::DbError;

/// Stage-fatal failures. Per-item problems are collected in each stage's
/// stats instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("embedding for {doc_id} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        doc_id: String,
        expected: usize,
        actual: usize,
    },
}
