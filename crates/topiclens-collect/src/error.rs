use thiserror::Error;
use topiclens_db::DbError;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Reddit API error: {0}")]
    Reddit(String),

    #[error("SerpAPI error: {0}")]
    SerpApi(String),

    #[error("GSC CSV file not found: {0}")]
    GscFileMissing(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("collector misconfigured: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Db(#[from] DbError),
}
