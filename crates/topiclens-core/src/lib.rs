//! Shared configuration and domain vocabulary for topiclens.

use thiserror::Error;

mod app_config;
mod config;
mod domain;
mod topics;

pub use app_config::AppConfig;
pub use config::{load_app_config, load_app_config_from_env};
pub use domain::{Category, RunMode, RunStatus, TrendStatus, DOC_TYPE_REDDIT_POST};
pub use topics::{load_topics, TopicsFile};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read topics file {path}: {source}")]
    TopicsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse topics file: {0}")]
    TopicsFileParse(#[from] serde_yaml::Error),

    #[error("topics validation failed: {0}")]
    Validation(String),
}
