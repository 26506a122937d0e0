//! Postgres access layer for the topiclens pipeline.
//!
//! Every write is an upsert keyed by the table's natural key so that any stage
//! can be re-run for the same `run_id` without duplicating rows.

use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;
use topiclens_core::AppConfig;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 2;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("pipeline run {id} is not in '{expected_status}' status")]
    InvalidRunTransition {
        id: i64,
        expected_status: &'static str,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Build `ILIKE` patterns that match any of `terms` as a substring.
///
/// `%`, `_` and `\` inside a term are escaped so they match literally.
#[must_use]
pub fn substring_patterns<S: AsRef<str>>(terms: &[S]) -> Vec<String> {
    terms
        .iter()
        .map(|t| {
            let mut escaped = String::with_capacity(t.as_ref().len() + 2);
            escaped.push('%');
            for c in t.as_ref().chars() {
                if matches!(c, '%' | '_' | '\\') {
                    escaped.push('\\');
                }
                escaped.push(c);
            }
            escaped.push('%');
            escaped
        })
        .collect()
}

pub mod briefs;
pub mod clusters;
pub mod documents;
pub mod embeddings;
pub mod external;
pub mod pipeline_runs;
pub mod timeseries;

pub use briefs::{
    count_briefs_for_run, list_briefs_for_run, set_brief_score, upsert_brief, BriefRow, NewBrief,
};
pub use clusters::{
    count_assignments_for_run, latest_clustered_run_id, list_cluster_members,
    list_clusters_for_run, list_top_clusters_by_size, persist_cluster, prune_stale_clusters,
    set_cluster_keywords, ClusterMemberRow, ClusterRow, NewAssignment, NewCluster, PruneStats,
};
pub use documents::{
    list_posts_for_preprocess, list_posts_missing_embedding, list_top_comments,
    upsert_reddit_comments, upsert_reddit_posts, CommentRow, NewRedditComment, NewRedditPost,
    PostTextRow,
};
pub use embeddings::{
    count_embeddings_for_run, list_embeddings_for_run, upsert_embedding, EmbeddingRow,
    NewEmbedding,
};
pub use external::{
    latest_serp_aio_matching, list_gsc_matching, upsert_gsc_rows, upsert_serp_aio,
    GscQueryAggregate, NewGscRow, NewSerpAio, SerpAioRow,
};
pub use pipeline_runs::{
    complete_pipeline_run, create_pipeline_run, fail_pipeline_run, get_pipeline_run,
    list_pipeline_runs, reap_stale_pipeline_runs, resume_pipeline_run, touch_pipeline_run,
    PipelineRunRow,
};
pub use timeseries::{list_recent_timeseries, replace_cluster_timeseries, TimeseriesPoint};
