//! Thin collectors that feed the pipeline: Reddit search, SerpAPI AI
//! Overviews and Search Console CSV exports.

mod error;
pub mod gsc;
pub mod reddit;
pub mod serp;

pub use error::CollectError;
pub use gsc::{ingest_gsc_csv, GscIngestStats};
pub use reddit::{collect_reddit, RedditClient, RedditCollectSettings, RedditConfig, RedditStats};
pub use serp::{collect_serp_aio, SerpApiClient, SerpStats};

/// Rows per upsert transaction.
pub const UPSERT_CHUNK: usize = 500;
