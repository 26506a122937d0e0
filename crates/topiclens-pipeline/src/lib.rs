//! Batch analysis stages of topiclens.
//!
//! Every stage takes the pool and a `run_id`, reads what earlier stages
//! stored for that run and upserts its own output, so any stage can be
//! re-run without duplicating rows.

pub mod briefs;
pub mod clustering;
pub mod embed;
mod error;
pub mod keywords;
pub mod preprocess;
pub mod scoring;
pub mod timeseries;

pub use briefs::{generate_briefs, BriefSettings, BriefStats};
pub use clustering::{run_clustering_pipeline, ClusterSettings, ClusterStats};
pub use embed::{generate_embeddings, EmbedSettings, EmbedStats};
pub use error::PipelineError;
pub use keywords::{extract_keywords, extract_keywords_for_cluster, KeywordSettings, KeywordStats};
pub use preprocess::{preprocess, CleanDocument, PreprocessStats};
pub use scoring::{calculate_scores, ScoreStats};
pub use timeseries::{generate_timeseries, TimeseriesStats};
