//! Embedding stage: one vector per accepted post per run.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use sqlx::PgPool;
use topiclens_ai::{EmbeddingProvider, RetryPolicy};
use topiclens_core::{AppConfig, DOC_TYPE_REDDIT_POST};
use topiclens_db::NewEmbedding;

use crate::preprocess::CleanDocument;
use crate::PipelineError;

const DRY_RUN_SAMPLES: usize = 3;

#[derive(Debug, Clone)]
pub struct EmbedSettings {
    /// Most posts embedded in one pass.
    pub batch_limit: i64,
    /// Pause between provider calls.
    pub delay: Duration,
    pub retry: RetryPolicy,
    pub dry_run: bool,
}

impl Default for EmbedSettings {
    fn default() -> Self {
        Self {
            batch_limit: 1000,
            delay: Duration::from_millis(100),
            retry: RetryPolicy::new(3, 2),
            dry_run: false,
        }
    }
}

impl EmbedSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig, dry_run: bool) -> Self {
        Self {
            batch_limit: config.embed_batch_limit,
            delay: Duration::from_millis(config.embed_delay_ms),
            retry: RetryPolicy::new(config.api_max_retries, config.api_backoff_factor),
            dry_run,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmbedStats {
    pub processed: usize,
    pub created: usize,
    pub errors: Vec<String>,
}

/// Embed every accepted post that has no vector for `run_id` yet.
///
/// Posts are taken in preprocessing order up to `settings.batch_limit`.
/// A provider failure that survives the retry policy is recorded against
/// the post and the batch moves on, so a re-run picks up exactly the posts
/// that are still missing.
///
/// # Errors
///
/// Returns [`PipelineError::Provider`] on authentication or configuration
/// failures, which no later post could get past, and
/// [`PipelineError::Db`] if the candidate query or a write fails.
pub async fn generate_embeddings(
    pool: &PgPool,
    provider: &dyn EmbeddingProvider,
    run_id: i64,
    accepted: &[CleanDocument],
    settings: &EmbedSettings,
) -> Result<EmbedStats, PipelineError> {
    let by_id: HashMap<&str, &CleanDocument> =
        accepted.iter().map(|d| (d.doc_id.as_str(), d)).collect();
    let eligible: Vec<String> = accepted.iter().map(|d| d.doc_id.clone()).collect();

    let candidates = topiclens_db::list_posts_missing_embedding(
        pool,
        DOC_TYPE_REDDIT_POST,
        run_id,
        &eligible,
        settings.batch_limit,
    )
    .await?;

    tracing::info!(
        run_id,
        candidates = candidates.len(),
        model = provider.model_name(),
        "generating embeddings"
    );

    let mut stats = EmbedStats::default();

    for (index, row) in candidates.iter().enumerate() {
        let Some(doc) = by_id.get(row.reddit_post_id.as_str()) else {
            continue;
        };
        stats.processed += 1;

        if settings.dry_run {
            if index < DRY_RUN_SAMPLES {
                tracing::info!(
                    dry_run = true,
                    doc_id = %doc.doc_id,
                    text_hash = %doc.text_hash,
                    chars = doc.text.chars().count(),
                    "would embed post"
                );
            }
            continue;
        }

        if index > 0 && !settings.delay.is_zero() {
            tokio::time::sleep(settings.delay).await;
        }

        let label = format!("embed {}", doc.doc_id);
        let vector = match settings
            .retry
            .run(&label, |_| provider.embed(&doc.text))
            .await
        {
            Ok(vector) => vector,
            Err(err) if err.is_fatal() => {
                tracing::error!(run_id, doc_id = %doc.doc_id, error = %err, "aborting embedding stage");
                return Err(err.into());
            }
            Err(err) => {
                tracing::error!(run_id, doc_id = %doc.doc_id, error = %err, "embedding failed");
                stats.errors.push(format!("{}: {err}", doc.doc_id));
                continue;
            }
        };

        topiclens_db::upsert_embedding(
            pool,
            &NewEmbedding {
                doc_type: DOC_TYPE_REDDIT_POST.to_string(),
                doc_id: doc.doc_id.clone(),
                run_id,
                vector,
                text_hash: doc.text_hash.clone(),
                model_name: provider.model_name().to_string(),
            },
        )
        .await?;
        stats.created += 1;
    }

    tracing::info!(
        run_id,
        processed = stats.processed,
        created = stats.created,
        errors = stats.errors.len(),
        "embedding complete"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_batch_limits() {
        let settings = EmbedSettings::default();
        assert_eq!(settings.batch_limit, 1000);
        assert_eq!(settings.delay, Duration::from_millis(100));
        assert!(!settings.dry_run);
    }
}
