//! LLM brief generation.
//!
//! Each candidate cluster moves through [`BriefState`]: its prompt and
//! evidence pack are built from stored data, the model answers with JSON
//! constrained by the [`BriefDraft`] schema, the answer is validated and the
//! brief is upserted on `(cluster_id, model_version)`. A failed cluster is
//! recorded in the stats and the batch moves on; only authentication and
//! configuration errors stop the stage.

pub mod draft;
pub mod evidence;
pub mod prompt;

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use topiclens_ai::{CompletionRequest, LlmProvider, ProviderError, ResponseSchema, RetryPolicy};
use topiclens_core::AppConfig;
use topiclens_db::{ClusterRow, NewBrief};

pub use draft::{BriefDraft, WhyNow};
pub use evidence::{build_evidence_pack, EvidencePack};
pub use prompt::{build_prompt, PromptInputs, SYSTEM_PROMPT};

use crate::keywords::top_terms;
use crate::PipelineError;

const SCHEMA_NAME: &str = "topic_brief";
const PROMPT_MONTHS: i64 = 3;
const PROMPT_GSC_KEYWORDS: usize = 10;
const PROMPT_GSC_LIMIT: i64 = 10;
const PROMPT_SERP_KEYWORDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BriefState {
    Pending,
    PromptBuilt,
    LlmCalled,
    Validated,
    Persisted,
    /// Nothing to ask about (no members) or a dry run.
    Skipped,
    Failed,
}

#[derive(Debug, Clone)]
pub struct BriefSettings {
    /// Largest clusters considered, by size.
    pub max_briefs: i64,
    /// Keywords computed on the fly when a cluster has none stored.
    pub top_keywords: usize,
    pub model_version: String,
    /// Pause between LLM calls.
    pub delay: Duration,
    pub retry: RetryPolicy,
    pub dry_run: bool,
}

impl Default for BriefSettings {
    fn default() -> Self {
        Self {
            max_briefs: 50,
            top_keywords: 15,
            model_version: "1.0".to_string(),
            delay: Duration::from_secs(1),
            retry: RetryPolicy::new(2, 2),
            dry_run: false,
        }
    }
}

impl BriefSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig, dry_run: bool) -> Self {
        Self {
            max_briefs: config.max_briefs,
            top_keywords: config.top_keywords,
            model_version: config.llm_model_version.clone(),
            delay: Duration::from_millis(config.llm_delay_ms),
            retry: RetryPolicy::new(config.llm_max_retries, config.api_backoff_factor),
            dry_run,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BriefStats {
    pub clusters_processed: usize,
    pub briefs_created: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Ask `llm` for a brief and validate the answer, retrying transient and
/// validation failures under `retry`.
///
/// # Errors
///
/// Returns the last [`ProviderError`] once retries are exhausted, or the
/// first non-retryable one.
pub async fn draft_brief(
    llm: &dyn LlmProvider,
    prompt: &str,
    retry: &RetryPolicy,
    label: &str,
) -> Result<BriefDraft, ProviderError> {
    let request = CompletionRequest {
        system: SYSTEM_PROMPT.to_string(),
        prompt: prompt.to_string(),
        schema: ResponseSchema::of::<BriefDraft>(SCHEMA_NAME),
    };
    let request = &request;

    retry
        .run(label, |attempt| async move {
            tracing::debug!(operation = label, attempt, "calling llm");
            let raw = llm.complete(request).await?;
            BriefDraft::parse(&raw)
        })
        .await
}

fn advance(cluster_id: i64, state: &mut BriefState, next: BriefState) {
    tracing::debug!(cluster_id, from = ?state, to = ?next, "brief state");
    *state = next;
}

fn why_now_json(why_now: Option<&WhyNow>) -> Result<Option<Value>, PipelineError> {
    Ok(why_now.map(serde_json::to_value).transpose()?)
}

/// Outcome of one cluster that did not fail.
#[derive(Debug, PartialEq, Eq)]
enum ClusterOutcome {
    Persisted(i64),
    /// No members, or a dry run.
    Skipped,
}

async fn process_cluster(
    pool: &PgPool,
    llm: &dyn LlmProvider,
    run_id: i64,
    cluster: &ClusterRow,
    settings: &BriefSettings,
    state: &mut BriefState,
) -> Result<ClusterOutcome, PipelineError> {
    let members = topiclens_db::list_cluster_members(pool, cluster.id, run_id).await?;
    if members.is_empty() {
        tracing::warn!(run_id, cluster_id = cluster.id, "cluster has no member posts, skipping");
        advance(cluster.id, state, BriefState::Skipped);
        return Ok(ClusterOutcome::Skipped);
    }

    let mut keywords = cluster.keyword_list();
    if keywords.is_empty() {
        let documents: Vec<String> = members
            .iter()
            .map(|m| format!("{} {}", m.title, m.body.as_deref().unwrap_or_default()))
            .collect();
        keywords = top_terms(&documents, settings.top_keywords);
    }

    let timeseries =
        topiclens_db::list_recent_timeseries(pool, cluster.id, run_id, PROMPT_MONTHS).await?;
    let gsc_patterns = topiclens_db::substring_patterns(
        &keywords[..keywords.len().min(PROMPT_GSC_KEYWORDS)],
    );
    let gsc = topiclens_db::list_gsc_matching(pool, &gsc_patterns, PROMPT_GSC_LIMIT).await?;
    let serp_patterns = topiclens_db::substring_patterns(
        &keywords[..keywords.len().min(PROMPT_SERP_KEYWORDS)],
    );
    let serp = topiclens_db::latest_serp_aio_matching(pool, &serp_patterns).await?;

    let prompt = build_prompt(&PromptInputs {
        members: &members,
        keywords: &keywords,
        timeseries: &timeseries,
        gsc: &gsc,
        serp: serp.as_ref(),
    });
    advance(cluster.id, state, BriefState::PromptBuilt);

    let evidence_posts = evidence::top_posts(&members);
    let post_ids: Vec<String> = evidence_posts
        .iter()
        .map(|p| p.reddit_post_id.clone())
        .collect();
    let comments = topiclens_db::list_top_comments(pool, &post_ids).await?;
    let sources = evidence::source_keywords(&members);
    let evidence_gsc = topiclens_db::list_gsc_matching(
        pool,
        &topiclens_db::substring_patterns(&sources),
        evidence::GSC_QUERIES,
    )
    .await?;
    let evidence_serp = topiclens_db::latest_serp_aio_matching(
        pool,
        &topiclens_db::substring_patterns(&sources[..sources.len().min(evidence::SERP_KEYWORDS)]),
    )
    .await?;
    let pack = build_evidence_pack(
        &evidence_posts,
        &comments,
        &evidence_gsc,
        evidence_serp.as_ref(),
    );

    if settings.dry_run {
        tracing::info!(
            dry_run = true,
            cluster_id = cluster.id,
            size = cluster.size,
            prompt_chars = prompt.chars().count(),
            evidence_posts = pack.reddit_posts.len(),
            keywords = ?keywords.iter().take(5).collect::<Vec<_>>(),
            "would request brief"
        );
        advance(cluster.id, state, BriefState::Skipped);
        return Ok(ClusterOutcome::Skipped);
    }

    advance(cluster.id, state, BriefState::LlmCalled);
    let label = format!("brief cluster {}", cluster.id);
    let draft = draft_brief(llm, &prompt, &settings.retry, &label).await?;
    advance(cluster.id, state, BriefState::Validated);
    let why_now = why_now_json(draft.why_now.as_ref())?;

    let brief_id = topiclens_db::upsert_brief(
        pool,
        &NewBrief {
            cluster_id: cluster.id,
            category: draft.category,
            topic_title: draft.topic_title.trim().to_string(),
            primary_question: draft.primary_question,
            related_questions: draft.related_questions,
            blog_angle: draft.blog_angle,
            social_angle: draft.social_angle,
            why_now,
            evidence_summary: draft.evidence_summary,
            evidence_pack: pack.to_json(),
            model_name: llm.model_name().to_string(),
            model_version: settings.model_version.clone(),
            run_id,
        },
    )
    .await?;
    advance(cluster.id, state, BriefState::Persisted);

    Ok(ClusterOutcome::Persisted(brief_id))
}

/// Generate briefs for the largest clusters of `run_id`.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if the candidate clusters cannot be read,
/// and [`PipelineError::Provider`] on authentication or configuration
/// failures. Every other failure is recorded in [`BriefStats::errors`].
pub async fn generate_briefs(
    pool: &PgPool,
    llm: &dyn LlmProvider,
    run_id: i64,
    settings: &BriefSettings,
) -> Result<BriefStats, PipelineError> {
    let clusters = topiclens_db::list_top_clusters_by_size(pool, run_id, settings.max_briefs).await?;
    tracing::info!(
        run_id,
        candidates = clusters.len(),
        model = llm.model_name(),
        model_version = %settings.model_version,
        "generating briefs"
    );

    let mut stats = BriefStats::default();

    for (index, cluster) in clusters.iter().enumerate() {
        if index > 0 && !settings.dry_run && !settings.delay.is_zero() {
            tokio::time::sleep(settings.delay).await;
        }

        stats.clusters_processed += 1;
        let mut state = BriefState::Pending;

        match process_cluster(pool, llm, run_id, cluster, settings, &mut state).await {
            Ok(ClusterOutcome::Persisted(brief_id)) => {
                stats.briefs_created += 1;
                tracing::debug!(run_id, cluster_id = cluster.id, brief_id, "brief persisted");
            }
            Ok(ClusterOutcome::Skipped) => stats.skipped += 1,
            Err(PipelineError::Provider(err)) if err.is_fatal() => {
                tracing::error!(run_id, cluster_id = cluster.id, error = %err, "aborting brief stage");
                return Err(err.into());
            }
            Err(err) => {
                let from = state;
                advance(cluster.id, &mut state, BriefState::Failed);
                tracing::error!(
                    run_id,
                    cluster_id = cluster.id,
                    state = ?from,
                    error = %err,
                    "brief generation failed"
                );
                stats.errors.push(format!("cluster {}: {err}", cluster.id));
            }
        }
    }

    tracing::info!(
        run_id,
        processed = stats.clusters_processed,
        created = stats.briefs_created,
        skipped = stats.skipped,
        errors = stats.errors.len(),
        "brief generation complete"
    );
    Ok(stats)
}

#[cfg(test)]
#[path = "briefs_test.rs"]
mod tests;
