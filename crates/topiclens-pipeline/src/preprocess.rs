//! Cleaning, validation and deduplication of collected posts.
//!
//! Raw rows are never modified. The stage returns the surviving documents so
//! the embedder only works on posts that passed every filter.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use topiclens_db::PostTextRow;

use crate::PipelineError;

const MIN_TITLE_CHARS: usize = 10;
const MIN_BODY_CHARS: usize = 50;

/// How many accepted posts are logged in a dry run.
const DRY_RUN_SAMPLES: usize = 5;

static MARKUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Question, how-to and idea-seeking phrasings. Matched against the
/// lower-cased `"{title} {body}"`.
static INTENT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^(how|what|why|when|where|can|should|do|does|is|are)",
        r"how to",
        r"ideas? for",
        r"tips? for",
        r"ways? to",
        r"looking for",
        r"need help",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreprocessStats {
    pub total: usize,
    pub valid: usize,
    pub cleaned: usize,
    pub duplicates_removed: usize,
    pub errors: Vec<String>,
}

/// A post that passed validation and deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanDocument {
    pub doc_id: String,
    /// Cleaned `"{title} {body}"`, the exact text that gets embedded.
    pub text: String,
    /// SHA-256 hex digest of `text`.
    pub text_hash: String,
}

/// Strip `<...>` markup, collapse whitespace runs and trim.
#[must_use]
pub fn clean_text(text: &str) -> String {
    let without_markup = MARKUP.replace_all(text, "");
    WHITESPACE
        .replace_all(&without_markup, " ")
        .trim()
        .to_string()
}

/// Whether a cleaned title/body pair looks like a question, a how-to or an
/// idea request long enough to be useful.
#[must_use]
pub fn is_valid_content(title: &str, body: &str) -> bool {
    if title.chars().count() < MIN_TITLE_CHARS || body.chars().count() < MIN_BODY_CHARS {
        return false;
    }

    let combined = format!("{title} {body}").to_lowercase();
    INTENT_PATTERNS.iter().any(|p| p.is_match(&combined))
}

/// Lower-case hex SHA-256 of `text`.
#[must_use]
pub fn text_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Filter and deduplicate `posts`, which must already be in preprocessing
/// order (`created_utc DESC, reddit_post_id`). The first occurrence of a
/// duplicate wins.
#[must_use]
pub fn preprocess_posts(posts: &[PostTextRow]) -> (PreprocessStats, Vec<CleanDocument>) {
    let mut stats = PreprocessStats {
        total: posts.len(),
        ..PreprocessStats::default()
    };
    let mut seen = HashSet::new();
    let mut accepted = Vec::new();

    for post in posts {
        if post.reddit_post_id.trim().is_empty() {
            stats
                .errors
                .push(format!("post with created_utc {} has an empty id", post.created_utc));
            continue;
        }

        let title = clean_text(&post.title);
        let body = clean_text(post.body.as_deref().unwrap_or_default());
        if !is_valid_content(&title, &body) {
            continue;
        }
        stats.valid += 1;

        let text = format!("{title} {body}");
        let hash = text_hash(&text);
        if !seen.insert(hash.clone()) {
            stats.duplicates_removed += 1;
            continue;
        }

        stats.cleaned += 1;
        accepted.push(CleanDocument {
            doc_id: post.reddit_post_id.clone(),
            text,
            text_hash: hash,
        });
    }

    (stats, accepted)
}

/// Load every post and run [`preprocess_posts`] over it.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if posts cannot be loaded.
pub async fn preprocess(
    pool: &PgPool,
    run_id: i64,
    dry_run: bool,
) -> Result<(PreprocessStats, Vec<CleanDocument>), PipelineError> {
    let posts = topiclens_db::list_posts_for_preprocess(pool).await?;
    tracing::info!(run_id, total = posts.len(), "preprocessing posts");

    let (stats, accepted) = preprocess_posts(&posts);

    for error in &stats.errors {
        tracing::error!(error = %error, "skipping malformed post");
    }
    if dry_run {
        for doc in accepted.iter().take(DRY_RUN_SAMPLES) {
            let sample: String = doc.text.chars().take(50).collect();
            tracing::info!(dry_run = true, doc_id = %doc.doc_id, sample = %sample, "cleaned post");
        }
    }

    tracing::info!(
        run_id,
        total = stats.total,
        valid = stats.valid,
        cleaned = stats.cleaned,
        duplicates_removed = stats.duplicates_removed,
        "preprocessing complete"
    );
    Ok((stats, accepted))
}

#[cfg(test)]
#[path = "preprocess_test.rs"]
mod tests;
