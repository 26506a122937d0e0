//! TF-IDF keyword extraction per cluster.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use serde::Serialize;
use sqlx::PgPool;
use topiclens_core::AppConfig;

use crate::PipelineError;

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    include_str!("stop_words.txt")
        .split_whitespace()
        .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordSettings {
    pub top_n: usize,
    pub dry_run: bool,
}

impl Default for KeywordSettings {
    fn default() -> Self {
        Self {
            top_n: 15,
            dry_run: false,
        }
    }
}

impl KeywordSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig, dry_run: bool) -> Self {
        Self {
            top_n: config.top_keywords,
            dry_run,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeywordStats {
    pub clusters_processed: usize,
    pub keywords_extracted: usize,
}

/// Lower-case alphabetic tokens of at least two characters, stop words
/// removed.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .filter(|t| !STOP_WORDS.contains(t.as_str()))
        .collect()
}

/// The `top_n` terms with the highest summed TF-IDF score over `documents`.
///
/// The vocabulary is capped at the `2 * top_n` most frequent terms. Scores
/// use raw term counts, smooth idf `ln((1 + n) / (1 + df)) + 1` and L2
/// normalisation per document. Ties are broken alphabetically.
#[must_use]
pub fn top_terms(documents: &[String], top_n: usize) -> Vec<String> {
    if documents.is_empty() || top_n == 0 {
        return Vec::new();
    }

    let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();

    let mut corpus_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for tokens in &tokenized {
        for token in tokens {
            *corpus_counts.entry(token.as_str()).or_default() += 1;
        }
    }

    let mut by_frequency: Vec<(&str, usize)> = corpus_counts.into_iter().collect();
    by_frequency.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    by_frequency.truncate(top_n.saturating_mul(2));
    let vocabulary: HashSet<&str> = by_frequency.iter().map(|(t, _)| *t).collect();
    if vocabulary.is_empty() {
        return Vec::new();
    }

    let doc_counts: Vec<HashMap<&str, usize>> = tokenized
        .iter()
        .map(|tokens| {
            let mut counts = HashMap::new();
            for token in tokens.iter().filter(|t| vocabulary.contains(t.as_str())) {
                *counts.entry(token.as_str()).or_default() += 1;
            }
            counts
        })
        .collect();

    let mut df: HashMap<&str, usize> = HashMap::new();
    for counts in &doc_counts {
        for term in counts.keys() {
            *df.entry(term).or_default() += 1;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let n = doc_counts.len() as f64;
    #[allow(clippy::cast_precision_loss)]
    let idf = |term: &str| ((1.0 + n) / (1.0 + df[term] as f64)).ln() + 1.0;

    let mut totals: HashMap<&str, f64> = HashMap::new();
    for counts in &doc_counts {
        #[allow(clippy::cast_precision_loss)]
        let weights: Vec<(&str, f64)> = counts
            .iter()
            .map(|(term, &count)| (*term, count as f64 * idf(term)))
            .collect();
        let norm = weights.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm == 0.0 {
            continue;
        }
        for (term, weight) in weights {
            *totals.entry(term).or_default() += weight / norm;
        }
    }

    let mut ranked: Vec<(&str, f64)> = totals.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(top_n)
        .map(|(term, _)| term.to_string())
        .collect()
}

/// Keywords of one cluster, computed from its member posts.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if the members cannot be loaded.
pub async fn extract_keywords_for_cluster(
    pool: &PgPool,
    cluster_id: i64,
    run_id: i64,
    top_n: usize,
) -> Result<Vec<String>, PipelineError> {
    let members = topiclens_db::list_cluster_members(pool, cluster_id, run_id).await?;
    let documents: Vec<String> = members
        .iter()
        .map(|m| format!("{} {}", m.title, m.body.as_deref().unwrap_or_default()))
        .collect();
    Ok(top_terms(&documents, top_n))
}

/// Extract and store keywords for every cluster of `run_id`.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] on any database failure.
pub async fn extract_keywords(
    pool: &PgPool,
    run_id: i64,
    settings: &KeywordSettings,
) -> Result<KeywordStats, PipelineError> {
    let clusters = topiclens_db::list_clusters_for_run(pool, run_id).await?;
    let mut stats = KeywordStats::default();

    for cluster in &clusters {
        let keywords = extract_keywords_for_cluster(pool, cluster.id, run_id, settings.top_n).await?;
        stats.clusters_processed += 1;
        stats.keywords_extracted += keywords.len();

        if settings.dry_run {
            tracing::info!(dry_run = true, cluster_id = cluster.id, keywords = ?keywords, "cluster keywords");
            continue;
        }
        topiclens_db::set_cluster_keywords(pool, cluster.id, &keywords).await?;
    }

    tracing::info!(
        run_id,
        clusters = stats.clusters_processed,
        keywords = stats.keywords_extracted,
        "keyword extraction complete"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(texts: &[&str]) -> Vec<String> {
        texts.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn tokenize_drops_stop_words_short_tokens_and_digits() {
        let tokens = tokenize("How to store 2 Carrots in the FRIDGE? a b");
        assert_eq!(tokens, vec!["store", "carrots", "fridge"]);
    }

    #[test]
    fn empty_input_yields_no_terms() {
        assert!(top_terms(&[], 15).is_empty());
        assert!(top_terms(&docs(&["the and of"]), 15).is_empty());
    }

    #[test]
    fn frequent_distinctive_terms_rank_first() {
        let documents = docs(&[
            "fridge organization bins fridge",
            "fridge shelves organization",
            "fridge drawer liners",
        ]);
        let terms = top_terms(&documents, 2);
        assert_eq!(terms, vec!["fridge", "organization"]);
    }

    #[test]
    fn result_is_capped_at_top_n() {
        let documents = docs(&["alpha beta gamma delta epsilon zeta eta theta"]);
        assert_eq!(top_terms(&documents, 3).len(), 3);
    }

    #[test]
    fn ties_are_broken_alphabetically() {
        let documents = docs(&["zucchini asparagus radish"]);
        assert_eq!(
            top_terms(&documents, 3),
            vec!["asparagus", "radish", "zucchini"]
        );
    }

    #[test]
    fn ranking_is_deterministic() {
        let documents = docs(&[
            "spring salad with peas and mint",
            "pea shoots and mint pesto",
            "mint lemonade for spring",
        ]);
        assert_eq!(top_terms(&documents, 5), top_terms(&documents, 5));
    }
}
