//! Google AI-Overview snapshots through SerpAPI.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use topiclens_core::TopicsFile;
use topiclens_db::NewSerpAio;

use crate::CollectError;

const DEFAULT_BASE_URL: &str = "https://serpapi.com";
const LOCALE: &str = "en-US";
const KEYWORDS_PER_CATEGORY: usize = 2;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    error: Option<String>,
    ai_overview: Option<AiOverviewPayload>,
}

#[derive(Debug, Deserialize)]
struct AiOverviewPayload {
    text: Option<String>,
    #[serde(default)]
    text_blocks: Vec<TextBlock>,
    cited_sources: Option<Value>,
    references: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TextBlock {
    snippet: Option<String>,
}

/// The parts of an AI Overview that are stored.
#[derive(Debug, Clone, PartialEq)]
pub struct AiOverview {
    pub text: String,
    pub cited_sources: Value,
}

impl From<AiOverviewPayload> for AiOverview {
    fn from(payload: AiOverviewPayload) -> Self {
        let text = payload.text.unwrap_or_else(|| {
            payload
                .text_blocks
                .iter()
                .filter_map(|b| b.snippet.as_deref())
                .collect::<Vec<_>>()
                .join("\n")
        });
        let cited_sources = payload
            .cited_sources
            .or(payload.references)
            .unwrap_or_else(|| Value::Array(Vec::new()));
        Self {
            text,
            cited_sources,
        }
    }
}

pub struct SerpApiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SerpApiClient {
    /// # Errors
    ///
    /// Returns [`CollectError::SerpApi`] if the HTTP client cannot be built.
    pub fn new(api_key: &str) -> Result<Self, CollectError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// # Errors
    ///
    /// Returns [`CollectError::SerpApi`] if the HTTP client cannot be built.
    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self, CollectError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| CollectError::SerpApi(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The AI Overview Google shows for `query`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::SerpApi`] on a non-success status, an API error
    /// message or an unparseable body.
    pub async fn ai_overview(&self, query: &str) -> Result<Option<AiOverview>, CollectError> {
        let response = self
            .client
            .get(format!("{}/search.json", self.base_url))
            .query(&[
                ("engine", "google"),
                ("q", query),
                ("hl", "en"),
                ("gl", "us"),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CollectError::SerpApi(format!(
                "search for '{query}' failed with status {}",
                response.status()
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| CollectError::SerpApi(format!("response parse error: {e}")))?;

        if let Some(error) = body.error {
            return Err(CollectError::SerpApi(error));
        }

        Ok(body.ai_overview.map(AiOverview::from))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SerpStats {
    pub queries_processed: usize,
    pub aio_found: usize,
    pub errors: Vec<String>,
}

/// Snapshot the AI Overview of the first two keywords of every category.
///
/// # Errors
///
/// Returns [`CollectError::Config`] when no client is given outside a dry
/// run, and [`CollectError::Db`] if a snapshot cannot be stored.
pub async fn collect_serp_aio(
    pool: &PgPool,
    client: Option<&SerpApiClient>,
    topics: &TopicsFile,
    run_id: i64,
    delay: Duration,
    dry_run: bool,
) -> Result<SerpStats, CollectError> {
    let keywords = topics.sample_keywords(KEYWORDS_PER_CATEGORY);
    tracing::info!(run_id, keywords = keywords.len(), "starting SERP AI Overview collection");

    let mut stats = SerpStats::default();

    if dry_run {
        for (_, keyword) in &keywords {
            tracing::info!(dry_run = true, keyword, "would query SerpAPI");
            stats.queries_processed += 1;
        }
        return Ok(stats);
    }
    let client = client
        .ok_or_else(|| CollectError::Config("SERPAPI_KEY is not set".to_string()))?;

    for (index, (_, keyword)) in keywords.iter().enumerate() {
        if index > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match client.ai_overview(keyword).await {
            Ok(Some(overview)) => {
                topiclens_db::upsert_serp_aio(
                    pool,
                    &NewSerpAio {
                        query: (*keyword).to_string(),
                        locale: LOCALE.to_string(),
                        aio_text: overview.text,
                        cited_sources: overview.cited_sources,
                        snapshot_at: Utc::now(),
                        run_id: Some(run_id),
                    },
                )
                .await?;
                stats.aio_found += 1;
                tracing::info!(keyword, "found AI Overview");
            }
            Ok(None) => tracing::info!(keyword, "no AI Overview"),
            Err(err) => {
                tracing::error!(keyword, error = %err, "SerpAPI query failed");
                stats.errors.push(format!("{keyword}: {err}"));
                continue;
            }
        }
        stats.queries_processed += 1;
    }

    tracing::info!(run_id, aio_found = stats.aio_found, "SERP AI Overview collection complete");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn overview_prefers_plain_text() {
        let payload: AiOverviewPayload = serde_json::from_value(json!({
            "text": "Keep herbs in water.",
            "cited_sources": [{"link": "https://example.com"}]
        }))
        .unwrap();
        let overview = AiOverview::from(payload);
        assert_eq!(overview.text, "Keep herbs in water.");
        assert_eq!(overview.cited_sources[0]["link"], "https://example.com");
    }

    #[test]
    fn overview_falls_back_to_text_blocks_and_references() {
        let payload: AiOverviewPayload = serde_json::from_value(json!({
            "text_blocks": [{"snippet": "First."}, {"type": "list"}, {"snippet": "Second."}],
            "references": [{"title": "Guide"}]
        }))
        .unwrap();
        let overview = AiOverview::from(payload);
        assert_eq!(overview.text, "First.\nSecond.");
        assert_eq!(overview.cited_sources, json!([{"title": "Guide"}]));
    }

    #[test]
    fn missing_sources_become_empty_list() {
        let payload: AiOverviewPayload =
            serde_json::from_value(json!({ "text": "x" })).unwrap();
        assert_eq!(AiOverview::from(payload).cited_sources, json!([]));
    }
}
