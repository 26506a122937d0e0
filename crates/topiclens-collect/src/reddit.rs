//! Reddit search collector (client-credentials OAuth).

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;
use topiclens_core::{AppConfig, TopicsFile};
use topiclens_db::{NewRedditComment, NewRedditPost};

use crate::{CollectError, UPSERT_CHUNK};

const DEFAULT_AUTH_URL: &str = "https://www.reddit.com/api/v1/access_token";
const DEFAULT_API_URL: &str = "https://oauth.reddit.com";
const TOP_COMMENTS_PER_POST: usize = 3;
/// Reddit caps one listing page at 100 items.
const MAX_PAGE_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct RedditConfig {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
    pub auth_url: String,
    pub api_url: String,
}

impl RedditConfig {
    /// # Errors
    ///
    /// Returns [`CollectError::Config`] if the client id or secret is unset.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, CollectError> {
        let client_id = config
            .reddit_client_id
            .clone()
            .ok_or_else(|| CollectError::Config("REDDIT_CLIENT_ID is not set".to_string()))?;
        let client_secret = config
            .reddit_client_secret
            .clone()
            .ok_or_else(|| CollectError::Config("REDDIT_CLIENT_SECRET is not set".to_string()))?;
        Ok(Self {
            client_id,
            client_secret,
            user_agent: config.reddit_user_agent.clone(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    data: Value,
}

#[derive(Debug, Deserialize)]
struct PostData {
    id: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    title: String,
    selftext: Option<String>,
    author: Option<String>,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    ups: i64,
    #[serde(default)]
    num_comments: i64,
    permalink: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentData {
    id: String,
    body: Option<String>,
    author: Option<String>,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    ups: i64,
}

fn clamp_i32(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

#[allow(clippy::cast_possible_truncation)]
fn unix_seconds(value: f64) -> i64 {
    value as i64
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.is_empty() && t != "[deleted]" && t != "[removed]")
}

/// Reddit API client holding a valid access token.
pub struct RedditClient {
    client: reqwest::Client,
    token: String,
    user_agent: String,
    api_url: String,
}

impl RedditClient {
    /// Exchange client credentials for a token.
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::Reddit`] if the token exchange fails.
    pub async fn new(config: &RedditConfig) -> Result<Self, CollectError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CollectError::Reddit(format!("failed to build HTTP client: {e}")))?;

        let response = client
            .post(&config.auth_url)
            .header("User-Agent", &config.user_agent)
            .basic_auth(&config.client_id, Some(&config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CollectError::Reddit(format!(
                "token exchange failed with status {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CollectError::Reddit(format!("token parse error: {e}")))?;

        Ok(Self {
            client,
            token: token.access_token,
            user_agent: config.user_agent.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, CollectError> {
        let response = self
            .client
            .get(format!("{}{path}", self.api_url))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", &self.user_agent)
            .query(params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CollectError::Reddit(format!(
                "GET {path} failed with status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| CollectError::Reddit(format!("response parse error for {path}: {e}")))
    }

    /// Top posts of all time matching `keyword`, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::Reddit`] if the search fails or cannot be parsed.
    pub async fn search_posts(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<NewRedditPost>, CollectError> {
        let listing: Listing = self
            .get_json(
                "/search",
                &[
                    ("q", keyword.to_string()),
                    ("sort", "top".to_string()),
                    ("t", "all".to_string()),
                    ("type", "link".to_string()),
                    ("limit", limit.min(MAX_PAGE_LIMIT).to_string()),
                ],
            )
            .await?;

        let posts = listing
            .data
            .children
            .into_iter()
            .filter(|thing| thing.kind == "t3")
            .filter_map(|thing| {
                let raw = thing.data;
                let data: PostData = serde_json::from_value(raw.clone()).ok()?;
                Some(NewRedditPost {
                    reddit_post_id: data.id,
                    subreddit: data.subreddit,
                    title: data.title,
                    body: non_empty(data.selftext),
                    author: data.author,
                    created_utc: unix_seconds(data.created_utc),
                    upvotes: clamp_i32(data.ups),
                    num_comments: clamp_i32(data.num_comments),
                    permalink: data.permalink,
                    url: data.url,
                    keyword: Some(keyword.to_string()),
                    raw,
                })
            })
            .take(limit)
            .collect();

        Ok(posts)
    }

    /// The `limit` highest-voted top-level comments of a post.
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::Reddit`] if the request fails or cannot be parsed.
    pub async fn top_comments(
        &self,
        post_id: &str,
        limit: usize,
    ) -> Result<Vec<NewRedditComment>, CollectError> {
        let listings: Vec<Listing> = self
            .get_json(
                &format!("/comments/{post_id}"),
                &[
                    ("sort", "top".to_string()),
                    ("depth", "1".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let mut comments: Vec<NewRedditComment> = listings
            .into_iter()
            .skip(1)
            .flat_map(|listing| listing.data.children)
            .filter(|thing| thing.kind == "t1")
            .filter_map(|thing| serde_json::from_value::<CommentData>(thing.data).ok())
            .filter_map(|data| {
                Some(NewRedditComment {
                    reddit_comment_id: data.id,
                    reddit_post_id: post_id.to_string(),
                    author: data.author,
                    body: Some(non_empty(data.body)?),
                    created_utc: unix_seconds(data.created_utc),
                    upvotes: clamp_i32(data.ups),
                    is_top: true,
                })
            })
            .collect();

        comments.sort_by(|a, b| b.upvotes.cmp(&a.upvotes));
        comments.truncate(limit);
        Ok(comments)
    }
}

#[derive(Debug, Clone)]
pub struct RedditCollectSettings {
    pub max_posts_per_keyword: usize,
    /// Pause between keywords.
    pub delay: Duration,
    pub dry_run: bool,
}

impl RedditCollectSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig, dry_run: bool) -> Self {
        Self {
            max_posts_per_keyword: config.reddit_max_posts_per_keyword,
            delay: Duration::from_secs(2),
            dry_run,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RedditStats {
    pub keywords_processed: usize,
    pub posts_collected: usize,
    pub comments_collected: usize,
    pub errors: Vec<String>,
}

async fn collect_keyword(
    client: &RedditClient,
    keyword: &str,
    max_posts: usize,
    stats: &mut RedditStats,
) -> Result<(Vec<NewRedditPost>, Vec<NewRedditComment>), CollectError> {
    let posts = client.search_posts(keyword, max_posts).await?;
    let mut comments = Vec::new();

    for post in &posts {
        match client
            .top_comments(&post.reddit_post_id, TOP_COMMENTS_PER_POST)
            .await
        {
            Ok(found) => comments.extend(found),
            Err(err) => {
                tracing::error!(post_id = %post.reddit_post_id, error = %err, "failed to fetch comments");
                stats
                    .errors
                    .push(format!("comments for {}: {err}", post.reddit_post_id));
            }
        }
    }

    Ok((posts, comments))
}

/// Search every topic keyword and upsert posts with their top comments.
///
/// A failing keyword is recorded and the next one is tried. `client` may be
/// `None` only in a dry run.
///
/// # Errors
///
/// Returns [`CollectError::Config`] when no client is given outside a dry
/// run, and [`CollectError::Db`] if an upsert fails.
pub async fn collect_reddit(
    pool: &PgPool,
    client: Option<&RedditClient>,
    topics: &TopicsFile,
    run_id: i64,
    settings: &RedditCollectSettings,
) -> Result<RedditStats, CollectError> {
    let keywords = topics.all_keywords();
    tracing::info!(run_id, keywords = keywords.len(), "starting Reddit collection");

    let mut stats = RedditStats::default();

    let client = match (client, settings.dry_run) {
        (_, true) => {
            for (category, keyword) in &keywords {
                tracing::info!(
                    dry_run = true,
                    %category,
                    keyword,
                    max_posts = settings.max_posts_per_keyword,
                    "would search Reddit"
                );
                stats.keywords_processed += 1;
            }
            return Ok(stats);
        }
        (Some(client), false) => client,
        (None, false) => {
            return Err(CollectError::Config(
                "Reddit credentials are required to collect".to_string(),
            ))
        }
    };

    for (index, (_, keyword)) in keywords.iter().enumerate() {
        if index > 0 && !settings.delay.is_zero() {
            tokio::time::sleep(settings.delay).await;
        }

        let (posts, comments) =
            match collect_keyword(client, keyword, settings.max_posts_per_keyword, &mut stats).await
            {
                Ok(found) => found,
                Err(err) => {
                    tracing::error!(keyword, error = %err, "Reddit search failed");
                    stats.errors.push(format!("{keyword}: {err}"));
                    continue;
                }
            };

        for chunk in posts.chunks(UPSERT_CHUNK) {
            topiclens_db::upsert_reddit_posts(pool, chunk, Some(run_id)).await?;
        }
        for chunk in comments.chunks(UPSERT_CHUNK) {
            topiclens_db::upsert_reddit_comments(pool, chunk).await?;
        }

        tracing::info!(keyword, posts = posts.len(), comments = comments.len(), "collected keyword");
        stats.keywords_processed += 1;
        stats.posts_collected += posts.len();
        stats.comments_collected += comments.len();
    }

    tracing::info!(
        run_id,
        posts = stats.posts_collected,
        comments = stats.comments_collected,
        errors = stats.errors.len(),
        "Reddit collection complete"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deleted_and_removed_text_is_dropped() {
        assert_eq!(non_empty(Some("[deleted]".to_string())), None);
        assert_eq!(non_empty(Some("[removed]".to_string())), None);
        assert_eq!(non_empty(Some(String::new())), None);
        assert_eq!(non_empty(Some("kept".to_string())).as_deref(), Some("kept"));
    }

    #[test]
    fn counts_are_clamped_into_i32() {
        assert_eq!(clamp_i32(5), 5);
        assert_eq!(clamp_i32(i64::MAX), i32::MAX);
        assert_eq!(clamp_i32(i64::MIN), i32::MIN);
    }

    #[test]
    fn fractional_timestamps_truncate() {
        assert_eq!(unix_seconds(1_700_000_000.9), 1_700_000_000);
    }
}
