use std::path::PathBuf;

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub log_level: String,
    pub topics_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub http_timeout_secs: u64,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub llm_model: String,
    pub llm_model_version: String,
    pub llm_temperature: f32,
    pub llm_max_retries: u32,
    pub api_max_retries: u32,
    pub api_backoff_factor: u32,
    pub embed_batch_limit: i64,
    pub embed_delay_ms: u64,
    pub llm_delay_ms: u64,
    pub min_cluster_size: usize,
    pub min_samples: usize,
    pub representative_k: usize,
    pub top_keywords: usize,
    pub max_briefs: i64,
    pub stale_run_max_age_secs: u64,
    pub reddit_client_id: Option<String>,
    pub reddit_client_secret: Option<String>,
    pub reddit_user_agent: String,
    pub reddit_max_posts_per_keyword: usize,
    pub serpapi_key: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &"[redacted]")
            .field("log_level", &self.log_level)
            .field("topics_path", &self.topics_path)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("openai_base_url", &self.openai_base_url)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dim", &self.embedding_dim)
            .field("llm_model", &self.llm_model)
            .field("llm_model_version", &self.llm_model_version)
            .field("llm_temperature", &self.llm_temperature)
            .field("llm_max_retries", &self.llm_max_retries)
            .field("api_max_retries", &self.api_max_retries)
            .field("api_backoff_factor", &self.api_backoff_factor)
            .field("embed_batch_limit", &self.embed_batch_limit)
            .field("embed_delay_ms", &self.embed_delay_ms)
            .field("llm_delay_ms", &self.llm_delay_ms)
            .field("min_cluster_size", &self.min_cluster_size)
            .field("min_samples", &self.min_samples)
            .field("representative_k", &self.representative_k)
            .field("top_keywords", &self.top_keywords)
            .field("max_briefs", &self.max_briefs)
            .field("stale_run_max_age_secs", &self.stale_run_max_age_secs)
            .field(
                "reddit_client_id",
                &self.reddit_client_id.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "reddit_client_secret",
                &self.reddit_client_secret.as_ref().map(|_| "[redacted]"),
            )
            .field("reddit_user_agent", &self.reddit_user_agent)
            .field(
                "reddit_max_posts_per_keyword",
                &self.reddit_max_posts_per_keyword,
            )
            .field(
                "serpapi_key",
                &self.serpapi_key.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}
