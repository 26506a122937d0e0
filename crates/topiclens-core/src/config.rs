use std::path::PathBuf;

use crate::app_config::AppConfig;
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var).ok().filter(|v| !v.trim().is_empty())
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let narrow = |var: &str, value: u64| -> Result<u32, ConfigError> {
        u32::try_from(value).map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        narrow(var, parse(var, default)?)
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        usize::try_from(parse(var, default)?).map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_i64 = |var: &str, default: &str| -> Result<i64, ConfigError> {
        i64::try_from(parse(var, default)?).map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let database_url = require("DATABASE_URL")?;
    let log_level = or_default("TOPICLENS_LOG_LEVEL", "info");
    let topics_path = PathBuf::from(or_default("TOPICLENS_TOPICS_PATH", "./config/topics.yaml"));

    let db_max_connections = parse_u32("TOPICLENS_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("TOPICLENS_DB_MIN_CONNECTIONS", "2")?;
    let db_acquire_timeout_secs = parse("TOPICLENS_DB_ACQUIRE_TIMEOUT_SECS", "10")?;
    if db_min_connections > db_max_connections {
        return Err(ConfigError::InvalidEnvVar {
            var: "TOPICLENS_DB_MIN_CONNECTIONS".to_string(),
            reason: format!(
                "min connections ({db_min_connections}) exceeds max connections ({db_max_connections})"
            ),
        });
    }

    let openai_api_key = optional("OPENAI_API_KEY");
    let openai_base_url = or_default("OPENAI_BASE_URL", "https://api.openai.com/v1")
        .trim_end_matches('/')
        .to_string();
    let http_timeout_secs = parse("TOPICLENS_HTTP_TIMEOUT_SECS", "60")?;

    let embedding_model = or_default("TOPICLENS_EMBEDDING_MODEL", "text-embedding-3-large");
    let embedding_dim = parse_usize("TOPICLENS_EMBEDDING_DIM", "3072")?;
    let llm_model = or_default("TOPICLENS_LLM_MODEL", "gpt-4o-mini");
    let llm_model_version = or_default("TOPICLENS_LLM_MODEL_VERSION", "1.0");
    let llm_temperature = {
        let raw = or_default("TOPICLENS_LLM_TEMPERATURE", "0.3");
        raw.trim()
            .parse::<f32>()
            .ok()
            .filter(|t| (0.0..=2.0).contains(t))
            .ok_or_else(|| ConfigError::InvalidEnvVar {
                var: "TOPICLENS_LLM_TEMPERATURE".to_string(),
                reason: format!("expected a number in [0, 2], got '{raw}'"),
            })?
    };
    let llm_max_retries = parse_u32("TOPICLENS_LLM_MAX_RETRIES", "2")?;
    let api_max_retries = parse_u32("TOPICLENS_API_MAX_RETRIES", "3")?;
    let api_backoff_factor = parse_u32("TOPICLENS_API_BACKOFF_FACTOR", "2")?;

    let embed_batch_limit = parse_i64("TOPICLENS_EMBED_BATCH_LIMIT", "1000")?;
    let embed_delay_ms = parse("TOPICLENS_EMBED_DELAY_MS", "100")?;
    let llm_delay_ms = parse("TOPICLENS_LLM_DELAY_MS", "1000")?;

    let min_cluster_size = parse_usize("TOPICLENS_MIN_CLUSTER_SIZE", "5")?;
    let min_samples = parse_usize("TOPICLENS_MIN_SAMPLES", "3")?;
    let representative_k = parse_usize("TOPICLENS_REPRESENTATIVE_K", "5")?;
    let top_keywords = parse_usize("TOPICLENS_TOP_KEYWORDS", "15")?;
    let max_briefs = parse_i64("TOPICLENS_MAX_BRIEFS", "50")?;
    let stale_run_max_age_secs = parse("TOPICLENS_STALE_RUN_MAX_AGE_SECS", "21600")?;

    let reddit_client_id = optional("REDDIT_CLIENT_ID");
    let reddit_client_secret = optional("REDDIT_CLIENT_SECRET");
    let reddit_user_agent = or_default("REDDIT_USER_AGENT", "topiclens/0.1 (topic-research)");
    let reddit_max_posts_per_keyword = parse_usize("TOPICLENS_REDDIT_MAX_POSTS", "100")?;
    let serpapi_key = optional("SERPAPI_KEY");

    Ok(AppConfig {
        database_url,
        log_level,
        topics_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        openai_api_key,
        openai_base_url,
        http_timeout_secs,
        embedding_model,
        embedding_dim,
        llm_model,
        llm_model_version,
        llm_temperature,
        llm_max_retries,
        api_max_retries,
        api_backoff_factor,
        embed_batch_limit,
        embed_delay_ms,
        llm_delay_ms,
        min_cluster_size,
        min_samples,
        representative_k,
        top_keywords,
        max_briefs,
        stale_run_max_age_secs,
        reddit_client_id,
        reddit_client_secret,
        reddit_user_agent,
        reddit_max_posts_per_keyword,
        serpapi_key,
    })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
