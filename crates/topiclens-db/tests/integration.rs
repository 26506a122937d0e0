//! Offline unit tests for topiclens-db pool configuration and row helpers.
//! These tests do not require a live database connection.

use std::path::PathBuf;

use serde_json::json;
use topiclens_core::AppConfig;
use topiclens_db::{ClusterRow, PoolConfig};

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        log_level: "info".to_string(),
        topics_path: PathBuf::from("./config/topics.yaml"),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        openai_api_key: None,
        openai_base_url: "https://api.openai.com/v1".to_string(),
        http_timeout_secs: 60,
        embedding_model: "text-embedding-3-large".to_string(),
        embedding_dim: 3072,
        llm_model: "gpt-4o-mini".to_string(),
        llm_model_version: "1.0".to_string(),
        llm_temperature: 0.3,
        llm_max_retries: 2,
        api_max_retries: 3,
        api_backoff_factor: 2,
        embed_batch_limit: 1000,
        embed_delay_ms: 100,
        llm_delay_ms: 1000,
        min_cluster_size: 5,
        min_samples: 3,
        representative_k: 5,
        top_keywords: 15,
        max_briefs: 50,
        stale_run_max_age_secs: 21_600,
        reddit_client_id: None,
        reddit_client_secret: None,
        reddit_user_agent: "ua".to_string(),
        reddit_max_posts_per_keyword: 100,
        serpapi_key: None,
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

fn cluster_row(keywords: Option<serde_json::Value>) -> ClusterRow {
    ClusterRow {
        id: 1,
        run_id: 7,
        label: 0,
        algorithm: "hdbscan".to_string(),
        params: json!({}),
        size: 5,
        noise_label: false,
        topic_category: None,
        sub_index: None,
        keywords,
    }
}

#[test]
fn keyword_list_reads_stored_array() {
    let row = cluster_row(Some(json!(["fridge", "bins"])));
    assert_eq!(row.keyword_list(), vec!["fridge", "bins"]);
}

#[test]
fn keyword_list_tolerates_missing_or_malformed_value() {
    assert!(cluster_row(None).keyword_list().is_empty());
    assert!(cluster_row(Some(json!({ "not": "a list" })))
        .keyword_list()
        .is_empty());
}
