//! HTTP-level tests for the Reddit and SerpAPI clients, plus GSC file
//! handling, using wiremock and temp files.

use std::io::Write;

use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use topiclens_collect::{ingest_gsc_csv, CollectError, RedditClient, RedditConfig, SerpApiClient};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn reddit_config(server: &MockServer) -> RedditConfig {
    RedditConfig {
        client_id: "id".to_string(),
        client_secret: "secret".to_string(),
        user_agent: "topiclens-test/0.1".to_string(),
        auth_url: format!("{}/api/v1/access_token", server.uri()),
        api_url: server.uri(),
    }
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "access_token": "tok", "expires_in": 3600 })),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn reddit_search_maps_posts() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "fridge organization"))
        .and(query_param("sort", "top"))
        .and(header("Authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "Listing",
            "data": {
                "after": null,
                "children": [
                    {
                        "kind": "t3",
                        "data": {
                            "id": "abc",
                            "subreddit": "organization",
                            "title": "How do you organize a tiny fridge?",
                            "selftext": "Mine is always a mess.",
                            "author": "alice",
                            "created_utc": 1_711_929_600.0,
                            "ups": 42,
                            "num_comments": 7,
                            "permalink": "/r/organization/comments/abc/",
                            "url": "https://www.reddit.com/r/organization/comments/abc/"
                        }
                    },
                    {
                        "kind": "t3",
                        "data": {
                            "id": "def",
                            "title": "Fridge photo",
                            "selftext": "[removed]",
                            "created_utc": 1_711_929_700.0
                        }
                    },
                    { "kind": "t5", "data": { "id": "sub" } }
                ]
            }
        })))
        .mount(&server)
        .await;

    let client = RedditClient::new(&reddit_config(&server))
        .await
        .expect("token exchange should succeed");
    let posts = client
        .search_posts("fridge organization", 25)
        .await
        .expect("search should succeed");

    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].reddit_post_id, "abc");
    assert_eq!(posts[0].upvotes, 42);
    assert_eq!(posts[0].created_utc, 1_711_929_600);
    assert_eq!(posts[0].keyword.as_deref(), Some("fridge organization"));
    assert_eq!(posts[1].body, None);
}

#[tokio::test]
async fn reddit_top_comments_keeps_best_three() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    let comment = |id: &str, ups: i64, body: &str| {
        json!({ "kind": "t1", "data": { "id": id, "body": body, "author": "bob", "created_utc": 1.0, "ups": ups } })
    };

    Mock::given(method("GET"))
        .and(path("/comments/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "data": { "children": [ { "kind": "t3", "data": { "id": "abc" } } ] } },
            { "data": { "children": [
                comment("c1", 3, "ok"),
                comment("c2", 10, "best"),
                comment("c3", 1, "[deleted]"),
                comment("c4", 7, "good"),
                comment("c5", 5, "fine"),
                { "kind": "more", "data": { "count": 4 } }
            ] } }
        ])))
        .mount(&server)
        .await;

    let client = RedditClient::new(&reddit_config(&server)).await.unwrap();
    let comments = client.top_comments("abc", 3).await.unwrap();

    let ids: Vec<&str> = comments.iter().map(|c| c.reddit_comment_id.as_str()).collect();
    assert_eq!(ids, vec!["c2", "c4", "c5"]);
    assert!(comments.iter().all(|c| c.is_top && c.reddit_post_id == "abc"));
}

#[tokio::test]
async fn reddit_token_failure_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = RedditClient::new(&reddit_config(&server)).await;
    assert!(matches!(result, Err(CollectError::Reddit(_))));
}

#[tokio::test]
async fn serpapi_returns_overview_when_present() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .and(query_param("engine", "google"))
        .and(query_param("q", "spring recipes"))
        .and(query_param("gl", "us"))
        .and(query_param("api_key", "serp-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "search_metadata": { "status": "Success" },
            "ai_overview": {
                "text": "Spring recipes feature peas and asparagus.",
                "cited_sources": [{ "title": "Guide", "link": "https://example.com" }]
            }
        })))
        .mount(&server)
        .await;

    let client = SerpApiClient::with_base_url("serp-key", &server.uri()).unwrap();
    let overview = client
        .ai_overview("spring recipes")
        .await
        .expect("request should succeed")
        .expect("overview should be present");

    assert_eq!(overview.text, "Spring recipes feature peas and asparagus.");
    assert_eq!(overview.cited_sources[0]["title"], "Guide");
}

#[tokio::test]
async fn serpapi_without_overview_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "organic_results": [] })))
        .mount(&server)
        .await;

    let client = SerpApiClient::with_base_url("serp-key", &server.uri()).unwrap();
    assert!(client.ai_overview("anything").await.unwrap().is_none());
}

#[tokio::test]
async fn serpapi_error_message_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "Invalid API key." })))
        .mount(&server)
        .await;

    let client = SerpApiClient::with_base_url("bad", &server.uri()).unwrap();
    let err = client.ai_overview("anything").await.unwrap_err();
    assert!(matches!(err, CollectError::SerpApi(ref m) if m == "Invalid API key."));
}

fn lazy_pool() -> sqlx::PgPool {
    PgPoolOptions::new()
        .connect_lazy("postgres://localhost/unused")
        .expect("lazy pool")
}

#[tokio::test]
async fn missing_gsc_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let result = ingest_gsc_csv(&lazy_pool(), &dir.path().join("nope.csv"), false).await;
    assert!(matches!(result, Err(CollectError::GscFileMissing(_))));
}

#[tokio::test]
async fn gsc_dry_run_parses_without_writing() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "query,page,country,device,date,impressions,clicks,ctr,position").unwrap();
    writeln!(file, "fridge bins,https://example.com,usa,DESKTOP,2024-03-02,100,4,0.04,2.5").unwrap();
    writeln!(file, "broken,https://example.com,usa,DESKTOP,not-a-date,100,4,0.04,2.5").unwrap();

    let stats = ingest_gsc_csv(&lazy_pool(), file.path(), true).await.unwrap();

    assert_eq!(stats.rows_processed, 2);
    assert_eq!(stats.rows_skipped, 1);
    assert_eq!(stats.rows_inserted, 0);
}
