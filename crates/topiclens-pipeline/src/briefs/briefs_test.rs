use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use topiclens_core::Category;

use super::*;

/// Answers with a scripted sequence, repeating the last entry.
struct ScriptedLlm {
    answers: Mutex<VecDeque<Result<String, ProviderError>>>,
    calls: Mutex<u32>,
}

impl ScriptedLlm {
    fn new(answers: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

fn clone_answer(answer: &Result<String, ProviderError>) -> Result<String, ProviderError> {
    match answer {
        Ok(text) => Ok(text.clone()),
        Err(ProviderError::Auth(m)) => Err(ProviderError::Auth(m.clone())),
        Err(ProviderError::RateLimited(m)) => Err(ProviderError::RateLimited(m.clone())),
        Err(other) => Err(ProviderError::InvalidResponse(other.to_string())),
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        assert_eq!(request.system, SYSTEM_PROMPT);
        assert_eq!(request.schema.name, SCHEMA_NAME);
        *self.calls.lock().unwrap() += 1;

        let mut answers = self.answers.lock().unwrap();
        if answers.len() > 1 {
            answers.pop_front().unwrap()
        } else {
            clone_answer(answers.front().unwrap())
        }
    }
}

fn valid_answer() -> String {
    json!({
        "category": "SPRING_RECIPES",
        "topic_title": "Fast spring pea recipes",
        "primary_question": "What can I cook with fresh peas?",
        "related_questions": [],
        "blog_angle": null,
        "social_angle": null,
        "why_now": null,
        "evidence_summary": null
    })
    .to_string()
}

fn invalid_category_answer() -> String {
    json!({
        "category": "INVALID_CATEGORY",
        "topic_title": "Fast spring pea recipes",
        "primary_question": "What can I cook with fresh peas?",
        "related_questions": [],
        "blog_angle": null,
        "social_angle": null,
        "why_now": null,
        "evidence_summary": null
    })
    .to_string()
}

fn instant(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries, 2).with_unit(Duration::ZERO)
}

#[tokio::test]
async fn valid_answer_is_accepted_first_time() {
    let llm = ScriptedLlm::new(vec![Ok(valid_answer())]);
    let draft = draft_brief(&llm, "prompt", &instant(2), "test").await.unwrap();
    assert_eq!(draft.category, Category::SpringRecipes);
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn schema_violation_is_retried_until_valid() {
    let llm = ScriptedLlm::new(vec![
        Ok(invalid_category_answer()),
        Ok("{\"not\": \"a brief\"}".to_string()),
        Ok(valid_answer()),
    ]);
    let draft = draft_brief(&llm, "prompt", &instant(2), "test").await.unwrap();
    assert_eq!(draft.topic_title, "Fast spring pea recipes");
    assert_eq!(llm.calls(), 3);
}

#[tokio::test]
async fn invalid_category_fails_after_retries() {
    let llm = ScriptedLlm::new(vec![Ok(invalid_category_answer())]);
    let err = draft_brief(&llm, "prompt", &instant(2), "test")
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Validation(_)));
    assert_eq!(llm.calls(), 3);
}

#[tokio::test]
async fn rate_limit_then_success() {
    let llm = ScriptedLlm::new(vec![
        Err(ProviderError::RateLimited("slow down".to_string())),
        Ok(valid_answer()),
    ]);
    assert!(draft_brief(&llm, "prompt", &instant(2), "test").await.is_ok());
    assert_eq!(llm.calls(), 2);
}

#[tokio::test]
async fn auth_error_is_not_retried_and_is_fatal() {
    let llm = ScriptedLlm::new(vec![Err(ProviderError::Auth("bad key".to_string()))]);
    let err = draft_brief(&llm, "prompt", &instant(2), "test")
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(llm.calls(), 1);
}

#[test]
fn default_settings_match_documented_defaults() {
    let settings = BriefSettings::default();
    assert_eq!(settings.max_briefs, 50);
    assert_eq!(settings.retry.max_retries, 2);
    assert_eq!(settings.delay, Duration::from_secs(1));
}

#[tokio::test]
async fn missing_related_questions_is_retried_until_valid() {
    let mut incomplete: serde_json::Value = serde_json::from_str(&valid_answer()).unwrap();
    incomplete
        .as_object_mut()
        .unwrap()
        .remove("related_questions");
    let llm = ScriptedLlm::new(vec![Ok(incomplete.to_string()), Ok(valid_answer())]);

    let draft = draft_brief(&llm, "prompt", &instant(2), "test").await.unwrap();
    assert!(draft.related_questions.is_empty());
    assert_eq!(llm.calls(), 2);
}

#[test]
fn why_now_is_stored_as_json_object() {
    let why_now = WhyNow {
        reason: "Spring produce arrives".to_string(),
        trend: Some("rising".to_string()),
    };
    let value = why_now_json(Some(&why_now)).unwrap().unwrap();
    assert_eq!(value, json!({ "reason": "Spring produce arrives", "trend": "rising" }));
    assert!(why_now_json(None).unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn cluster_without_members_is_skipped_without_llm_call(pool: PgPool) {
    let run = topiclens_db::create_pipeline_run(&pool, topiclens_core::RunMode::Label)
        .await
        .unwrap();
    topiclens_db::persist_cluster(
        &pool,
        &topiclens_db::NewCluster {
            run_id: run.id,
            label: 0,
            algorithm: "hdbscan".to_string(),
            params: json!({}),
            size: 0,
        },
        &[],
    )
    .await
    .unwrap();
    let cluster = topiclens_db::list_top_clusters_by_size(&pool, run.id, 10)
        .await
        .unwrap()
        .remove(0);

    let llm = ScriptedLlm::new(vec![Ok(valid_answer())]);
    let settings = BriefSettings {
        delay: Duration::ZERO,
        retry: instant(2),
        ..BriefSettings::default()
    };
    let mut state = BriefState::Pending;

    let outcome = process_cluster(&pool, &llm, run.id, &cluster, &settings, &mut state)
        .await
        .unwrap();

    assert_eq!(outcome, ClusterOutcome::Skipped);
    assert_eq!(state, BriefState::Skipped);
    assert_eq!(llm.calls(), 0);

    let stats = generate_briefs(&pool, &llm, run.id, &settings).await.unwrap();
    assert_eq!(stats.clusters_processed, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.briefs_created, 0);
    assert!(stats.errors.is_empty());
    assert_eq!(llm.calls(), 0);

    let briefs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM topic_qa_briefs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(briefs, 0);
}
