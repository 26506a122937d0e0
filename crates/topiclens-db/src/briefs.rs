//! Database operations for `topic_qa_briefs`.

use serde_json::Value;
use sqlx::PgPool;
use topiclens_core::{Category, TrendStatus};

use crate::DbError;

/// A validated brief ready to persist.
#[derive(Debug, Clone)]
pub struct NewBrief {
    pub cluster_id: i64,
    pub category: Category,
    pub topic_title: String,
    pub primary_question: String,
    pub related_questions: Vec<String>,
    pub blog_angle: Option<String>,
    pub social_angle: Option<String>,
    pub why_now: Option<Value>,
    pub evidence_summary: Option<String>,
    pub evidence_pack: Value,
    pub model_name: String,
    pub model_version: String,
    pub run_id: i64,
}

/// The columns the scorer needs from a brief.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BriefRow {
    pub id: i64,
    pub cluster_id: i64,
    pub category: String,
    pub topic_title: String,
    pub model_version: String,
    pub score: Option<f64>,
    pub trend_status: Option<String>,
}

/// Insert or overwrite the brief for `(cluster_id, model_version)`.
///
/// Content columns are replaced; `score` and `trend_status` are left for the
/// scorer. Returns the brief id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_brief(pool: &PgPool, brief: &NewBrief) -> Result<i64, DbError> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO topic_qa_briefs \
             (cluster_id, category, topic_title, primary_question, related_questions, \
              blog_angle, social_angle, why_now, evidence_summary, evidence_pack, \
              model_name, model_version, run_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         ON CONFLICT (cluster_id, model_version) DO UPDATE SET \
             category = EXCLUDED.category, \
             topic_title = EXCLUDED.topic_title, \
             primary_question = EXCLUDED.primary_question, \
             related_questions = EXCLUDED.related_questions, \
             blog_angle = EXCLUDED.blog_angle, \
             social_angle = EXCLUDED.social_angle, \
             why_now = EXCLUDED.why_now, \
             evidence_summary = EXCLUDED.evidence_summary, \
             evidence_pack = EXCLUDED.evidence_pack, \
             model_name = EXCLUDED.model_name, \
             run_id = EXCLUDED.run_id, \
             updated_at = NOW() \
         RETURNING id",
    )
    .bind(brief.cluster_id)
    .bind(brief.category.as_str())
    .bind(&brief.topic_title)
    .bind(&brief.primary_question)
    .bind(serde_json::json!(brief.related_questions))
    .bind(&brief.blog_angle)
    .bind(&brief.social_angle)
    .bind(&brief.why_now)
    .bind(&brief.evidence_summary)
    .bind(&brief.evidence_pack)
    .bind(&brief.model_name)
    .bind(&brief.model_version)
    .bind(brief.run_id)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Briefs attached to the clusters of a run, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_briefs_for_run(pool: &PgPool, run_id: i64) -> Result<Vec<BriefRow>, DbError> {
    let rows = sqlx::query_as::<_, BriefRow>(
        "SELECT b.id, b.cluster_id, b.category, b.topic_title, b.model_version, \
                b.score, b.trend_status \
         FROM topic_qa_briefs b \
         JOIN clusters c ON c.id = b.cluster_id \
         WHERE c.run_id = $1 \
         ORDER BY b.id",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Store the score and trend label of a brief.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the brief does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn set_brief_score(
    pool: &PgPool,
    brief_id: i64,
    score: f64,
    trend: TrendStatus,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE topic_qa_briefs \
         SET score = $1, trend_status = $2, updated_at = NOW() \
         WHERE id = $3",
    )
    .bind(score)
    .bind(trend.as_str())
    .bind(brief_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Number of briefs attached to the clusters of a run.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_briefs_for_run(pool: &PgPool, run_id: i64) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM topic_qa_briefs b \
         JOIN clusters c ON c.id = b.cluster_id \
         WHERE c.run_id = $1",
    )
    .bind(run_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
