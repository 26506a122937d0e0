//! Database operations for `reddit_posts` and `reddit_comments`.
//!
//! Raw documents are written only by the collectors. Re-collecting a post or
//! comment refreshes its engagement counters and nothing else.

use serde_json::Value;
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Input and row types
// ---------------------------------------------------------------------------

/// A Reddit post as handed over by the collector.
#[derive(Debug, Clone)]
pub struct NewRedditPost {
    pub reddit_post_id: String,
    pub subreddit: String,
    pub title: String,
    pub body: Option<String>,
    pub author: Option<String>,
    /// Unix seconds.
    pub created_utc: i64,
    pub upvotes: i32,
    pub num_comments: i32,
    pub permalink: Option<String>,
    pub url: Option<String>,
    pub keyword: Option<String>,
    pub raw: Value,
}

/// A Reddit comment as handed over by the collector.
#[derive(Debug, Clone)]
pub struct NewRedditComment {
    pub reddit_comment_id: String,
    pub reddit_post_id: String,
    pub author: Option<String>,
    pub body: Option<String>,
    pub created_utc: i64,
    pub upvotes: i32,
    pub is_top: bool,
}

/// The text fields the preprocessor and embedder read from a post.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostTextRow {
    pub reddit_post_id: String,
    pub title: String,
    pub body: Option<String>,
    pub created_utc: i64,
}

/// A top comment attached to an evidence pack.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommentRow {
    pub reddit_post_id: String,
    pub body: Option<String>,
    pub upvotes: i32,
    pub author: Option<String>,
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Upsert a chunk of posts inside one transaction.
///
/// On conflict only `upvotes`, `num_comments` and `updated_at` change.
/// Returns the number of rows written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; the whole chunk is
/// rolled back in that case.
pub async fn upsert_reddit_posts(
    pool: &PgPool,
    posts: &[NewRedditPost],
    run_id: Option<i64>,
) -> Result<u64, DbError> {
    let mut tx = pool.begin().await?;
    let mut written = 0;

    for post in posts {
        let result = sqlx::query(
            "INSERT INTO reddit_posts \
                 (reddit_post_id, subreddit, title, body, author, created_utc, upvotes, \
                  num_comments, permalink, url, keyword, raw, collected_run_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (reddit_post_id) DO UPDATE SET \
                 upvotes = EXCLUDED.upvotes, \
                 num_comments = EXCLUDED.num_comments, \
                 updated_at = NOW()",
        )
        .bind(&post.reddit_post_id)
        .bind(&post.subreddit)
        .bind(&post.title)
        .bind(&post.body)
        .bind(&post.author)
        .bind(post.created_utc)
        .bind(post.upvotes)
        .bind(post.num_comments)
        .bind(&post.permalink)
        .bind(&post.url)
        .bind(&post.keyword)
        .bind(&post.raw)
        .bind(run_id)
        .execute(&mut *tx)
        .await?;
        written += result.rows_affected();
    }

    tx.commit().await?;
    Ok(written)
}

/// Upsert a chunk of comments inside one transaction.
///
/// On conflict only `upvotes` and `is_top` change.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails.
pub async fn upsert_reddit_comments(
    pool: &PgPool,
    comments: &[NewRedditComment],
) -> Result<u64, DbError> {
    let mut tx = pool.begin().await?;
    let mut written = 0;

    for comment in comments {
        let result = sqlx::query(
            "INSERT INTO reddit_comments \
                 (reddit_comment_id, reddit_post_id, author, body, created_utc, upvotes, is_top) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (reddit_comment_id) DO UPDATE SET \
                 upvotes = EXCLUDED.upvotes, \
                 is_top = EXCLUDED.is_top",
        )
        .bind(&comment.reddit_comment_id)
        .bind(&comment.reddit_post_id)
        .bind(&comment.author)
        .bind(&comment.body)
        .bind(comment.created_utc)
        .bind(comment.upvotes)
        .bind(comment.is_top)
        .execute(&mut *tx)
        .await?;
        written += result.rows_affected();
    }

    tx.commit().await?;
    Ok(written)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// All posts in the deterministic preprocessing order: newest first, ties by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_posts_for_preprocess(pool: &PgPool) -> Result<Vec<PostTextRow>, DbError> {
    let rows = sqlx::query_as::<_, PostTextRow>(
        "SELECT reddit_post_id, title, body, created_utc \
         FROM reddit_posts \
         ORDER BY created_utc DESC, reddit_post_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Posts among `eligible_ids` that have no embedding of `doc_type` for
/// `run_id` yet, in preprocessing order, bounded by `limit`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_posts_missing_embedding(
    pool: &PgPool,
    doc_type: &str,
    run_id: i64,
    eligible_ids: &[String],
    limit: i64,
) -> Result<Vec<PostTextRow>, DbError> {
    if eligible_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, PostTextRow>(
        "SELECT rp.reddit_post_id, rp.title, rp.body, rp.created_utc \
         FROM reddit_posts rp \
         WHERE rp.reddit_post_id = ANY($3) \
           AND NOT EXISTS ( \
             SELECT 1 FROM embeddings e \
             WHERE e.doc_type = $1 AND e.doc_id = rp.reddit_post_id AND e.run_id = $2 \
           ) \
         ORDER BY rp.created_utc DESC, rp.reddit_post_id \
         LIMIT $4",
    )
    .bind(doc_type)
    .bind(run_id)
    .bind(eligible_ids)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Top comments (`is_top = TRUE`) for the given posts, highest upvotes first
/// within each post.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_top_comments(
    pool: &PgPool,
    post_ids: &[String],
) -> Result<Vec<CommentRow>, DbError> {
    if post_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, CommentRow>(
        "SELECT reddit_post_id, body, upvotes, author \
         FROM reddit_comments \
         WHERE reddit_post_id = ANY($1) AND is_top = TRUE \
         ORDER BY reddit_post_id, upvotes DESC, reddit_comment_id",
    )
    .bind(post_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
