//! Database operations for the run-scoped `embeddings` table.

use sqlx::types::Json;
use sqlx::PgPool;

use crate::DbError;

/// One embedding to persist for `(doc_type, doc_id, run_id)`.
#[derive(Debug, Clone)]
pub struct NewEmbedding {
    pub doc_type: String,
    pub doc_id: String,
    pub run_id: i64,
    pub vector: Vec<f32>,
    pub text_hash: String,
    pub model_name: String,
}

/// A stored embedding as loaded by the cluster engine.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EmbeddingRow {
    pub doc_id: String,
    pub embedding: Json<Vec<f32>>,
}

/// Insert or overwrite the embedding for `(doc_type, doc_id, run_id)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_embedding(pool: &PgPool, embedding: &NewEmbedding) -> Result<(), DbError> {
    let dim = i32::try_from(embedding.vector.len()).unwrap_or(i32::MAX);

    sqlx::query(
        "INSERT INTO embeddings \
             (doc_type, doc_id, run_id, embedding, text_hash, model_name, dim) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (doc_type, doc_id, run_id) DO UPDATE SET \
             embedding = EXCLUDED.embedding, \
             text_hash = EXCLUDED.text_hash, \
             model_name = EXCLUDED.model_name, \
             dim = EXCLUDED.dim",
    )
    .bind(&embedding.doc_type)
    .bind(&embedding.doc_id)
    .bind(embedding.run_id)
    .bind(Json(&embedding.vector))
    .bind(&embedding.text_hash)
    .bind(&embedding.model_name)
    .bind(dim)
    .execute(pool)
    .await?;

    Ok(())
}

/// All embeddings of `doc_type` for a run, ordered by `doc_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query or JSON decoding fails.
pub async fn list_embeddings_for_run(
    pool: &PgPool,
    doc_type: &str,
    run_id: i64,
) -> Result<Vec<EmbeddingRow>, DbError> {
    let rows = sqlx::query_as::<_, EmbeddingRow>(
        "SELECT doc_id, embedding \
         FROM embeddings \
         WHERE doc_type = $1 AND run_id = $2 \
         ORDER BY doc_id",
    )
    .bind(doc_type)
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Number of embeddings stored for a run.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_embeddings_for_run(pool: &PgPool, run_id: i64) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM embeddings WHERE run_id = $1")
        .bind(run_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}
