//! Database operations for the external search tables: `gsc_queries` and
//! `serp_aio`.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Search Console
// ---------------------------------------------------------------------------

/// One Search Console row. `date_month` is the first day of the month.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGscRow {
    pub query: String,
    pub page: String,
    pub country: String,
    pub device: String,
    pub date_month: NaiveDate,
    pub impressions: i64,
    pub clicks: i64,
    pub ctr: f64,
    pub position: Option<f64>,
}

/// Per-query Search Console totals.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct GscQueryAggregate {
    pub query: String,
    pub total_impressions: i64,
    pub total_clicks: i64,
    pub avg_ctr: f64,
    pub avg_position: Option<f64>,
}

/// Upsert a chunk of Search Console rows in one transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails.
pub async fn upsert_gsc_rows(pool: &PgPool, rows: &[NewGscRow]) -> Result<u64, DbError> {
    let mut tx = pool.begin().await?;
    let mut written = 0;

    for row in rows {
        let result = sqlx::query(
            "INSERT INTO gsc_queries \
                 (query, page, country, device, date_month, impressions, clicks, ctr, position) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (query, page, country, device, date_month) DO UPDATE SET \
                 impressions = EXCLUDED.impressions, \
                 clicks = EXCLUDED.clicks, \
                 ctr = EXCLUDED.ctr, \
                 position = EXCLUDED.position, \
                 updated_at = NOW()",
        )
        .bind(&row.query)
        .bind(&row.page)
        .bind(&row.country)
        .bind(&row.device)
        .bind(row.date_month)
        .bind(row.impressions)
        .bind(row.clicks)
        .bind(row.ctr)
        .bind(row.position)
        .execute(&mut *tx)
        .await?;
        written += result.rows_affected();
    }

    tx.commit().await?;
    Ok(written)
}

/// Queries matching any of `patterns` (`ILIKE`), aggregated per query and
/// ordered by total impressions. See [`crate::substring_patterns`].
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_gsc_matching(
    pool: &PgPool,
    patterns: &[String],
    limit: i64,
) -> Result<Vec<GscQueryAggregate>, DbError> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, GscQueryAggregate>(
        "SELECT query, \
                SUM(impressions)::BIGINT AS total_impressions, \
                SUM(clicks)::BIGINT AS total_clicks, \
                COALESCE(AVG(ctr), 0)::DOUBLE PRECISION AS avg_ctr, \
                AVG(position)::DOUBLE PRECISION AS avg_position \
         FROM gsc_queries \
         WHERE query ILIKE ANY($1) \
         GROUP BY query \
         ORDER BY total_impressions DESC, query \
         LIMIT $2",
    )
    .bind(patterns)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// SERP AI Overviews
// ---------------------------------------------------------------------------

/// One AI-Overview snapshot. `snapshot_date` is the UTC date of `snapshot_at`.
#[derive(Debug, Clone)]
pub struct NewSerpAio {
    pub query: String,
    pub locale: String,
    pub aio_text: String,
    pub cited_sources: Value,
    pub snapshot_at: DateTime<Utc>,
    pub run_id: Option<i64>,
}

/// A stored AI-Overview snapshot.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SerpAioRow {
    pub query: String,
    pub aio_text: String,
    pub cited_sources: Value,
    pub snapshot_at: DateTime<Utc>,
}

/// Insert or overwrite the snapshot for `(query, locale, snapshot_date)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_serp_aio(pool: &PgPool, snapshot: &NewSerpAio) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO serp_aio \
             (query, locale, snapshot_date, aio_text, cited_sources, snapshot_at, run_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (query, locale, snapshot_date) DO UPDATE SET \
             aio_text = EXCLUDED.aio_text, \
             cited_sources = EXCLUDED.cited_sources, \
             snapshot_at = EXCLUDED.snapshot_at, \
             run_id = EXCLUDED.run_id",
    )
    .bind(&snapshot.query)
    .bind(&snapshot.locale)
    .bind(snapshot.snapshot_at.date_naive())
    .bind(&snapshot.aio_text)
    .bind(&snapshot.cited_sources)
    .bind(snapshot.snapshot_at)
    .bind(snapshot.run_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// The newest snapshot whose query matches any of `patterns`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_serp_aio_matching(
    pool: &PgPool,
    patterns: &[String],
) -> Result<Option<SerpAioRow>, DbError> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let row = sqlx::query_as::<_, SerpAioRow>(
        "SELECT query, aio_text, cited_sources, snapshot_at \
         FROM serp_aio \
         WHERE query ILIKE ANY($1) \
         ORDER BY snapshot_at DESC, id DESC \
         LIMIT 1",
    )
    .bind(patterns)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
