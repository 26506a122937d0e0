//! Database operations for `cluster_timeseries`.

use chrono::NaiveDate;
use sqlx::PgPool;

use crate::DbError;

/// One monthly rollup for a cluster. `month` is the first day of the month.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TimeseriesPoint {
    pub month: NaiveDate,
    pub post_count: i32,
    pub weighted_score: f64,
}

/// Replace the monthly series of one cluster for one run.
///
/// Each point is upserted on `(cluster_id, month, run_id)`; months of this
/// cluster and run that are absent from `points` are deleted. Runs in one
/// transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails.
pub async fn replace_cluster_timeseries(
    pool: &PgPool,
    cluster_id: i64,
    run_id: i64,
    points: &[TimeseriesPoint],
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    for point in points {
        sqlx::query(
            "INSERT INTO cluster_timeseries \
                 (cluster_id, month, run_id, post_count, weighted_score) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (cluster_id, month, run_id) DO UPDATE SET \
                 post_count = EXCLUDED.post_count, \
                 weighted_score = EXCLUDED.weighted_score, \
                 updated_at = NOW()",
        )
        .bind(cluster_id)
        .bind(point.month)
        .bind(run_id)
        .bind(point.post_count)
        .bind(point.weighted_score)
        .execute(&mut *tx)
        .await?;
    }

    let months: Vec<NaiveDate> = points.iter().map(|p| p.month).collect();
    sqlx::query(
        "DELETE FROM cluster_timeseries \
         WHERE cluster_id = $1 AND run_id = $2 AND NOT (month = ANY($3))",
    )
    .bind(cluster_id)
    .bind(run_id)
    .bind(&months)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// The `limit` most recent months of a cluster, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_recent_timeseries(
    pool: &PgPool,
    cluster_id: i64,
    run_id: i64,
    limit: i64,
) -> Result<Vec<TimeseriesPoint>, DbError> {
    let rows = sqlx::query_as::<_, TimeseriesPoint>(
        "SELECT month, post_count, weighted_score \
         FROM cluster_timeseries \
         WHERE cluster_id = $1 AND run_id = $2 \
         ORDER BY month DESC \
         LIMIT $3",
    )
    .bind(cluster_id)
    .bind(run_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
