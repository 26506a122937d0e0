//! Database operations for the `pipeline_runs` table.
//!
//! A run is created `running` and transitions exactly once to `completed` or
//! `failed`. Every transition is guarded by `WHERE status = 'running'`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use topiclens_core::RunMode;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `pipeline_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PipelineRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub run_type: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

const RUN_COLUMNS: &str = "id, public_id, run_type, status, started_at, heartbeat_at, \
                           completed_at, error_message, metadata, created_at";

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Creates a new pipeline run in `running` status with a fresh heartbeat.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_pipeline_run(pool: &PgPool, mode: RunMode) -> Result<PipelineRunRow, DbError> {
    let public_id = Uuid::new_v4();

    let row = sqlx::query_as::<_, PipelineRunRow>(&format!(
        "INSERT INTO pipeline_runs (public_id, run_type, status, started_at, heartbeat_at) \
         VALUES ($1, $2, 'running', NOW(), NOW()) \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(public_id)
    .bind(mode.as_str())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Refreshes `heartbeat_at` on a running run.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is no longer running
/// (for example because a sweep already marked it failed), or
/// [`DbError::Sqlx`] if the update fails.
pub async fn touch_pipeline_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE pipeline_runs SET heartbeat_at = NOW() \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run as `completed` and stores the per-stage stats in `metadata`.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not `running`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn complete_pipeline_run(
    pool: &PgPool,
    id: i64,
    metadata: &Value,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE pipeline_runs \
         SET status = 'completed', completed_at = NOW(), heartbeat_at = NOW(), metadata = $1 \
         WHERE id = $2 AND status = 'running'",
    )
    .bind(metadata)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run as `failed`, setting `completed_at` and `error_message`.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not `running`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn fail_pipeline_run(pool: &PgPool, id: i64, error_message: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE pipeline_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $1 \
         WHERE id = $2 AND status = 'running'",
    )
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks every `running` run whose last heartbeat (or start, if it never
/// heartbeated) is older than `max_age_secs` as `failed`.
///
/// Returns the ids of the runs that were reaped, ascending.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn reap_stale_pipeline_runs(pool: &PgPool, max_age_secs: i64) -> Result<Vec<i64>, DbError> {
    let message = format!("abandoned: no heartbeat within {max_age_secs}s");

    let mut ids: Vec<i64> = sqlx::query_scalar(
        "UPDATE pipeline_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $1 \
         WHERE status = 'running' \
           AND COALESCE(heartbeat_at, started_at) < NOW() - make_interval(secs => $2::double precision) \
         RETURNING id",
    )
    .bind(&message)
    .bind(max_age_secs)
    .fetch_all(pool)
    .await?;

    ids.sort_unstable();
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Puts a `failed` run back into `running` so its id can be reused.
///
/// The error message and completion time are cleared and the heartbeat is
/// refreshed; `started_at` and `metadata` are kept. Completed runs are never
/// reopened, and neither are runs still `running`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown id,
/// [`DbError::InvalidRunTransition`] if the run is not `failed`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn resume_pipeline_run(pool: &PgPool, id: i64) -> Result<PipelineRunRow, DbError> {
    let row = sqlx::query_as::<_, PipelineRunRow>(&format!(
        "UPDATE pipeline_runs \
         SET status = 'running', heartbeat_at = NOW(), completed_at = NULL, error_message = NULL \
         WHERE id = $1 AND status = 'failed' \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(row),
        None => {
            get_pipeline_run(pool, id).await?;
            Err(DbError::InvalidRunTransition {
                id,
                expected_status: "failed",
            })
        }
    }
}

/// Fetches a single run by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row matches, or [`DbError::Sqlx`] on
/// query failure.
pub async fn get_pipeline_run(pool: &PgPool, id: i64) -> Result<PipelineRunRow, DbError> {
    sqlx::query_as::<_, PipelineRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM pipeline_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Lists the most recent runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pipeline_runs(pool: &PgPool, limit: i64) -> Result<Vec<PipelineRunRow>, DbError> {
    let rows = sqlx::query_as::<_, PipelineRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM pipeline_runs ORDER BY id DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
