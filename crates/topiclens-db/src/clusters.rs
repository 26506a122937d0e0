//! Database operations for `clusters` and `cluster_assignments`.
//!
//! A cluster is identified by its natural key `(run_id, label)`. Noise points
//! never get a cluster row.

use serde_json::Value;
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Input and row types
// ---------------------------------------------------------------------------

/// One non-noise cluster produced by a clustering pass.
#[derive(Debug, Clone)]
pub struct NewCluster {
    pub run_id: i64,
    pub label: i32,
    pub algorithm: String,
    pub params: Value,
    pub size: i32,
}

/// One member of a [`NewCluster`].
#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub doc_type: String,
    pub doc_id: String,
    pub distance_to_centroid: f64,
    pub is_representative: bool,
}

/// A row from the `clusters` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClusterRow {
    pub id: i64,
    pub run_id: i64,
    pub label: i32,
    pub algorithm: String,
    pub params: Value,
    pub size: i32,
    pub noise_label: bool,
    pub topic_category: Option<String>,
    pub sub_index: Option<i32>,
    pub keywords: Option<Value>,
}

impl ClusterRow {
    /// Keywords stored by the keyword extractor, or an empty list.
    #[must_use]
    pub fn keyword_list(&self) -> Vec<String> {
        self.keywords
            .as_ref()
            .and_then(|v| serde_json::from_value::<Vec<String>>(v.clone()).ok())
            .unwrap_or_default()
    }
}

/// A member post of a cluster joined with its assignment.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClusterMemberRow {
    pub reddit_post_id: String,
    pub title: String,
    pub body: Option<String>,
    pub upvotes: i32,
    pub created_utc: i64,
    pub permalink: Option<String>,
    pub url: Option<String>,
    pub keyword: Option<String>,
    pub distance_to_centroid: f64,
    pub is_representative: bool,
}

/// Rows removed by [`prune_stale_clusters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub clusters_deleted: u64,
    pub assignments_deleted: u64,
}

const CLUSTER_COLUMNS: &str = "id, run_id, label, algorithm, params, size, noise_label, \
                               topic_category, sub_index, keywords";

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Upsert one cluster and all of its assignments in a single transaction.
///
/// The cluster is matched on `(run_id, label)`; every assignment on
/// `(doc_type, doc_id, run_id)`, so a document that moved between clusters
/// is re-pointed rather than duplicated. Returns the cluster id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails. Nothing of this cluster
/// is committed in that case; other clusters are unaffected.
pub async fn persist_cluster(
    pool: &PgPool,
    cluster: &NewCluster,
    assignments: &[NewAssignment],
) -> Result<i64, DbError> {
    let mut tx = pool.begin().await?;

    let cluster_id: i64 = sqlx::query_scalar(
        "INSERT INTO clusters (run_id, label, algorithm, params, size, noise_label) \
         VALUES ($1, $2, $3, $4, $5, FALSE) \
         ON CONFLICT (run_id, label) DO UPDATE SET \
             algorithm = EXCLUDED.algorithm, \
             params = EXCLUDED.params, \
             size = EXCLUDED.size, \
             updated_at = NOW() \
         RETURNING id",
    )
    .bind(cluster.run_id)
    .bind(cluster.label)
    .bind(&cluster.algorithm)
    .bind(&cluster.params)
    .bind(cluster.size)
    .fetch_one(&mut *tx)
    .await?;

    for assignment in assignments {
        sqlx::query(
            "INSERT INTO cluster_assignments \
                 (cluster_id, doc_type, doc_id, run_id, distance_to_centroid, is_representative) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (doc_type, doc_id, run_id) DO UPDATE SET \
                 cluster_id = EXCLUDED.cluster_id, \
                 distance_to_centroid = EXCLUDED.distance_to_centroid, \
                 is_representative = EXCLUDED.is_representative",
        )
        .bind(cluster_id)
        .bind(&assignment.doc_type)
        .bind(&assignment.doc_id)
        .bind(cluster.run_id)
        .bind(assignment.distance_to_centroid)
        .bind(assignment.is_representative)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(cluster_id)
}

/// Delete rows of `run_id` that the latest clustering pass no longer produces.
///
/// Assignments whose document is not in `kept_doc_ids` (it became noise) are
/// removed, then clusters whose label is not in `kept_labels`. Dependent
/// timeseries and brief rows go with their cluster.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either delete fails.
pub async fn prune_stale_clusters(
    pool: &PgPool,
    run_id: i64,
    kept_labels: &[i32],
    kept_doc_ids: &[String],
) -> Result<PruneStats, DbError> {
    let mut tx = pool.begin().await?;

    let assignments = sqlx::query(
        "DELETE FROM cluster_assignments \
         WHERE run_id = $1 AND NOT (doc_id = ANY($2))",
    )
    .bind(run_id)
    .bind(kept_doc_ids)
    .execute(&mut *tx)
    .await?;

    let clusters = sqlx::query(
        "DELETE FROM clusters \
         WHERE run_id = $1 AND NOT (label = ANY($2))",
    )
    .bind(run_id)
    .bind(kept_labels)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(PruneStats {
        clusters_deleted: clusters.rows_affected(),
        assignments_deleted: assignments.rows_affected(),
    })
}

/// Store the extracted keyword list on a cluster.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the cluster does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn set_cluster_keywords(
    pool: &PgPool,
    cluster_id: i64,
    keywords: &[String],
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE clusters SET keywords = $1, updated_at = NOW() WHERE id = $2",
    )
    .bind(serde_json::json!(keywords))
    .bind(cluster_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Every cluster of a run, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_clusters_for_run(pool: &PgPool, run_id: i64) -> Result<Vec<ClusterRow>, DbError> {
    let rows = sqlx::query_as::<_, ClusterRow>(&format!(
        "SELECT {CLUSTER_COLUMNS} FROM clusters \
         WHERE run_id = $1 AND noise_label = FALSE \
         ORDER BY id"
    ))
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// The `limit` largest clusters of a run; ties broken by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_top_clusters_by_size(
    pool: &PgPool,
    run_id: i64,
    limit: i64,
) -> Result<Vec<ClusterRow>, DbError> {
    let rows = sqlx::query_as::<_, ClusterRow>(&format!(
        "SELECT {CLUSTER_COLUMNS} FROM clusters \
         WHERE run_id = $1 AND noise_label = FALSE \
         ORDER BY size DESC, id \
         LIMIT $2"
    ))
    .bind(run_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Member posts of a cluster for one run, ordered by post id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_cluster_members(
    pool: &PgPool,
    cluster_id: i64,
    run_id: i64,
) -> Result<Vec<ClusterMemberRow>, DbError> {
    let rows = sqlx::query_as::<_, ClusterMemberRow>(
        "SELECT rp.reddit_post_id, rp.title, rp.body, rp.upvotes, rp.created_utc, \
                rp.permalink, rp.url, rp.keyword, \
                ca.distance_to_centroid, ca.is_representative \
         FROM cluster_assignments ca \
         JOIN reddit_posts rp ON rp.reddit_post_id = ca.doc_id \
         WHERE ca.cluster_id = $1 AND ca.run_id = $2 \
         ORDER BY rp.reddit_post_id",
    )
    .bind(cluster_id)
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Number of assignment rows for a run.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_assignments_for_run(pool: &PgPool, run_id: i64) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM cluster_assignments WHERE run_id = $1",
    )
    .bind(run_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// The newest run id that owns at least one cluster.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_clustered_run_id(pool: &PgPool) -> Result<Option<i64>, DbError> {
    let run_id = sqlx::query_scalar::<_, i64>(
        "SELECT run_id FROM clusters ORDER BY run_id DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(run_id)
}
