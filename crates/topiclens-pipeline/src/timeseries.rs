//! Monthly post-count and upvote rollups per cluster.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate};
use serde::Serialize;
use sqlx::PgPool;
use topiclens_db::TimeseriesPoint;

use crate::PipelineError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimeseriesStats {
    pub clusters_processed: usize,
    pub months_aggregated: usize,
    pub errors: Vec<String>,
}

/// First day of the UTC month containing `created_utc` (unix seconds).
#[must_use]
pub fn month_of(created_utc: i64) -> Option<NaiveDate> {
    let date = DateTime::from_timestamp(created_utc, 0)?.date_naive();
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
}

/// Group `(created_utc, upvotes)` pairs by month, oldest month first.
/// Timestamps outside chrono's range are skipped.
#[must_use]
pub fn monthly_rollup(posts: &[(i64, i32)]) -> Vec<TimeseriesPoint> {
    let mut months: BTreeMap<NaiveDate, (i32, f64)> = BTreeMap::new();
    for &(created_utc, upvotes) in posts {
        let Some(month) = month_of(created_utc) else {
            continue;
        };
        let entry = months.entry(month).or_default();
        entry.0 += 1;
        entry.1 += f64::from(upvotes);
    }

    months
        .into_iter()
        .map(|(month, (post_count, weighted_score))| TimeseriesPoint {
            month,
            post_count,
            weighted_score,
        })
        .collect()
}

/// Rebuild the monthly series of every cluster of `run_id`.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if clusters or members cannot be read or a
/// series cannot be written.
pub async fn generate_timeseries(
    pool: &PgPool,
    run_id: i64,
    dry_run: bool,
) -> Result<TimeseriesStats, PipelineError> {
    let clusters = topiclens_db::list_clusters_for_run(pool, run_id).await?;
    let mut stats = TimeseriesStats::default();

    for cluster in &clusters {
        let members = topiclens_db::list_cluster_members(pool, cluster.id, run_id).await?;
        let posts: Vec<(i64, i32)> = members.iter().map(|m| (m.created_utc, m.upvotes)).collect();
        if posts.iter().any(|(ts, _)| month_of(*ts).is_none()) {
            stats
                .errors
                .push(format!("cluster {}: timestamp out of range", cluster.id));
        }
        let points = monthly_rollup(&posts);

        stats.clusters_processed += 1;
        stats.months_aggregated += points.len();

        if dry_run {
            tracing::info!(dry_run = true, cluster_id = cluster.id, months = points.len(), "cluster timeseries");
            continue;
        }
        topiclens_db::replace_cluster_timeseries(pool, cluster.id, run_id, &points).await?;
    }

    tracing::info!(
        run_id,
        clusters = stats.clusters_processed,
        months = stats.months_aggregated,
        "timeseries aggregation complete"
    );
    Ok(stats)
}
