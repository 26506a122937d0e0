//! Trend classification and brief scoring.

use serde::Serialize;
use sqlx::PgPool;
use topiclens_core::TrendStatus;

use crate::PipelineError;

const BASE_SCORE: f64 = 75.0;
const TREND_WINDOW: i64 = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreStats {
    pub briefs_scored: usize,
}

/// Classify a trend from monthly post counts, newest first.
///
/// Fewer than two months is `Niche`. Otherwise the newest count is compared
/// with the oldest one given: above 1.2x is `Emerging`, below 0.8x is
/// `Saturated`, anything between is `Competitive`.
#[must_use]
pub fn classify_trend(counts_newest_first: &[i32]) -> TrendStatus {
    let (Some(&newest), Some(&oldest)) = (counts_newest_first.first(), counts_newest_first.last())
    else {
        return TrendStatus::Niche;
    };
    if counts_newest_first.len() < 2 {
        return TrendStatus::Niche;
    }

    let newest = f64::from(newest);
    let oldest = f64::from(oldest);
    if newest > oldest * 1.2 {
        TrendStatus::Emerging
    } else if newest < oldest * 0.8 {
        TrendStatus::Saturated
    } else {
        TrendStatus::Competitive
    }
}

#[must_use]
pub fn score_for(trend: TrendStatus) -> f64 {
    let bonus = match trend {
        TrendStatus::Emerging => 15.0,
        TrendStatus::Competitive => 5.0,
        TrendStatus::Saturated | TrendStatus::Niche => 0.0,
    };
    BASE_SCORE + bonus
}

/// Score every brief of `run_id` from its cluster's last three months.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] on any database failure.
pub async fn calculate_scores(
    pool: &PgPool,
    run_id: i64,
    dry_run: bool,
) -> Result<ScoreStats, PipelineError> {
    let briefs = topiclens_db::list_briefs_for_run(pool, run_id).await?;
    let mut stats = ScoreStats::default();

    for brief in &briefs {
        let points =
            topiclens_db::list_recent_timeseries(pool, brief.cluster_id, run_id, TREND_WINDOW)
                .await?;
        let counts: Vec<i32> = points.iter().map(|p| p.post_count).collect();
        let trend = classify_trend(&counts);
        let score = score_for(trend);

        if dry_run {
            tracing::info!(dry_run = true, brief_id = brief.id, %trend, score, "brief score");
        } else {
            topiclens_db::set_brief_score(pool, brief.id, score, trend).await?;
        }
        stats.briefs_scored += 1;
    }

    tracing::info!(run_id, briefs_scored = stats.briefs_scored, "scoring complete");
    Ok(stats)
}
