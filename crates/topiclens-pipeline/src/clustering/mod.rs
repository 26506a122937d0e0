//! Cluster engine: HDBSCAN over a run's embeddings, centroids,
//! representative selection and per-cluster persistence.

pub mod hdbscan;

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use topiclens_core::{AppConfig, DOC_TYPE_REDDIT_POST};
use topiclens_db::{NewAssignment, NewCluster};

pub use hdbscan::{euclidean, hdbscan, HdbscanParams, NOISE};

use crate::PipelineError;

pub const ALGORITHM: &str = "hdbscan";

const DRY_RUN_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterSettings {
    pub params: HdbscanParams,
    /// Representatives per cluster; clusters smaller than this mark every
    /// member.
    pub representative_k: usize,
    pub dry_run: bool,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            params: HdbscanParams::default(),
            representative_k: 5,
            dry_run: false,
        }
    }
}

impl ClusterSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig, dry_run: bool) -> Self {
        Self {
            params: HdbscanParams {
                min_cluster_size: config.min_cluster_size,
                min_samples: config.min_samples,
            },
            representative_k: config.representative_k,
            dry_run,
        }
    }

    fn params_json(&self) -> serde_json::Value {
        json!({
            "min_cluster_size": self.params.min_cluster_size,
            "min_samples": self.params.min_samples,
            "metric": "euclidean",
            "representative_k": self.representative_k,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterStats {
    pub clusters_created: usize,
    pub noise_points: usize,
    pub assignments_created: usize,
    pub representative_samples: usize,
    pub clusters_pruned: u64,
}

/// One non-noise cluster, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterPlan {
    pub label: i32,
    /// Indices into the input vectors, ascending.
    pub members: Vec<usize>,
    /// Distance of each member to the centroid, parallel to `members`.
    pub distances: Vec<f64>,
    /// Indices into `members` of the representatives, closest first.
    pub representatives: Vec<usize>,
}

/// Group point indices by label in ascending label order. Noise is dropped.
#[must_use]
pub fn group_by_label(labels: &[i32]) -> BTreeMap<i32, Vec<usize>> {
    let mut groups: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (index, &label) in labels.iter().enumerate() {
        if label != NOISE {
            groups.entry(label).or_default().push(index);
        }
    }
    groups
}

/// Arithmetic mean of the selected vectors.
#[must_use]
pub fn centroid(vectors: &[Vec<f32>], members: &[usize]) -> Vec<f32> {
    let Some(&first) = members.first() else {
        return Vec::new();
    };

    let mut sum = vec![0.0f64; vectors[first].len()];
    for &index in members {
        for (acc, value) in sum.iter_mut().zip(&vectors[index]) {
            *acc += f64::from(*value);
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let count = members.len() as f64;
    #[allow(clippy::cast_possible_truncation)]
    sum.into_iter().map(|v| (v / count) as f32).collect()
}

/// Positions of the `k` smallest distances. Equal distances keep their
/// original order. Returns every position when there are fewer than `k`.
#[must_use]
pub fn select_representatives(distances: &[f64], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..distances.len()).collect();
    order.sort_by(|&a, &b| distances[a].total_cmp(&distances[b]));
    order.truncate(k.min(distances.len()));
    order
}

/// Turn raw labels into persistable cluster plans.
#[must_use]
pub fn plan_clusters(vectors: &[Vec<f32>], labels: &[i32], k: usize) -> Vec<ClusterPlan> {
    group_by_label(labels)
        .into_iter()
        .map(|(label, members)| {
            let center = centroid(vectors, &members);
            let distances: Vec<f64> = members
                .iter()
                .map(|&i| euclidean(&vectors[i], &center))
                .collect();
            let representatives = select_representatives(&distances, k);
            ClusterPlan {
                label,
                members,
                distances,
                representatives,
            }
        })
        .collect()
}

/// Cluster every embedding of `run_id` and persist the result.
///
/// Each cluster is written in its own transaction. Once all clusters are
/// stored, rows of this run that the new result no longer contains are
/// pruned, so a re-run converges on the latest labelling.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParams`] for invalid HDBSCAN parameters,
/// [`PipelineError::DimensionMismatch`] when vectors of the run differ in
/// length, and [`PipelineError::Db`] on any database failure. Clusters
/// committed before a failure stay intact.
pub async fn run_clustering_pipeline(
    pool: &PgPool,
    run_id: i64,
    settings: &ClusterSettings,
) -> Result<ClusterStats, PipelineError> {
    settings.params.validate()?;

    let rows = topiclens_db::list_embeddings_for_run(pool, DOC_TYPE_REDDIT_POST, run_id).await?;
    if rows.is_empty() {
        tracing::info!(run_id, "no embeddings to cluster");
        return Ok(ClusterStats::default());
    }

    let (doc_ids, vectors): (Vec<String>, Vec<Vec<f32>>) =
        rows.into_iter().map(|r| (r.doc_id, r.embedding.0)).unzip();

    let expected = vectors[0].len();
    if let Some((index, vector)) = vectors.iter().enumerate().find(|(_, v)| v.len() != expected) {
        return Err(PipelineError::DimensionMismatch {
            doc_id: doc_ids[index].clone(),
            expected,
            actual: vector.len(),
        });
    }

    tracing::info!(
        run_id,
        points = vectors.len(),
        dim = expected,
        min_cluster_size = settings.params.min_cluster_size,
        min_samples = settings.params.min_samples,
        "running hdbscan"
    );
    let labels = hdbscan(&vectors, settings.params)?;
    let plans = plan_clusters(&vectors, &labels, settings.representative_k);

    let mut stats = ClusterStats {
        noise_points: labels.iter().filter(|&&l| l == NOISE).count(),
        ..ClusterStats::default()
    };
    let params = settings.params_json();

    for plan in &plans {
        stats.clusters_created += 1;
        stats.assignments_created += plan.members.len();
        stats.representative_samples += plan.representatives.len();

        if settings.dry_run {
            if stats.clusters_created <= DRY_RUN_SAMPLES {
                let sample: Vec<&str> = plan
                    .representatives
                    .iter()
                    .map(|&r| doc_ids[plan.members[r]].as_str())
                    .collect();
                tracing::info!(
                    dry_run = true,
                    label = plan.label,
                    size = plan.members.len(),
                    representatives = ?sample,
                    "cluster"
                );
            }
            continue;
        }

        let assignments: Vec<NewAssignment> = plan
            .members
            .iter()
            .zip(&plan.distances)
            .enumerate()
            .map(|(position, (&index, &distance))| NewAssignment {
                doc_type: DOC_TYPE_REDDIT_POST.to_string(),
                doc_id: doc_ids[index].clone(),
                distance_to_centroid: distance,
                is_representative: plan.representatives.contains(&position),
            })
            .collect();

        let cluster = NewCluster {
            run_id,
            label: plan.label,
            algorithm: ALGORITHM.to_string(),
            params: params.clone(),
            size: i32::try_from(plan.members.len()).unwrap_or(i32::MAX),
        };
        let cluster_id = topiclens_db::persist_cluster(pool, &cluster, &assignments).await?;
        tracing::debug!(run_id, cluster_id, label = plan.label, size = plan.members.len(), "cluster persisted");
    }

    if !settings.dry_run {
        let kept_labels: Vec<i32> = plans.iter().map(|p| p.label).collect();
        let kept_doc_ids: Vec<String> = plans
            .iter()
            .flat_map(|p| p.members.iter().map(|&i| doc_ids[i].clone()))
            .collect();
        let pruned =
            topiclens_db::prune_stale_clusters(pool, run_id, &kept_labels, &kept_doc_ids).await?;
        stats.clusters_pruned = pruned.clusters_deleted;
        if pruned.clusters_deleted > 0 || pruned.assignments_deleted > 0 {
            tracing::info!(
                run_id,
                clusters_deleted = pruned.clusters_deleted,
                assignments_deleted = pruned.assignments_deleted,
                "pruned stale cluster rows"
            );
        }
    }

    tracing::info!(
        run_id,
        clusters = stats.clusters_created,
        noise = stats.noise_points,
        assignments = stats.assignments_created,
        representatives = stats.representative_samples,
        "clustering complete"
    );
    Ok(stats)
}
