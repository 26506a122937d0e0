//! Deterministic HDBSCAN over dense vectors with the Euclidean metric.
//!
//! The steps follow the reference algorithm: core distances, mutual
//! reachability, a minimum spanning tree, the single-linkage hierarchy, the
//! condensed tree and excess-of-mass cluster selection. All tie-breaks use
//! point or node indices so identical input always yields identical labels.

use std::collections::VecDeque;

use serde::Serialize;

use crate::PipelineError;

/// Label given to points that belong to no cluster.
pub const NOISE: i32 = -1;

/// Stand-in for `1 / 0` when two points coincide.
const LAMBDA_MAX: f64 = 1e12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HdbscanParams {
    pub min_cluster_size: usize,
    pub min_samples: usize,
}

impl Default for HdbscanParams {
    fn default() -> Self {
        Self {
            min_cluster_size: 5,
            min_samples: 3,
        }
    }
}

impl HdbscanParams {
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidParams`] if `min_cluster_size < 2` or
    /// `min_samples < 1`.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.min_cluster_size < 2 {
            return Err(PipelineError::InvalidParams(format!(
                "min_cluster_size must be at least 2, got {}",
                self.min_cluster_size
            )));
        }
        if self.min_samples < 1 {
            return Err(PipelineError::InvalidParams(
                "min_samples must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cluster `points` and return one label per point: `0..k` for clusters in
/// ascending order of discovery, [`NOISE`] otherwise.
///
/// All points must have the same dimension.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParams`] if `params` fail validation.
pub fn hdbscan(points: &[Vec<f32>], params: HdbscanParams) -> Result<Vec<i32>, PipelineError> {
    params.validate()?;

    let n = points.len();
    if n < params.min_cluster_size {
        return Ok(vec![NOISE; n]);
    }

    let distances = DistanceMatrix::new(points);
    let core = core_distances(&distances, params.min_samples);
    let mst = minimum_spanning_tree(&distances, &core);
    let hierarchy = single_linkage(mst, n);
    let condensed = condense(&hierarchy, n, params.min_cluster_size);
    let selected = select_clusters(&condensed);

    Ok(label_points(&condensed, &selected, n))
}

/// Euclidean distance in f64 between two vectors of equal length.
#[must_use]
pub fn euclidean(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

// ---------------------------------------------------------------------------
// Distances
// ---------------------------------------------------------------------------

struct DistanceMatrix {
    n: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    fn new(points: &[Vec<f32>]) -> Self {
        let n = points.len();
        let mut values = vec![0.0; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = euclidean(&points[i], &points[j]);
                values[i * n + j] = d;
                values[j * n + i] = d;
            }
        }
        Self { n, values }
    }

    fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.n + j]
    }

    fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.n..(i + 1) * self.n]
    }
}

/// Distance from each point to its `min_samples`-th nearest neighbour,
/// counting the point itself as the first.
fn core_distances(distances: &DistanceMatrix, min_samples: usize) -> Vec<f64> {
    let k = min_samples.min(distances.n);
    (0..distances.n)
        .map(|i| {
            let mut row = distances.row(i).to_vec();
            let (_, kth, _) = row.select_nth_unstable_by(k - 1, f64::total_cmp);
            *kth
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Minimum spanning tree and single linkage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Edge {
    a: usize,
    b: usize,
    weight: f64,
}

/// Prim's algorithm over the complete mutual-reachability graph. Among equal
/// candidates the lowest point index is taken.
fn minimum_spanning_tree(distances: &DistanceMatrix, core: &[f64]) -> Vec<Edge> {
    let n = distances.n;
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n.saturating_sub(1));

    let mut current = 0;
    in_tree[current] = true;

    for _ in 1..n {
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let reach = distances.get(current, j).max(core[current]).max(core[j]);
            if reach < best[j] {
                best[j] = reach;
                from[j] = current;
            }
        }

        let mut next: Option<usize> = None;
        for j in 0..n {
            if !in_tree[j] && next.is_none_or(|k| best[j] < best[k]) {
                next = Some(j);
            }
        }
        let Some(next) = next else { break };

        in_tree[next] = true;
        edges.push(Edge {
            a: from[next],
            b: next,
            weight: best[next],
        });
        current = next;
    }

    edges
}

#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    fn new(points: usize) -> Self {
        let nodes = 2 * points - 1;
        let mut size = vec![0; nodes];
        size[..points].fill(1);
        Self {
            parent: (0..nodes).collect(),
            size,
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn merge(&mut self, a: usize, b: usize, into: usize) -> usize {
        self.parent[a] = into;
        self.parent[b] = into;
        self.size[into] = self.size[a] + self.size[b];
        self.size[into]
    }
}

/// Build the single-linkage hierarchy. Merge `i` creates node `n + i`; the
/// last merge is the root `2n - 2`. Equal weights keep MST order.
fn single_linkage(mut edges: Vec<Edge>, n: usize) -> Vec<Merge> {
    edges.sort_by(|x, y| x.weight.total_cmp(&y.weight));

    let mut sets = UnionFind::new(n);
    let mut merges = Vec::with_capacity(n - 1);

    for edge in edges {
        let left = sets.find(edge.a);
        let right = sets.find(edge.b);
        let node = n + merges.len();
        let size = sets.merge(left, right, node);
        merges.push(Merge {
            left,
            right,
            distance: edge.weight,
            size,
        });
    }

    merges
}

// ---------------------------------------------------------------------------
// Condensed tree
// ---------------------------------------------------------------------------

/// One edge of the condensed tree. `child < n` is a point falling out of
/// `parent`; `child >= n` is a cluster born from `parent`.
#[derive(Debug, Clone, Copy)]
struct CondensedEdge {
    parent: usize,
    child: usize,
    lambda: f64,
    size: usize,
}

struct CondensedTree {
    n: usize,
    edges: Vec<CondensedEdge>,
    /// Number of cluster labels, root included. Cluster `c` has label `n + c`.
    clusters: usize,
}

fn lambda_of(distance: f64) -> f64 {
    (1.0 / distance).min(LAMBDA_MAX)
}

/// Walk the hierarchy breadth-first from the root. A split where both sides
/// have at least `min_cluster_size` points births two clusters; otherwise the
/// small side's points fall out and the big side keeps the parent's label.
fn condense(merges: &[Merge], n: usize, min_cluster_size: usize) -> CondensedTree {
    let node_size = |node: usize| if node < n { 1 } else { merges[node - n].size };

    let root = 2 * n - 2;
    let mut edges = Vec::with_capacity(2 * n);
    let mut next_label = n + 1;
    let mut queue = VecDeque::from([(root, n)]);

    while let Some((node, label)) = queue.pop_front() {
        let merge = merges[node - n];
        let lambda = lambda_of(merge.distance);
        let left_big = node_size(merge.left) >= min_cluster_size;
        let right_big = node_size(merge.right) >= min_cluster_size;

        match (left_big, right_big) {
            (true, true) => {
                for child in [merge.left, merge.right] {
                    let child_label = next_label;
                    next_label += 1;
                    edges.push(CondensedEdge {
                        parent: label,
                        child: child_label,
                        lambda,
                        size: node_size(child),
                    });
                    queue.push_back((child, child_label));
                }
            }
            (true, false) => {
                emit_points(merges, n, merge.right, label, lambda, &mut edges);
                queue.push_back((merge.left, label));
            }
            (false, true) => {
                emit_points(merges, n, merge.left, label, lambda, &mut edges);
                queue.push_back((merge.right, label));
            }
            (false, false) => {
                emit_points(merges, n, merge.left, label, lambda, &mut edges);
                emit_points(merges, n, merge.right, label, lambda, &mut edges);
            }
        }
    }

    CondensedTree {
        n,
        edges,
        clusters: next_label - n,
    }
}

/// Record every point under `node` as leaving cluster `label` at `lambda`.
fn emit_points(
    merges: &[Merge],
    n: usize,
    node: usize,
    label: usize,
    lambda: f64,
    out: &mut Vec<CondensedEdge>,
) {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current < n {
            out.push(CondensedEdge {
                parent: label,
                child: current,
                lambda,
                size: 1,
            });
        } else {
            let merge = merges[current - n];
            stack.push(merge.right);
            stack.push(merge.left);
        }
    }
}

// ---------------------------------------------------------------------------
// Selection and labelling
// ---------------------------------------------------------------------------

/// Excess-of-mass selection. Returns one flag per cluster index (label
/// minus `n`); the root is never selected.
fn select_clusters(tree: &CondensedTree) -> Vec<bool> {
    let n = tree.n;
    let count = tree.clusters;

    let mut birth = vec![0.0; count];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
    for edge in tree.edges.iter().filter(|e| e.child >= n) {
        birth[edge.child - n] = edge.lambda;
        children[edge.parent - n].push(edge.child - n);
    }

    let mut stability = vec![0.0; count];
    for edge in &tree.edges {
        let parent = edge.parent - n;
        #[allow(clippy::cast_precision_loss)]
        let weight = edge.size as f64;
        stability[parent] += (edge.lambda - birth[parent]) * weight;
    }

    let mut selected = vec![true; count];
    selected[0] = false;

    // Children always carry larger labels than their parent.
    for cluster in (1..count).rev() {
        let subtree: f64 = children[cluster].iter().map(|&c| stability[c]).sum();
        if subtree > stability[cluster] {
            selected[cluster] = false;
            stability[cluster] = subtree;
        } else {
            let mut stack = children[cluster].clone();
            while let Some(descendant) = stack.pop() {
                selected[descendant] = false;
                stack.extend_from_slice(&children[descendant]);
            }
        }
    }

    selected
}

/// Each point takes the nearest selected cluster at or above the cluster it
/// fell out of. Points that only reach the root are noise.
fn label_points(tree: &CondensedTree, selected: &[bool], n: usize) -> Vec<i32> {
    let mut parent_of = vec![0usize; tree.clusters];
    let mut point_cluster = vec![0usize; n];
    for edge in &tree.edges {
        if edge.child >= n {
            parent_of[edge.child - n] = edge.parent - n;
        } else {
            point_cluster[edge.child] = edge.parent - n;
        }
    }

    let mut output_label = vec![NOISE; tree.clusters];
    let mut next = 0i32;
    for (cluster, _) in selected.iter().enumerate().filter(|(_, s)| **s) {
        output_label[cluster] = next;
        next += 1;
    }

    point_cluster
        .into_iter()
        .map(|mut cluster| loop {
            if selected[cluster] {
                break output_label[cluster];
            }
            if cluster == 0 {
                break NOISE;
            }
            cluster = parent_of[cluster];
        })
        .collect()
}

#[cfg(test)]
#[path = "hdbscan_test.rs"]
mod tests;
