//! k-nearest-neighbor graph construction over the reference corpus.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::{NeighborGraph, NodeId};
use crate::error::{GeodesicError, Result};
use crate::metric::DistanceMetric;
use crate::primitives::{FeatureVector, ReferenceCorpus};

/// Strategy for finding each node's candidate neighbors.
///
/// Both strategies are deterministic: the approximate one draws its random
/// projections from an explicitly seeded generator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NeighborSearch {
    /// All-pairs distances, O(N²).
    #[default]
    Exact,
    /// Seeded random 1-D projections.
    ///
    /// Points are sorted along each random direction; the `window` points on
    /// either side of a node become its candidates. A node with fewer than k
    /// candidates widens its window until it has k. Exact distances are then
    /// computed over the union of candidates from all projections.
    RandomProjection {
        /// RNG seed for the projection directions
        seed: u64,
        /// Number of random directions
        n_projections: usize,
        /// Candidates taken on each side along a projection
        window: usize,
    },
}

impl NeighborSearch {
    /// Check the strategy parameters.
    ///
    /// # Errors
    /// `InvalidConfig` if `n_projections` or `window` is zero.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Exact => Ok(()),
            Self::RandomProjection {
                n_projections,
                window,
                ..
            } => {
                if *n_projections == 0 {
                    return Err(GeodesicError::invalid_config(
                        "n_projections",
                        n_projections,
                        ">= 1",
                    ));
                }
                if *window == 0 {
                    return Err(GeodesicError::invalid_config("window", window, ">= 1"));
                }
                Ok(())
            }
        }
    }

    /// Deterministic identity including parameters.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl Hash for NeighborSearch {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Exact => 0u8.hash(state),
            Self::RandomProjection {
                seed,
                n_projections,
                window,
            } => {
                1u8.hash(state);
                seed.hash(state);
                n_projections.hash(state);
                window.hash(state);
            }
        }
    }
}

/// Builds the symmetric k-NN graph over a reference corpus.
///
/// Each corpus point is linked to its `k` nearest other corpus points and the
/// edge set is the union of those lists, so a node can end up with more than
/// `k` edges. Ties are broken by ascending node index.
///
/// # Examples
///
/// ```
/// use aprender_geodesic::graph::NeighborGraphBuilder;
/// use aprender_geodesic::metric::DistanceMetric;
/// use aprender_geodesic::primitives::ReferenceCorpus;
///
/// let corpus = ReferenceCorpus::from_rows(&[
///     vec![0.0, 0.0],
///     vec![1.0, 0.0],
///     vec![2.0, 0.0],
/// ]).unwrap();
///
/// let graph = NeighborGraphBuilder::new(1)
///     .with_metric(DistanceMetric::Euclidean)
///     .build(&corpus)
///     .unwrap();
/// assert_eq!(graph.graph().num_edges(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborGraphBuilder {
    k: usize,
    metric: DistanceMetric,
    search: NeighborSearch,
}

impl NeighborGraphBuilder {
    /// Create a builder for `k` neighbors per node.
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self {
            k,
            metric: DistanceMetric::Euclidean,
            search: NeighborSearch::Exact,
        }
    }

    /// Set the distance metric.
    #[must_use]
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Set the neighbor search strategy.
    #[must_use]
    pub fn with_search(mut self, search: NeighborSearch) -> Self {
        self.search = search;
        self
    }

    /// Requested neighbor count.
    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Distance metric.
    #[must_use]
    pub fn metric(&self) -> &DistanceMetric {
        &self.metric
    }

    /// Neighbor search strategy.
    #[must_use]
    pub fn search(&self) -> &NeighborSearch {
        &self.search
    }

    /// Build the corpus graph.
    ///
    /// `k` is clamped to the total node count minus one, where the total
    /// counts the two auxiliary nodes attached later.
    ///
    /// # Errors
    /// - `InvalidNeighborCount` if `k == 0`
    /// - `EmptyCorpus` if the corpus has no points
    /// - `InvalidConfig` / `ShapeMismatch` for unusable metric or search parameters
    pub fn build(&self, corpus: &ReferenceCorpus) -> Result<CorpusGraph> {
        if self.k == 0 {
            return Err(GeodesicError::InvalidNeighborCount { k: self.k });
        }
        let Some(dim) = corpus.dim() else {
            return Err(GeodesicError::EmptyCorpus);
        };
        self.metric.validate()?;
        self.search.validate()?;
        if let DistanceMetric::Standardized { inv_scale } = &self.metric {
            if inv_scale.len() != dim {
                return Err(GeodesicError::dimension_mismatch(
                    "standardized metric",
                    dim,
                    inv_scale.len(),
                ));
            }
        }

        let points = corpus.points();
        let n = points.len();
        // Total node count is n + 2 (baseline and input)
        let k = self.k.min(n + 1);

        let rows = match &self.search {
            NeighborSearch::Exact => exact_rows(points, &self.metric, k),
            NeighborSearch::RandomProjection {
                seed,
                n_projections,
                window,
            } => {
                let candidates =
                    projection_candidates(points, *seed, *n_projections, *window, k.min(n - 1));
                candidate_rows(points, &self.metric, k, &candidates)
            }
        };

        // Rows are shorter than k only when the corpus itself has fewer than
        // k other points; such a node would also pick auxiliary nodes in an
        // all-nodes construction.
        let radius: Vec<f64> = rows
            .iter()
            .map(|row| match row.last() {
                Some(&(_, d)) if row.len() == k => d,
                _ => f64::INFINITY,
            })
            .collect();

        let edges: Vec<(NodeId, NodeId, f64)> = rows
            .iter()
            .enumerate()
            .flat_map(|(i, row)| row.iter().map(move |&(j, d)| (i, j, d)))
            .collect();
        let graph = NeighborGraph::from_weighted_edges(n, &edges)?;

        tracing::debug!(
            nodes = n,
            edges = graph.num_edges(),
            k,
            metric = self.metric.name(),
            search = ?self.search,
            "built corpus neighbor graph"
        );

        Ok(CorpusGraph {
            graph,
            points: points.to_vec(),
            radius,
            dim,
            k,
            requested_k: self.k,
            metric: self.metric.clone(),
            search: self.search.clone(),
            corpus_fingerprint: corpus.fingerprint(),
        })
    }
}

/// Immutable k-NN graph over a corpus, ready to have a baseline and an
/// input attached with [`CorpusGraph::attach`].
///
/// Holds its own copy of the corpus points so it can be cached and shared
/// independently of the caller's corpus.
#[derive(Debug, Clone)]
pub struct CorpusGraph {
    pub(super) graph: NeighborGraph,
    pub(super) points: Vec<FeatureVector>,
    /// Distance to the k-th corpus neighbor, `INFINITY` if the node has fewer
    /// than k corpus candidates
    pub(super) radius: Vec<f64>,
    pub(super) dim: usize,
    pub(super) k: usize,
    requested_k: usize,
    pub(super) metric: DistanceMetric,
    search: NeighborSearch,
    corpus_fingerprint: u64,
}

impl CorpusGraph {
    /// Underlying CSR graph over corpus nodes.
    #[must_use]
    pub fn graph(&self) -> &NeighborGraph {
        &self.graph
    }

    /// Number of corpus points.
    #[must_use]
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Corpus point for node `idx`.
    #[must_use]
    pub fn point(&self, idx: NodeId) -> Option<&FeatureVector> {
        self.points.get(idx)
    }

    /// Feature dimension.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Effective (clamped) neighbor count.
    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Neighbor count as requested before clamping.
    #[must_use]
    pub fn requested_k(&self) -> usize {
        self.requested_k
    }

    /// Distance metric used for edge weights.
    #[must_use]
    pub fn metric(&self) -> &DistanceMetric {
        &self.metric
    }

    /// Neighbor search strategy used.
    #[must_use]
    pub fn search(&self) -> &NeighborSearch {
        &self.search
    }

    /// Fingerprint of the corpus the graph was built from.
    #[must_use]
    pub fn corpus_fingerprint(&self) -> u64 {
        self.corpus_fingerprint
    }

    /// k-NN radius of corpus node `idx`.
    #[must_use]
    pub fn radius(&self, idx: NodeId) -> Option<f64> {
        self.radius.get(idx).copied()
    }
}

fn by_distance_then_id(a: &(NodeId, f64), b: &(NodeId, f64)) -> Ordering {
    a.1.total_cmp(&b.1).then(a.0.cmp(&b.0))
}

/// Keep the `k` nearest candidates, sorted by (distance, id).
pub(super) fn select_nearest(mut candidates: Vec<(NodeId, f64)>, k: usize) -> Vec<(NodeId, f64)> {
    if k == 0 {
        return Vec::new();
    }
    if candidates.len() > k {
        candidates.select_nth_unstable_by(k - 1, by_distance_then_id);
        candidates.truncate(k);
    }
    candidates.sort_by(by_distance_then_id);
    candidates
}

fn exact_rows(points: &[FeatureVector], metric: &DistanceMetric, k: usize) -> Vec<Vec<(NodeId, f64)>> {
    let n = points.len();
    let row = |i: NodeId| {
        let candidates = (0..n)
            .filter(|&j| j != i)
            .map(|j| (j, metric.distance_unchecked(points[i].as_slice(), points[j].as_slice())))
            .collect();
        select_nearest(candidates, k)
    };

    #[cfg(feature = "parallel")]
    let rows = (0..n).into_par_iter().map(row).collect();
    #[cfg(not(feature = "parallel"))]
    let rows = (0..n).map(row).collect();
    rows
}

fn candidate_rows(
    points: &[FeatureVector],
    metric: &DistanceMetric,
    k: usize,
    candidates: &[Vec<NodeId>],
) -> Vec<Vec<(NodeId, f64)>> {
    let row = |i: NodeId| {
        let scored = candidates[i]
            .iter()
            .map(|&j| (j, metric.distance_unchecked(points[i].as_slice(), points[j].as_slice())))
            .collect();
        select_nearest(scored, k)
    };

    #[cfg(feature = "parallel")]
    let rows = (0..points.len()).into_par_iter().map(row).collect();
    #[cfg(not(feature = "parallel"))]
    let rows = (0..points.len()).map(row).collect();
    rows
}

/// Candidate neighbor ids per node from seeded random projections.
///
/// Every node ends up with at least `min_candidates` candidates: a node
/// whose window union is smaller keeps widening its window along the
/// projections until it has enough.
fn projection_candidates(
    points: &[FeatureVector],
    seed: u64,
    n_projections: usize,
    window: usize,
    min_candidates: usize,
) -> Vec<Vec<NodeId>> {
    let n = points.len();
    let dim = points.first().map_or(0, FeatureVector::len);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut candidates: Vec<Vec<NodeId>> = vec![Vec::new(); n];
    let mut orders: Vec<Vec<NodeId>> = Vec::with_capacity(n_projections);

    for _ in 0..n_projections {
        let direction: Vec<f64> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let projected: Vec<f64> = points
            .iter()
            .map(|p| p.iter().zip(&direction).map(|(x, d)| x * d).sum())
            .collect();
        let mut order: Vec<NodeId> = (0..n).collect();
        order.sort_by(|&a, &b| projected[a].total_cmp(&projected[b]).then(a.cmp(&b)));

        for (pos, &node) in order.iter().enumerate() {
            let lo = pos.saturating_sub(window);
            let hi = (pos + window + 1).min(n);
            candidates[node].extend(order[lo..hi].iter().copied().filter(|&other| other != node));
        }
        orders.push(order);
    }

    for list in &mut candidates {
        list.sort_unstable();
        list.dedup();
    }

    let positions: Vec<Vec<usize>> = orders
        .iter()
        .map(|order| {
            let mut pos = vec![0; n];
            for (i, &node) in order.iter().enumerate() {
                pos[node] = i;
            }
            pos
        })
        .collect();

    for (node, list) in candidates.iter_mut().enumerate() {
        let mut reach = window;
        while list.len() < min_candidates && reach < n {
            reach += 1;
            for (order, pos) in orders.iter().zip(&positions) {
                let p = pos[node];
                let sides = [p.checked_sub(reach), Some(p + reach).filter(|&q| q < n)];
                for q in sides.into_iter().flatten() {
                    let other = order[q];
                    if let Err(at) = list.binary_search(&other) {
                        list.insert(at, other);
                    }
                }
            }
        }
    }
    candidates
}
