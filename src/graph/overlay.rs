//! Per-request overlay attaching baseline and input to a corpus graph.

use std::collections::BTreeMap;

use super::builder::select_nearest;
use super::{CorpusGraph, NodeId, WeightedAdjacency};
use crate::error::{GeodesicError, Result};
use crate::primitives::FeatureVector;

/// Corpus graph plus the baseline and input as auxiliary nodes.
///
/// Node ids `0..n` are corpus points, `n` is the baseline and `n + 1` the
/// input. The shared [`CorpusGraph`] is only borrowed; all request-specific
/// edges live in the overlay.
///
/// Auxiliary nodes link to their `k` nearest nodes among the corpus and the
/// other auxiliary node. A corpus node also links to an auxiliary node that
/// falls within its own k-NN radius.
#[derive(Debug, Clone)]
pub struct RequestGraph<'g> {
    corpus: &'g CorpusGraph,
    baseline: FeatureVector,
    input: FeatureVector,
    /// Sorted adjacency of baseline (`[0]`) and input (`[1]`)
    aux_edges: [Vec<(NodeId, f64)>; 2],
    /// Extra corpus-to-auxiliary edges, keyed by corpus node
    corpus_extra: BTreeMap<NodeId, Vec<(NodeId, f64)>>,
    n_extra_edges: usize,
}

impl CorpusGraph {
    /// Attach a baseline and an input to this graph for one request.
    ///
    /// # Errors
    /// `ShapeMismatch` if either point's dimension differs from the corpus,
    /// `InvalidConfig` if either contains non-finite values.
    pub fn attach(&self, baseline: &FeatureVector, input: &FeatureVector) -> Result<RequestGraph<'_>> {
        baseline.check_dim("baseline", self.dim)?;
        input.check_dim("input", self.dim)?;
        for (name, point) in [("baseline", baseline), ("input", input)] {
            if !point.is_finite() {
                return Err(GeodesicError::invalid_config(
                    name,
                    "non-finite values",
                    "finite features",
                ));
            }
        }

        let n = self.points.len();
        let aux_points = [baseline, input];
        let mut edges: BTreeMap<(NodeId, NodeId), f64> = BTreeMap::new();

        for (slot, point) in aux_points.iter().enumerate() {
            let node = n + slot;
            let other = n + (1 - slot);

            let to_corpus: Vec<f64> = self
                .points
                .iter()
                .map(|p| self.metric.distance_unchecked(point.as_slice(), p.as_slice()))
                .collect();

            let mut candidates: Vec<(NodeId, f64)> = to_corpus.iter().copied().enumerate().collect();
            candidates.push((
                other,
                self.metric
                    .distance_unchecked(point.as_slice(), aux_points[1 - slot].as_slice()),
            ));

            for (neighbor, d) in select_nearest(candidates, self.k) {
                edges.entry((node.min(neighbor), node.max(neighbor))).or_insert(d);
            }

            // Corpus nodes that would have selected this auxiliary node
            for (j, &d) in to_corpus.iter().enumerate() {
                if d <= self.radius[j] {
                    edges.entry((j, node)).or_insert(d);
                }
            }
        }

        let mut aux_edges: [Vec<(NodeId, f64)>; 2] = [Vec::new(), Vec::new()];
        let mut corpus_extra: BTreeMap<NodeId, Vec<(NodeId, f64)>> = BTreeMap::new();
        for (&(u, v), &w) in &edges {
            for (from, to) in [(u, v), (v, u)] {
                if from >= n {
                    aux_edges[from - n].push((to, w));
                } else {
                    corpus_extra.entry(from).or_default().push((to, w));
                }
            }
        }
        for list in aux_edges.iter_mut().chain(corpus_extra.values_mut()) {
            list.sort_by_key(|&(id, _)| id);
        }

        tracing::debug!(
            corpus_nodes = n,
            baseline_degree = aux_edges[0].len(),
            input_degree = aux_edges[1].len(),
            extra_edges = edges.len(),
            "attached baseline and input"
        );

        Ok(RequestGraph {
            corpus: self,
            baseline: baseline.clone(),
            input: input.clone(),
            aux_edges,
            corpus_extra,
            n_extra_edges: edges.len(),
        })
    }
}

impl<'g> RequestGraph<'g> {
    /// Shared corpus graph.
    #[must_use]
    pub fn corpus(&self) -> &'g CorpusGraph {
        self.corpus
    }

    /// Node id of the baseline.
    #[must_use]
    pub fn baseline_node(&self) -> NodeId {
        self.corpus.num_points()
    }

    /// Node id of the input.
    #[must_use]
    pub fn input_node(&self) -> NodeId {
        self.corpus.num_points() + 1
    }

    /// Feature vector for any node id.
    #[must_use]
    pub fn point(&self, node: NodeId) -> Option<&FeatureVector> {
        let n = self.corpus.num_points();
        match node {
            _ if node < n => self.corpus.point(node),
            _ if node == n => Some(&self.baseline),
            _ if node == n + 1 => Some(&self.input),
            _ => None,
        }
    }

    /// Adjacency of an auxiliary node (baseline or input).
    #[must_use]
    pub fn aux_neighbors(&self, node: NodeId) -> &[(NodeId, f64)] {
        let n = self.corpus.num_points();
        if node == n || node == n + 1 {
            &self.aux_edges[node - n]
        } else {
            &[]
        }
    }

    /// True if baseline and input share an edge.
    #[must_use]
    pub fn has_direct_edge(&self) -> bool {
        let input = self.input_node();
        self.aux_edges[0].iter().any(|&(id, _)| id == input)
    }

    /// Total number of undirected edges, corpus plus overlay.
    #[must_use]
    pub fn num_edges(&self) -> usize {
        self.corpus.graph.num_edges() + self.n_extra_edges
    }
}

impl WeightedAdjacency for RequestGraph<'_> {
    fn num_nodes(&self) -> usize {
        self.corpus.num_points() + 2
    }

    fn for_each_neighbor<F: FnMut(NodeId, f64)>(&self, node: NodeId, mut f: F) {
        let n = self.corpus.num_points();
        if node < n {
            self.corpus.graph.for_each_neighbor(node, &mut f);
            if let Some(extra) = self.corpus_extra.get(&node) {
                for &(neighbor, w) in extra {
                    f(neighbor, w);
                }
            }
        } else {
            for &(neighbor, w) in self.aux_neighbors(node) {
                f(neighbor, w);
            }
        }
    }
}
