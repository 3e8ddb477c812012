//! Neighborhood graphs over the reference corpus, in cache-friendly CSR form.
//!
//! The corpus part of the graph ([`CorpusGraph`]) is built once and never
//! mutated, so it can be shared behind an `Arc` and cached across requests.
//! Baseline and input are attached per request by [`RequestGraph`], an
//! overlay that adds two auxiliary nodes without touching the shared graph.
//!
//! - CSR adjacency (`row_ptr` / `col_indices` / `edge_weights`)
//! - Symmetric union of k-NN lists, weights from a [`DistanceMetric`](crate::metric::DistanceMetric)
//! - Exact or seeded random-projection neighbor search
//! - Parallel distance computation with Rayon (`parallel` feature)
//!
//! # Examples
//!
//! ```
//! use aprender_geodesic::graph::NeighborGraph;
//!
//! let g = NeighborGraph::from_weighted_edges(3, &[(0, 1, 1.0), (1, 2, 2.5)]).unwrap();
//! assert_eq!(g.num_nodes(), 3);
//! assert_eq!(g.num_edges(), 2);
//! assert_eq!(g.neighbors(1), &[0, 2]);
//! ```

mod builder;
mod overlay;

pub use builder::{CorpusGraph, NeighborGraphBuilder, NeighborSearch};
pub use overlay::RequestGraph;

use crate::error::{GeodesicError, Result};

/// Graph node identifier (contiguous integers for cache efficiency).
pub type NodeId = usize;

/// Read access to a weighted adjacency structure.
///
/// Neighbors must be reported in a fixed order so that searches over the
/// graph are reproducible.
pub trait WeightedAdjacency {
    /// Number of nodes.
    fn num_nodes(&self) -> usize;

    /// Call `f(neighbor, weight)` for every edge incident to `node`.
    fn for_each_neighbor<F: FnMut(NodeId, f64)>(&self, node: NodeId, f: F);
}

/// Undirected weighted graph in Compressed Sparse Row format.
///
/// Neighbor lists are sorted by node id, so iteration order is fixed by
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborGraph {
    row_ptr: Vec<usize>,      // Offset into col_indices (length = n_nodes + 1)
    col_indices: Vec<NodeId>, // Flattened neighbor lists
    edge_weights: Vec<f64>,   // Parallel to col_indices
    n_nodes: usize,
    n_edges: usize,
}

impl NeighborGraph {
    /// Graph with `n_nodes` isolated nodes.
    #[must_use]
    pub fn empty(n_nodes: usize) -> Self {
        Self {
            row_ptr: vec![0; n_nodes + 1],
            col_indices: Vec::new(),
            edge_weights: Vec::new(),
            n_nodes,
            n_edges: 0,
        }
    }

    /// Build an undirected graph from `(u, v, weight)` triples.
    ///
    /// Each edge is inserted in both directions. Duplicate edges keep the
    /// weight of their first occurrence; self-loops are dropped.
    ///
    /// # Errors
    /// `InvalidGraph` if a node id is out of range or a weight is negative or
    /// non-finite.
    pub fn from_weighted_edges(n_nodes: usize, edges: &[(NodeId, NodeId, f64)]) -> Result<Self> {
        let mut adj_list: Vec<Vec<(NodeId, f64)>> = vec![Vec::new(); n_nodes];
        for &(source, target, weight) in edges {
            if source >= n_nodes || target >= n_nodes {
                return Err(GeodesicError::InvalidGraph(format!(
                    "edge ({source}, {target}) out of range for {n_nodes} nodes"
                )));
            }
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(GeodesicError::InvalidGraph(format!(
                    "edge ({source}, {target}) has weight {weight}, expected finite and non-negative"
                )));
            }
            if source == target {
                continue;
            }
            adj_list[source].push((target, weight));
            adj_list[target].push((source, weight));
        }

        // Stable sort keeps the first weight among duplicates
        for neighbors in &mut adj_list {
            neighbors.sort_by_key(|&(id, _)| id);
            neighbors.dedup_by_key(|&mut (id, _)| id);
        }

        let mut row_ptr = Vec::with_capacity(n_nodes + 1);
        let mut col_indices = Vec::new();
        let mut edge_weights = Vec::new();

        row_ptr.push(0);
        for neighbors in &adj_list {
            for &(neighbor, weight) in neighbors {
                col_indices.push(neighbor);
                edge_weights.push(weight);
            }
            row_ptr.push(col_indices.len());
        }

        let n_edges = col_indices.len() / 2;

        Ok(Self {
            row_ptr,
            col_indices,
            edge_weights,
            n_nodes,
            n_edges,
        })
    }

    /// Number of nodes.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.n_nodes
    }

    /// Number of undirected edges.
    #[must_use]
    pub fn num_edges(&self) -> usize {
        self.n_edges
    }

    /// Neighbors of `v` in ascending id order (empty if out of range).
    #[must_use]
    pub fn neighbors(&self, v: NodeId) -> &[NodeId] {
        if v >= self.n_nodes {
            return &[];
        }
        &self.col_indices[self.row_ptr[v]..self.row_ptr[v + 1]]
    }

    /// Edge weights parallel to [`neighbors`](Self::neighbors).
    #[must_use]
    pub fn neighbor_weights(&self, v: NodeId) -> &[f64] {
        if v >= self.n_nodes {
            return &[];
        }
        &self.edge_weights[self.row_ptr[v]..self.row_ptr[v + 1]]
    }

    /// Number of edges incident to `v`.
    #[must_use]
    pub fn degree(&self, v: NodeId) -> usize {
        self.neighbors(v).len()
    }

    /// Weight of edge `(source, target)`, if present.
    #[must_use]
    pub fn edge_weight(&self, source: NodeId, target: NodeId) -> Option<f64> {
        let neighbors = self.neighbors(source);
        let pos = neighbors.binary_search(&target).ok()?;
        Some(self.neighbor_weights(source)[pos])
    }
}

impl WeightedAdjacency for NeighborGraph {
    fn num_nodes(&self) -> usize {
        self.n_nodes
    }

    fn for_each_neighbor<F: FnMut(NodeId, f64)>(&self, node: NodeId, mut f: F) {
        for (&neighbor, &weight) in self.neighbors(node).iter().zip(self.neighbor_weights(node)) {
            f(neighbor, weight);
        }
    }
}

/// Component label for every node of `graph`.
///
/// Labels are numbered in order of the lowest node id they contain.
///
/// # Examples
/// ```
/// use aprender_geodesic::graph::{connected_components, NeighborGraph};
///
/// let g = NeighborGraph::from_weighted_edges(4, &[(0, 1, 1.0), (2, 3, 1.0)]).unwrap();
/// assert_eq!(connected_components(&g), vec![0, 0, 1, 1]);
/// ```
#[must_use]
pub fn connected_components<G: WeightedAdjacency>(graph: &G) -> Vec<usize> {
    const UNLABELED: usize = usize::MAX;
    let n = graph.num_nodes();
    let mut labels = vec![UNLABELED; n];
    let mut stack = Vec::new();
    let mut next = 0;

    for root in 0..n {
        if labels[root] != UNLABELED {
            continue;
        }
        labels[root] = next;
        stack.push(root);
        while let Some(node) = stack.pop() {
            graph.for_each_neighbor(node, |neighbor, _| {
                if labels[neighbor] == UNLABELED {
                    labels[neighbor] = next;
                    stack.push(neighbor);
                }
            });
        }
        next += 1;
    }
    labels
}

/// Number of connected components of `graph`.
#[must_use]
pub fn num_components<G: WeightedAdjacency>(graph: &G) -> usize {
    connected_components(graph)
        .into_iter()
        .max()
        .map_or(0, |max| max + 1)
}
