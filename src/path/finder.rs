//! Dijkstra shortest-path search over neighbor graphs.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::GeodesicPath;
use crate::error::{GeodesicError, Result};
use crate::graph::{num_components, NodeId, RequestGraph, WeightedAdjacency};

/// Finds the approximate geodesic between baseline and input.
///
/// # Examples
///
/// ```
/// use aprender_geodesic::graph::NeighborGraphBuilder;
/// use aprender_geodesic::path::GeodesicPathFinder;
/// use aprender_geodesic::primitives::{FeatureVector, ReferenceCorpus};
///
/// let corpus = ReferenceCorpus::from_rows(&[vec![1.0, 0.0], vec![2.0, 0.0]]).unwrap();
/// let graph = NeighborGraphBuilder::new(1).build(&corpus).unwrap();
/// let request = graph
///     .attach(&FeatureVector::from_slice(&[0.0, 0.0]), &FeatureVector::from_slice(&[3.0, 0.0]))
///     .unwrap();
///
/// let path = GeodesicPathFinder::new().find(&request).unwrap();
/// assert_eq!(path.nodes(), &[2, 0, 1, 3]);
/// assert_eq!(path.length(), 3.0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct GeodesicPathFinder;

impl GeodesicPathFinder {
    /// Create a path finder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Shortest path from the baseline node to the input node.
    ///
    /// # Errors
    /// `NoPath` if the input is unreachable from the baseline. The error
    /// carries the component count of the request graph.
    pub fn find(&self, graph: &RequestGraph<'_>) -> Result<GeodesicPath> {
        let from = graph.baseline_node();
        let to = graph.input_node();
        let Some((nodes, length)) = shortest_path(graph, from, to) else {
            let components = num_components(graph);
            tracing::debug!(from, to, components, "input unreachable from baseline");
            return Err(GeodesicError::NoPath {
                from,
                to,
                components,
            });
        };

        let points = nodes
            .iter()
            .map(|&node| {
                graph.point(node).cloned().ok_or_else(|| {
                    GeodesicError::InvalidGraph(format!("path node {node} has no point"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(nodes = nodes.len(), length, "found geodesic path");
        Ok(GeodesicPath::from_graph(points, nodes, length))
    }
}

/// Heap entry ordered by cost, then by insertion sequence (FIFO among ties).
#[derive(Copy, Clone, Debug)]
struct State {
    cost: f64,
    seq: u64,
    node: NodeId,
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for State {}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dijkstra's algorithm (1959) over any [`WeightedAdjacency`].
///
/// Terminates as soon as `target` is settled. Relaxation uses a strict `<`,
/// so among equal-cost paths the first one discovered wins; with the fixed
/// neighbor order of the graph and FIFO tie-breaking in the heap the result
/// is reproducible.
///
/// # Returns
/// * `Some((path, distance))` - node sequence from `source` to `target`
/// * `None` - `target` unreachable or either node out of range
///
/// # Complexity
/// * Time: O((n + m) log n)
/// * Space: O(n)
#[must_use]
pub fn shortest_path<G: WeightedAdjacency>(
    graph: &G,
    source: NodeId,
    target: NodeId,
) -> Option<(Vec<NodeId>, f64)> {
    let n = graph.num_nodes();
    if source >= n || target >= n {
        return None;
    }
    if source == target {
        return Some((vec![source], 0.0));
    }

    let mut distances = vec![f64::INFINITY; n];
    let mut predecessor: Vec<Option<NodeId>> = vec![None; n];
    let mut settled = vec![false; n];
    let mut heap = BinaryHeap::new();
    let mut seq = 0u64;

    distances[source] = 0.0;
    heap.push(State {
        cost: 0.0,
        seq,
        node: source,
    });

    while let Some(State { cost, node, .. }) = heap.pop() {
        if settled[node] {
            continue;
        }
        settled[node] = true;
        if node == target {
            break;
        }

        graph.for_each_neighbor(node, |neighbor, weight| {
            if settled[neighbor] {
                return;
            }
            let next_cost = cost + weight;
            if next_cost < distances[neighbor] {
                distances[neighbor] = next_cost;
                predecessor[neighbor] = Some(node);
                seq += 1;
                heap.push(State {
                    cost: next_cost,
                    seq,
                    node: neighbor,
                });
            }
        });
    }

    if !settled[target] {
        return None;
    }

    let mut path = Vec::new();
    let mut current = Some(target);
    while let Some(node) = current {
        path.push(node);
        current = predecessor[node];
    }
    path.reverse();
    Some((path, distances[target]))
}
