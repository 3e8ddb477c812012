//! Geodesic paths: shortest-path search and arc-length discretization.
//!
//! [`GeodesicPathFinder`] runs Dijkstra from the baseline node to the input
//! node of a [`RequestGraph`](crate::graph::RequestGraph) and yields a
//! [`GeodesicPath`]. [`PathDiscretizer`] resamples it into a
//! [`DiscretizedPath`] of exactly `n_steps` points at equal arc-length
//! spacing, which is what the gradient integrator walks. An optional
//! [`PathRefinement`] pass moves the interior samples before they are
//! re-spaced.

mod discretize;
mod finder;
mod refine;

pub use discretize::{DiscretizedPath, PathDiscretizer};
pub use finder::{shortest_path, GeodesicPathFinder};
pub use refine::{PathRefinement, RefinedPath, RefinementReport};

use serde::{Deserialize, Serialize};

use crate::error::{GeodesicError, Result};
use crate::graph::NodeId;
use crate::metric::DistanceMetric;
use crate::primitives::FeatureVector;

/// How a path was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathKind {
    /// Shortest path through the neighbor graph
    Geodesic,
    /// Direct baseline-to-input segment (classical integrated gradients)
    StraightLine,
    /// Direct segment used because no graph path existed and the caller
    /// opted into the fallback
    StraightLineFallback,
}

/// Ordered sequence of points from baseline to input.
///
/// Invariants: at least two points, the first is the baseline and the last
/// is the input, and all points share one dimension. Deserialization
/// enforces the same invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeodesicPath")]
pub struct GeodesicPath {
    points: Vec<FeatureVector>,
    /// Graph node ids, empty for paths not taken from a graph
    nodes: Vec<NodeId>,
    /// Sum of segment lengths (approximate geodesic distance)
    length: f64,
    kind: PathKind,
}

#[derive(Deserialize)]
struct RawGeodesicPath {
    points: Vec<FeatureVector>,
    nodes: Vec<NodeId>,
    length: f64,
    kind: PathKind,
}

impl TryFrom<RawGeodesicPath> for GeodesicPath {
    type Error = GeodesicError;

    fn try_from(raw: RawGeodesicPath) -> Result<Self> {
        check_point_count(raw.points.len())?;
        check_dims(&raw.points)?;
        if !raw.nodes.is_empty() && raw.nodes.len() != raw.points.len() {
            return Err(GeodesicError::dimension_mismatch(
                "path nodes",
                raw.points.len(),
                raw.nodes.len(),
            ));
        }
        if !(raw.length.is_finite() && raw.length >= 0.0) {
            return Err(GeodesicError::invalid_config(
                "path length",
                raw.length,
                "finite and non-negative",
            ));
        }
        Ok(Self {
            points: raw.points,
            nodes: raw.nodes,
            length: raw.length,
            kind: raw.kind,
        })
    }
}

fn check_point_count(n: usize) -> Result<()> {
    if n < 2 {
        return Err(GeodesicError::invalid_config(
            "path points",
            n,
            "at least 2 points",
        ));
    }
    Ok(())
}

/// Dimension shared by all `points` (0 when empty).
///
/// # Errors
/// `ShapeMismatch` naming the first point that differs from `points[0]`.
pub(crate) fn check_dims(points: &[FeatureVector]) -> Result<usize> {
    let dim = points.first().map_or(0, FeatureVector::len);
    for (i, point) in points.iter().enumerate() {
        point.check_dim(&format!("path[{i}]"), dim)?;
    }
    Ok(dim)
}

impl GeodesicPath {
    /// Path through explicit points, measuring length with `metric`.
    ///
    /// # Errors
    /// `InvalidConfig` for fewer than two points, `ShapeMismatch` for mixed
    /// dimensions.
    pub fn from_points(points: Vec<FeatureVector>, metric: &DistanceMetric) -> Result<Self> {
        check_point_count(points.len())?;
        check_dims(&points)?;
        let mut length = 0.0;
        for pair in points.windows(2) {
            length += metric.distance(&pair[0], &pair[1])?;
        }
        Ok(Self {
            points,
            nodes: Vec::new(),
            length,
            kind: PathKind::Geodesic,
        })
    }

    /// Direct segment from `baseline` to `input`.
    ///
    /// # Errors
    /// `ShapeMismatch` if the dimensions differ.
    pub fn straight_line(
        baseline: &FeatureVector,
        input: &FeatureVector,
        metric: &DistanceMetric,
    ) -> Result<Self> {
        let mut path = Self::from_points(vec![baseline.clone(), input.clone()], metric)?;
        path.kind = PathKind::StraightLine;
        Ok(path)
    }

    /// Mark a straight-line path as the no-path fallback.
    #[must_use]
    pub(crate) fn into_fallback(mut self) -> Self {
        self.kind = PathKind::StraightLineFallback;
        self
    }

    /// Same kind, new points (for example after refinement). Graph nodes
    /// are kept only when the point count is unchanged.
    ///
    /// # Errors
    /// As [`from_points`](Self::from_points).
    pub fn with_points(&self, points: Vec<FeatureVector>, metric: &DistanceMetric) -> Result<Self> {
        let mut path = Self::from_points(points, metric)?;
        path.kind = self.kind;
        path.nodes = if self.nodes.len() == path.points.len() {
            self.nodes.clone()
        } else {
            Vec::new()
        };
        Ok(path)
    }

    pub(crate) fn from_graph(points: Vec<FeatureVector>, nodes: Vec<NodeId>, length: f64) -> Self {
        Self {
            points,
            nodes,
            length,
            kind: PathKind::Geodesic,
        }
    }

    /// Path points, baseline first.
    #[must_use]
    pub fn points(&self) -> &[FeatureVector] {
        &self.points
    }

    /// Graph node ids along the path (empty if not from a graph).
    #[must_use]
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false; paths hold at least two points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Total length under the metric used to build the path.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.length
    }

    /// How the path was obtained.
    #[must_use]
    pub fn kind(&self) -> PathKind {
        self.kind
    }

    /// Baseline (first point).
    #[must_use]
    pub fn start(&self) -> &FeatureVector {
        &self.points[0]
    }

    /// Input (last point).
    #[must_use]
    pub fn end(&self) -> &FeatureVector {
        &self.points[self.points.len() - 1]
    }
}
