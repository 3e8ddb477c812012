//! Equal arc-length resampling of paths.

use serde::{Deserialize, Serialize};

use super::{check_dims, check_point_count, GeodesicPath};
use crate::cancel::{self, CancellationToken};
use crate::error::{GeodesicError, Result};
use crate::metric::DistanceMetric;
use crate::primitives::FeatureVector;

/// Resamples a [`GeodesicPath`] into `n_steps` points spaced uniformly by
/// arc length.
///
/// Sample `j` sits at arc length `L * j / (n_steps - 1)`, where `L` is the
/// path length under the metric, and is obtained by linear interpolation
/// inside the bracketing segment. The first sample is exactly the baseline
/// and the last exactly the input.
///
/// # Examples
///
/// ```
/// use aprender_geodesic::metric::DistanceMetric;
/// use aprender_geodesic::path::{GeodesicPath, PathDiscretizer};
/// use aprender_geodesic::primitives::FeatureVector;
///
/// let path = GeodesicPath::straight_line(
///     &FeatureVector::from_slice(&[0.0]),
///     &FeatureVector::from_slice(&[1.0]),
///     &DistanceMetric::Euclidean,
/// )
/// .unwrap();
/// let samples = PathDiscretizer::new(5).discretize(&path).unwrap();
/// let xs: Vec<f64> = samples.points().iter().map(|p| p[0]).collect();
/// assert_eq!(xs, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
/// ```
#[derive(Debug, Clone)]
pub struct PathDiscretizer {
    n_steps: usize,
    metric: DistanceMetric,
}

impl PathDiscretizer {
    /// Discretizer producing `n_steps` points under the Euclidean metric.
    #[must_use]
    pub fn new(n_steps: usize) -> Self {
        Self {
            n_steps,
            metric: DistanceMetric::Euclidean,
        }
    }

    /// Measure arc length with `metric` (should match the graph's metric).
    #[must_use]
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Number of output points.
    #[must_use]
    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    /// Resample `path`.
    ///
    /// # Errors
    /// `InvalidStepCount` if `n_steps < 2`.
    pub fn discretize(&self, path: &GeodesicPath) -> Result<DiscretizedPath> {
        self.discretize_with_cancel(path, None)
    }

    /// Resample `path`, checking `token` between sample points.
    ///
    /// # Errors
    /// `InvalidStepCount` if `n_steps < 2`, `Cancelled` if the token fires.
    pub fn discretize_with_cancel(
        &self,
        path: &GeodesicPath,
        token: Option<&CancellationToken>,
    ) -> Result<DiscretizedPath> {
        if self.n_steps < 2 {
            return Err(GeodesicError::InvalidStepCount {
                n_steps: self.n_steps,
            });
        }
        let nodes = path.points();
        check_point_count(nodes.len())?;
        check_dims(nodes)?;

        let mut cumulative = Vec::with_capacity(nodes.len());
        cumulative.push(0.0);
        let mut total = 0.0;
        for pair in nodes.windows(2) {
            total += self.metric.distance(&pair[0], &pair[1])?;
            cumulative.push(total);
        }

        let mut points = Vec::with_capacity(self.n_steps);
        points.push(path.start().clone());
        let denom = (self.n_steps - 1) as f64;

        if nodes.len() == 2 && total > 0.0 {
            // Single segment: arc length is linear in t for every metric
            for j in 1..self.n_steps - 1 {
                cancel::check(token)?;
                points.push(nodes[0].lerp(&nodes[1], j as f64 / denom));
            }
        } else if total > 0.0 {
            let last_segment = nodes.len() - 2;
            let mut seg = 0;
            for j in 1..self.n_steps - 1 {
                cancel::check(token)?;
                let target = total * (j as f64) / denom;
                // Advance past segments ending before the target; this also
                // skips zero-length segments
                while seg < last_segment && cumulative[seg + 1] < target {
                    seg += 1;
                }
                let seg_len = cumulative[seg + 1] - cumulative[seg];
                let t = if seg_len > 0.0 {
                    ((target - cumulative[seg]) / seg_len).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                points.push(nodes[seg].lerp(&nodes[seg + 1], t));
            }
        } else {
            // Zero-length path: every point coincides with the baseline
            for _ in 1..self.n_steps - 1 {
                cancel::check(token)?;
                points.push(path.start().clone());
            }
        }
        cancel::check(token)?;
        points.push(path.end().clone());

        Ok(DiscretizedPath {
            points,
            arc_length: total,
        })
    }
}

/// Exactly `n_steps` points from baseline to input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDiscretizedPath")]
pub struct DiscretizedPath {
    points: Vec<FeatureVector>,
    arc_length: f64,
}

#[derive(Deserialize)]
struct RawDiscretizedPath {
    points: Vec<FeatureVector>,
    arc_length: f64,
}

impl TryFrom<RawDiscretizedPath> for DiscretizedPath {
    type Error = GeodesicError;

    fn try_from(raw: RawDiscretizedPath) -> Result<Self> {
        if raw.points.len() < 2 {
            return Err(GeodesicError::InvalidStepCount {
                n_steps: raw.points.len(),
            });
        }
        check_dims(&raw.points)?;
        Ok(Self {
            points: raw.points,
            arc_length: raw.arc_length,
        })
    }
}

impl DiscretizedPath {
    /// Sample points, baseline first.
    #[must_use]
    pub fn points(&self) -> &[FeatureVector] {
        &self.points
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false for paths produced by [`PathDiscretizer`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Arc length of the source path.
    #[must_use]
    pub fn arc_length(&self) -> f64 {
        self.arc_length
    }

    /// Dimension of the sample points.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.points.first().map_or(0, FeatureVector::len)
    }

    /// Consume into the sample points.
    #[must_use]
    pub fn into_points(self) -> Vec<FeatureVector> {
        self.points
    }
}
