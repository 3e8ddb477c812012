//! Configuration for geodesic attribution requests.

use serde::{Deserialize, Serialize};

use crate::error::{GeodesicError, Result};
use crate::graph::NeighborSearch;
use crate::integrate::QuadratureRule;
use crate::metric::DistanceMetric;
use crate::path::PathRefinement;

/// How attributions from several baselines are combined.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum BaselineAggregation {
    /// Equal weights
    #[default]
    Mean,
    /// Caller weights, one per baseline; normalized to sum to one
    Weighted(Vec<f64>),
}

impl BaselineAggregation {
    /// Normalized weights for `n_baselines` baselines.
    ///
    /// # Errors
    /// `InvalidConfig` if the weight count differs from `n_baselines`, a
    /// weight is negative or non-finite, or the weights do not have a finite
    /// positive sum.
    pub fn weights(&self, n_baselines: usize) -> Result<Vec<f64>> {
        match self {
            Self::Mean => Ok(vec![1.0 / n_baselines as f64; n_baselines]),
            Self::Weighted(weights) => {
                if weights.len() != n_baselines {
                    return Err(GeodesicError::invalid_config(
                        "baseline weights",
                        format!("{} weights", weights.len()),
                        format!("one weight per baseline ({n_baselines})"),
                    ));
                }
                Self::check_weights(weights)?;
                let total: f64 = weights.iter().sum();
                Ok(weights.iter().map(|w| w / total).collect())
            }
        }
    }

    fn check_weights(weights: &[f64]) -> Result<()> {
        if weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
            return Err(GeodesicError::invalid_config(
                "baseline weights",
                format!("{weights:?}"),
                "finite non-negative weights",
            ));
        }
        let total: f64 = weights.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(GeodesicError::invalid_config(
                "baseline weights",
                format!("{weights:?}"),
                "a finite positive sum",
            ));
        }
        Ok(())
    }
}

/// What to do when the input is unreachable from a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NoPathPolicy {
    /// Fail the request with `NoPath`
    #[default]
    Fail,
    /// Integrate along the straight line instead and mark the baseline's
    /// path as a fallback
    StraightLine,
}

/// Options for an attribution request.
///
/// # Examples
///
/// ```
/// use aprender_geodesic::config::{GeodesicConfig, NoPathPolicy};
/// use aprender_geodesic::metric::DistanceMetric;
///
/// let config = GeodesicConfig::new()
///     .with_k(8)
///     .with_n_steps(64)
///     .with_metric(DistanceMetric::Manhattan)
///     .with_no_path_policy(NoPathPolicy::StraightLine);
/// assert!(config.validate().is_ok());
/// assert!(GeodesicConfig::new().with_k(0).validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeodesicConfig {
    /// Neighbors per node in the k-NN graph
    pub k: usize,
    /// Points in the discretized path
    pub n_steps: usize,
    /// Edge weight and arc-length metric
    pub metric: DistanceMetric,
    /// Multi-baseline combination
    pub aggregation: BaselineAggregation,
    /// Representative point per path segment
    pub quadrature: QuadratureRule,
    /// Neighbor search strategy
    pub neighbor_search: NeighborSearch,
    /// Disconnected-graph behavior
    pub no_path: NoPathPolicy,
    /// Completeness tolerance for [`is_complete`](crate::engine::ExplanationResult::is_complete)
    pub tolerance: f64,
    /// Keep discretized paths in the result
    pub record_paths: bool,
    /// Energy-descent refinement between discretization and integration
    pub refinement: Option<PathRefinement>,
}

impl GeodesicConfig {
    /// Default neighbor count.
    pub const DEFAULT_K: usize = 20;
    /// Default path resolution.
    pub const DEFAULT_N_STEPS: usize = 50;
    /// Default completeness tolerance.
    pub const DEFAULT_TOLERANCE: f64 = 1e-3;

    /// Configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set neighbor count.
    #[must_use]
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Set path resolution.
    #[must_use]
    pub fn with_n_steps(mut self, n_steps: usize) -> Self {
        self.n_steps = n_steps;
        self
    }

    /// Set the distance metric.
    #[must_use]
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Set baseline aggregation.
    #[must_use]
    pub fn with_aggregation(mut self, aggregation: BaselineAggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Set the quadrature rule.
    #[must_use]
    pub fn with_quadrature(mut self, quadrature: QuadratureRule) -> Self {
        self.quadrature = quadrature;
        self
    }

    /// Set the neighbor search strategy.
    #[must_use]
    pub fn with_neighbor_search(mut self, search: NeighborSearch) -> Self {
        self.neighbor_search = search;
        self
    }

    /// Set the no-path policy.
    #[must_use]
    pub fn with_no_path_policy(mut self, policy: NoPathPolicy) -> Self {
        self.no_path = policy;
        self
    }

    /// Set completeness tolerance.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Keep discretized paths in the result.
    #[must_use]
    pub fn with_record_paths(mut self, record: bool) -> Self {
        self.record_paths = record;
        self
    }

    /// Refine each discretized path before integrating it.
    #[must_use]
    pub fn with_refinement(mut self, refinement: PathRefinement) -> Self {
        self.refinement = Some(refinement);
        self
    }

    /// Validate configuration.
    ///
    /// Weight counts are checked against the baselines at request time.
    ///
    /// # Errors
    /// `InvalidNeighborCount`, `InvalidStepCount` or `InvalidConfig`.
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(GeodesicError::InvalidNeighborCount { k: self.k });
        }
        if self.n_steps < 2 {
            return Err(GeodesicError::InvalidStepCount {
                n_steps: self.n_steps,
            });
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(GeodesicError::invalid_config(
                "tolerance",
                self.tolerance,
                "finite non-negative tolerance",
            ));
        }
        self.metric.validate()?;
        self.neighbor_search.validate()?;
        if let BaselineAggregation::Weighted(weights) = &self.aggregation {
            BaselineAggregation::check_weights(weights)?;
        }
        if let Some(refinement) = &self.refinement {
            refinement.validate()?;
        }
        Ok(())
    }
}

impl Default for GeodesicConfig {
    fn default() -> Self {
        Self {
            k: Self::DEFAULT_K,
            n_steps: Self::DEFAULT_N_STEPS,
            metric: DistanceMetric::Euclidean,
            aggregation: BaselineAggregation::Mean,
            quadrature: QuadratureRule::Midpoint,
            neighbor_search: NeighborSearch::Exact,
            no_path: NoPathPolicy::Fail,
            tolerance: Self::DEFAULT_TOLERANCE,
            record_paths: false,
            refinement: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GeodesicConfig::default();
        assert_eq!(config.k, 20);
        assert_eq!(config.n_steps, 50);
        assert_eq!(config.tolerance, 1e-3);
        assert_eq!(config.quadrature, QuadratureRule::Midpoint);
        assert_eq!(config.no_path, NoPathPolicy::Fail);
        assert!(!config.record_paths);
        assert!(config.refinement.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(matches!(
            GeodesicConfig::new().with_k(0).validate(),
            Err(GeodesicError::InvalidNeighborCount { k: 0 })
        ));
        assert!(matches!(
            GeodesicConfig::new().with_n_steps(1).validate(),
            Err(GeodesicError::InvalidStepCount { n_steps: 1 })
        ));
        assert!(GeodesicConfig::new().with_tolerance(-1.0).validate().is_err());
        assert!(GeodesicConfig::new()
            .with_metric(DistanceMetric::Minkowski(0.5))
            .validate()
            .is_err());
        assert!(GeodesicConfig::new()
            .with_aggregation(BaselineAggregation::Weighted(vec![0.0, 0.0]))
            .validate()
            .is_err());
    }

    #[test]
    fn test_validate_checks_refinement() {
        let config = GeodesicConfig::new().with_refinement(PathRefinement::new().with_learning_rate(0.0));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("refinement.learning_rate"));
        assert!(GeodesicConfig::new()
            .with_refinement(PathRefinement::new())
            .validate()
            .is_ok());

        let parsed: GeodesicConfig =
            serde_json::from_str(r#"{"refinement": {"beta": 0.5}}"#).expect("parse");
        let refinement = parsed.refinement.expect("refinement");
        assert_eq!(refinement.beta, 0.5);
        assert_eq!(refinement.num_iterations, PathRefinement::default().num_iterations);
    }

    #[test]
    fn test_weights_normalized() {
        let w = BaselineAggregation::Weighted(vec![1.0, 3.0])
            .weights(2)
            .expect("weights");
        assert_eq!(w, vec![0.25, 0.75]);
        assert_eq!(BaselineAggregation::Mean.weights(4).expect("weights"), vec![0.25; 4]);
    }

    #[test]
    fn test_weights_count_mismatch() {
        let err = BaselineAggregation::Weighted(vec![1.0]).weights(2).unwrap_err();
        assert!(matches!(err, GeodesicError::InvalidConfig { .. }));
        assert!(BaselineAggregation::Weighted(vec![1.0, f64::NAN]).weights(2).is_err());
    }

    #[test]
    fn test_weights_reject_overflowing_sum() {
        let err = BaselineAggregation::Weighted(vec![1e308, 1e308])
            .weights(2)
            .unwrap_err();
        assert!(err.to_string().contains("finite positive sum"));
        assert!(GeodesicConfig::new()
            .with_aggregation(BaselineAggregation::Weighted(vec![1e308, 1e308]))
            .validate()
            .is_err());
    }

    #[test]
    fn test_serde_roundtrip_with_partial_input() {
        let config: GeodesicConfig =
            serde_json::from_str(r#"{"k": 5, "metric": "Manhattan"}"#).expect("parse");
        assert_eq!(config.k, 5);
        assert_eq!(config.metric, DistanceMetric::Manhattan);
        assert_eq!(config.n_steps, GeodesicConfig::DEFAULT_N_STEPS);

        let json = serde_json::to_string(&config).expect("serialize");
        let back: GeodesicConfig = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, config);
    }
}
