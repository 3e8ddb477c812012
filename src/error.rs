//! Error types for geodesic attribution.
//!
//! Every failure in the pipeline surfaces as a [`GeodesicError`]. Failures
//! inside a per-baseline pipeline are wrapped in [`GeodesicError::Baseline`]
//! so the caller can see which baseline and which [`Stage`] failed.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error reported by a [`Model`](crate::model::Model) implementation.
pub type ModelError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Pipeline stage, attached to per-baseline failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Neighbor graph construction (or attaching baseline/input to a cached graph)
    GraphConstruction,
    /// Shortest-path search
    PathFinding,
    /// Arc-length resampling
    Discretization,
    /// Optional energy-descent refinement of the resampled path
    Refinement,
    /// Gradient quadrature
    Integration,
    /// Model evaluation for the completeness diagnostic
    Evaluation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GraphConstruction => write!(f, "graph construction"),
            Self::PathFinding => write!(f, "path finding"),
            Self::Discretization => write!(f, "discretization"),
            Self::Refinement => write!(f, "path refinement"),
            Self::Integration => write!(f, "integration"),
            Self::Evaluation => write!(f, "evaluation"),
        }
    }
}

/// Main error type for geodesic attribution.
///
/// # Examples
///
/// ```
/// use aprender_geodesic::error::GeodesicError;
///
/// let err = GeodesicError::dimension_mismatch("baseline", 3, 2);
/// assert!(err.to_string().contains("dimension mismatch"));
/// ```
#[derive(Debug, Error)]
pub enum GeodesicError {
    /// Dimension inconsistency among input, baselines, corpus or gradients.
    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Where the mismatch was detected
        context: String,
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },

    /// Reference corpus has no points.
    #[error("reference corpus is empty")]
    EmptyCorpus,

    /// Neighbor count must be at least one.
    #[error("invalid neighbor count k = {k}, expected k >= 1")]
    InvalidNeighborCount {
        /// Requested k
        k: usize,
    },

    /// Input is unreachable from the baseline in the neighbor graph.
    #[error(
        "no path from node {from} to node {to}: graph has {components} connected components \
         (increase k or opt into the straight-line fallback)"
    )]
    NoPath {
        /// Source node id
        from: usize,
        /// Target node id
        to: usize,
        /// Connected components of the request graph
        components: usize,
    },

    /// Discretization needs at least two points.
    #[error("invalid step count n_steps = {n_steps}, expected n_steps >= 2")]
    InvalidStepCount {
        /// Requested step count
        n_steps: usize,
    },

    /// Model failed to produce a gradient.
    #[error("gradient evaluation failed at step {step}: {source}")]
    GradientEvaluation {
        /// Integration step (index into the discretized path)
        step: usize,
        /// Error reported by the model
        #[source]
        source: ModelError,
    },

    /// Model failed to produce an output.
    #[error("model evaluation failed: {source}")]
    ModelEvaluation {
        /// Error reported by the model
        #[source]
        source: ModelError,
    },

    /// Request cancelled through its [`CancellationToken`](crate::cancel::CancellationToken).
    #[error("explanation cancelled")]
    Cancelled,

    /// Invalid configuration value.
    #[error("invalid configuration: {param} = {value}, expected {constraint}")]
    InvalidConfig {
        /// Parameter name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// Malformed graph (negative or non-finite weight, out-of-range node).
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// Failure inside the pipeline of one baseline.
    #[error("baseline {index} failed during {stage}: {source}")]
    Baseline {
        /// Index into the baseline list
        index: usize,
        /// Failing stage
        stage: Stage,
        /// Underlying error
        #[source]
        source: Box<GeodesicError>,
    },
}

impl GeodesicError {
    /// Create a dimension mismatch error with descriptive context
    #[must_use]
    pub fn dimension_mismatch(context: &str, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            context: context.to_string(),
            expected,
            actual,
        }
    }

    /// Create an invalid configuration error
    #[must_use]
    pub fn invalid_config(
        param: &str,
        value: impl fmt::Display,
        constraint: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            param: param.to_string(),
            value: value.to_string(),
            constraint: constraint.into(),
        }
    }

    /// Wrap an error with the baseline index and stage it occurred in.
    ///
    /// `Cancelled` applies to the whole request and is returned unwrapped.
    #[must_use]
    pub fn at_baseline(self, index: usize, stage: Stage) -> Self {
        if matches!(self, Self::Cancelled) {
            return self;
        }
        Self::Baseline {
            index,
            stage,
            source: Box::new(self),
        }
    }

    /// Innermost error, unwrapping any [`GeodesicError::Baseline`] layers.
    #[must_use]
    pub fn root(&self) -> &GeodesicError {
        match self {
            Self::Baseline { source, .. } => source.root(),
            other => other,
        }
    }

    /// True if the root cause is [`GeodesicError::NoPath`].
    #[must_use]
    pub fn is_no_path(&self) -> bool {
        matches!(self.root(), Self::NoPath { .. })
    }

    /// True if the root cause is [`GeodesicError::Cancelled`].
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled)
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, GeodesicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_message() {
        let err = GeodesicError::dimension_mismatch("corpus[3]", 4, 2);
        let msg = err.to_string();
        assert!(msg.contains("corpus[3]"));
        assert!(msg.contains("expected 4"));
        assert!(msg.contains("got 2"));
    }

    #[test]
    fn test_no_path_suggests_remedy() {
        let err = GeodesicError::NoPath {
            from: 10,
            to: 11,
            components: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("3 connected components"));
        assert!(msg.contains("increase k"));
        assert!(msg.contains("straight-line"));
    }

    #[test]
    fn test_baseline_wrapping_and_root() {
        let err = GeodesicError::NoPath {
            from: 0,
            to: 1,
            components: 2,
        }
        .at_baseline(2, Stage::PathFinding);
        assert!(err.is_no_path());
        assert!(!err.is_cancelled());
        assert!(err.to_string().contains("baseline 2 failed during path finding"));
        match &err {
            GeodesicError::Baseline { index, stage, .. } => {
                assert_eq!(*index, 2);
                assert_eq!(*stage, Stage::PathFinding);
            }
            other => panic!("expected Baseline wrapper, got {other:?}"),
        }
    }

    #[test]
    fn test_cancelled_is_not_wrapped() {
        let err = GeodesicError::Cancelled.at_baseline(0, Stage::Integration);
        assert!(matches!(err, GeodesicError::Cancelled));
    }

    #[test]
    fn test_gradient_error_keeps_source() {
        use std::error::Error;
        let err = GeodesicError::GradientEvaluation {
            step: 7,
            source: "kink at origin".into(),
        };
        assert!(err.to_string().contains("step 7"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_invalid_config_message() {
        let err = GeodesicError::invalid_config("weights", -1.0, "non-negative");
        assert_eq!(
            err.to_string(),
            "invalid configuration: weights = -1, expected non-negative"
        );
    }
}
