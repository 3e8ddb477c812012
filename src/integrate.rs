//! Path integration of model gradients.
//!
//! Given a discretized path `p_0, ..., p_{n-1}` from baseline to input, the
//! attribution is the Riemann sum
//!
//! ```text
//! A = Σ_i ∇f(r_i) ⊙ (p_{i+1} - p_i)
//! ```
//!
//! where `r_i` is the representative point of segment `i`, chosen by the
//! [`QuadratureRule`]. Along a straight path this is classical Integrated
//! Gradients.
//!
//! # References
//!
//! - Sundararajan, M., et al. (2017). Axiomatic Attribution for Deep Networks.
//! - Kapishnikov, A., et al. (2021). Guided Integrated Gradients.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cancel::{self, CancellationToken};
use crate::error::{GeodesicError, Result};
use crate::metric::DistanceMetric;
use crate::model::Model;
use crate::path::{check_dims, DiscretizedPath, GeodesicPath, PathDiscretizer};
use crate::primitives::FeatureVector;

/// Where the gradient of each path segment is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QuadratureRule {
    /// Segment midpoint; `n_steps - 1` gradient calls, exact for affine
    /// and quadratic models along straight segments
    #[default]
    Midpoint,
    /// Segment start point; `n_steps - 1` gradient calls
    Left,
    /// Average of the endpoint gradients; `n_steps` gradient calls
    Trapezoid,
}

impl QuadratureRule {
    /// Number of gradient evaluations for a path of `n_points` points.
    #[must_use]
    pub fn gradient_calls(self, n_points: usize) -> usize {
        match self {
            Self::Midpoint | Self::Left => n_points.saturating_sub(1),
            Self::Trapezoid => n_points,
        }
    }
}

/// Per-step contributions and their sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationOutcome {
    attribution: FeatureVector,
    contributions: Vec<FeatureVector>,
    gradient_evaluations: usize,
}

impl IntegrationOutcome {
    /// Attribution vector (sum of contributions).
    #[must_use]
    pub fn attribution(&self) -> &FeatureVector {
        &self.attribution
    }

    /// Contribution of each segment, in path order.
    #[must_use]
    pub fn contributions(&self) -> &[FeatureVector] {
        &self.contributions
    }

    /// Number of gradient calls made.
    #[must_use]
    pub fn gradient_evaluations(&self) -> usize {
        self.gradient_evaluations
    }

    /// Consume into the attribution vector.
    #[must_use]
    pub fn into_attribution(self) -> FeatureVector {
        self.attribution
    }
}

/// Integrates model gradients along a discretized path.
///
/// Gradients are evaluated in parallel under the `parallel` feature but
/// always collected in path order and summed sequentially, so the result is
/// bit-identical across thread counts.
///
/// # Examples
///
/// ```
/// use aprender_geodesic::integrate::GradientIntegrator;
/// use aprender_geodesic::metric::DistanceMetric;
/// use aprender_geodesic::model::LinearModel;
/// use aprender_geodesic::path::{GeodesicPath, PathDiscretizer};
/// use aprender_geodesic::primitives::FeatureVector;
///
/// let model = LinearModel::new(FeatureVector::from_slice(&[2.0, -1.0]));
/// let path = GeodesicPath::straight_line(
///     &FeatureVector::zeros(2),
///     &FeatureVector::from_slice(&[1.0, 1.0]),
///     &DistanceMetric::Euclidean,
/// )
/// .unwrap();
/// let samples = PathDiscretizer::new(10).discretize(&path).unwrap();
///
/// let outcome = GradientIntegrator::new().integrate(&model, &samples).unwrap();
/// assert!((outcome.attribution()[0] - 2.0).abs() < 1e-12);
/// assert!((outcome.attribution()[1] + 1.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Default)]
pub struct GradientIntegrator {
    rule: QuadratureRule,
}

impl GradientIntegrator {
    /// Integrator using the midpoint rule.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the quadrature rule.
    #[must_use]
    pub fn with_rule(mut self, rule: QuadratureRule) -> Self {
        self.rule = rule;
        self
    }

    /// Active quadrature rule.
    #[must_use]
    pub fn rule(&self) -> QuadratureRule {
        self.rule
    }

    /// Integrate `model` along `path`.
    ///
    /// # Errors
    /// `GradientEvaluation` if the model fails at some step, `ShapeMismatch`
    /// if a gradient has the wrong dimension.
    pub fn integrate<M: Model + ?Sized>(
        &self,
        model: &M,
        path: &DiscretizedPath,
    ) -> Result<IntegrationOutcome> {
        self.integrate_with_cancel(model, path, None)
    }

    /// Integrate `model` along `path`, checking `token` between steps.
    ///
    /// # Errors
    /// As [`integrate`](Self::integrate), plus `Cancelled`.
    pub fn integrate_with_cancel<M: Model + ?Sized>(
        &self,
        model: &M,
        path: &DiscretizedPath,
        token: Option<&CancellationToken>,
    ) -> Result<IntegrationOutcome> {
        let points = path.points();
        if points.len() < 2 {
            return Err(GeodesicError::InvalidStepCount {
                n_steps: points.len(),
            });
        }
        let dim = check_dims(points)?;

        let eval_points: Vec<FeatureVector> = match self.rule {
            QuadratureRule::Midpoint => points.windows(2).map(|w| w[0].midpoint(&w[1])).collect(),
            QuadratureRule::Left => points[..points.len() - 1].to_vec(),
            QuadratureRule::Trapezoid => points.to_vec(),
        };
        let gradients = evaluate_gradients(model, &eval_points, dim, token)?;

        let mut attribution = vec![0.0; dim];
        let mut contributions = Vec::with_capacity(points.len() - 1);
        for (i, step) in points.windows(2).enumerate() {
            cancel::check(token)?;
            let grad = match self.rule {
                QuadratureRule::Midpoint | QuadratureRule::Left => gradients[i].clone(),
                QuadratureRule::Trapezoid => gradients[i].add(&gradients[i + 1]).scale(0.5),
            };
            let contribution = grad.hadamard(&step[1].sub(&step[0]));
            for (acc, c) in attribution.iter_mut().zip(contribution.iter()) {
                *acc += c;
            }
            contributions.push(contribution);
        }

        tracing::debug!(
            rule = ?self.rule,
            steps = contributions.len(),
            gradient_evaluations = gradients.len(),
            "integrated gradients along path"
        );

        Ok(IntegrationOutcome {
            attribution: FeatureVector::from_vec(attribution),
            contributions,
            gradient_evaluations: gradients.len(),
        })
    }
}

/// Evaluate gradients at `points`, in order.
///
/// Every result is gathered before the first failure is reported, so the
/// reported step does not depend on scheduling.
pub(crate) fn evaluate_gradients<M: Model + ?Sized>(
    model: &M,
    points: &[FeatureVector],
    dim: usize,
    token: Option<&CancellationToken>,
) -> Result<Vec<FeatureVector>> {
    let eval = |(step, x): (usize, &FeatureVector)| -> Result<FeatureVector> {
        cancel::check(token)?;
        let grad = model
            .gradient(x)
            .map_err(|source| GeodesicError::GradientEvaluation { step, source })?;
        grad.check_dim("gradient", dim)?;
        Ok(grad)
    };

    #[cfg(feature = "parallel")]
    let results: Vec<Result<FeatureVector>> = points.par_iter().enumerate().map(eval).collect();
    #[cfg(not(feature = "parallel"))]
    let results: Vec<Result<FeatureVector>> = points.iter().enumerate().map(eval).collect();

    results.into_iter().collect()
}

/// Classical integrated gradients along the straight line from `baseline`
/// to `input`, with `n_steps` path points.
///
/// # Errors
/// `ShapeMismatch` if `input`, `baseline` and the model disagree on the
/// dimension, `InvalidStepCount` if `n_steps < 2`, and any integration error.
///
/// # Examples
///
/// ```
/// use aprender_geodesic::integrate::{integrated_gradients, QuadratureRule};
/// use aprender_geodesic::model::FnModel;
/// use aprender_geodesic::primitives::FeatureVector;
///
/// // f(x) = x0 * x1
/// let model = FnModel::new(
///     2,
///     |x: &FeatureVector| x[0] * x[1],
///     |x: &FeatureVector| FeatureVector::from_slice(&[x[1], x[0]]),
/// );
/// let input = FeatureVector::from_slice(&[2.0, 3.0]);
/// let outcome =
///     integrated_gradients(&model, &input, &FeatureVector::zeros(2), 20, QuadratureRule::Midpoint)
///         .unwrap();
/// // Completeness: attributions sum to f(input) - f(baseline) = 6
/// assert!((outcome.attribution().sum() - 6.0).abs() < 1e-9);
/// ```
pub fn integrated_gradients<M: Model + ?Sized>(
    model: &M,
    input: &FeatureVector,
    baseline: &FeatureVector,
    n_steps: usize,
    rule: QuadratureRule,
) -> Result<IntegrationOutcome> {
    input.check_dim("input", model.n_features())?;
    baseline.check_dim("baseline", model.n_features())?;
    let path = GeodesicPath::straight_line(baseline, input, &DistanceMetric::Euclidean)?;
    let samples = PathDiscretizer::new(n_steps).discretize(&path)?;
    GradientIntegrator::new()
        .with_rule(rule)
        .integrate(model, &samples)
}
