//! Energy-descent refinement of discretized paths.
//!
//! A graph path only visits corpus points. Refinement nudges its interior
//! samples toward regions where the model's gradient is large, while a
//! distance penalty keeps every sample near where it started:
//!
//! ```text
//! E(p) = Σ_i w_i ||p_i − q_i|| − β_t Σ_i ||∇f(p_i)||
//! ```
//!
//! `q` is the unrefined path and `w_i` is 1, or `1 + endpoint_weight` for
//! the first and last tenth of the samples when endpoint matching is on.
//! Each iteration takes a gradient step on the curvature term and a
//! proximal step on the distance term. The baseline and input never move.
//! Everything is deterministic: no sampling, no random initialization.

use serde::{Deserialize, Serialize};

use super::{check_dims, DiscretizedPath};
use crate::cancel::{self, CancellationToken};
use crate::error::{GeodesicError, Result};
use crate::integrate::evaluate_gradients;
use crate::model::Model;
use crate::primitives::FeatureVector;

/// Options for the path refinement stage.
///
/// # Examples
///
/// ```
/// use aprender_geodesic::path::PathRefinement;
///
/// let refinement = PathRefinement::new()
///     .with_beta(0.5)
///     .with_num_iterations(200)
///     .with_learning_rate(1e-2);
/// assert!(refinement.validate().is_ok());
/// assert!(PathRefinement::new().with_num_iterations(0).validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathRefinement {
    /// Weight of the gradient-norm term; values above 1 are inverted
    pub beta: f64,
    /// Maximum number of descent iterations
    pub num_iterations: usize,
    /// Initial step size
    pub learning_rate: f64,
    /// Floor for the decayed step size
    pub min_learning_rate: f64,
    /// Step size multiplier applied after `lr_patience` stalled iterations
    pub lr_decay_factor: f64,
    /// Stalled iterations before the step size decays
    pub lr_patience: usize,
    /// Stalled iterations before early stopping is considered
    pub patience: usize,
    /// Relative energy improvement below which a stalled run stops
    pub rel_improvement_threshold: f64,
    /// Penalize movement near the baseline and input more heavily
    pub use_endpoints_matching: bool,
    /// Extra distance weight for the endpoint regions
    pub endpoint_weight: f64,
    /// Finite-difference step for the Hessian-vector product
    pub curvature_step: f64,
}

impl Default for PathRefinement {
    fn default() -> Self {
        Self {
            beta: 0.3,
            num_iterations: 1000,
            learning_rate: 1e-3,
            min_learning_rate: 1e-5,
            lr_decay_factor: 0.5,
            lr_patience: 25,
            patience: 4000,
            rel_improvement_threshold: 1e-4,
            use_endpoints_matching: true,
            endpoint_weight: 100.0,
            curvature_step: 1e-4,
        }
    }
}

/// Outcome of one refinement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementReport {
    /// Iterations actually run
    pub iterations: usize,
    /// Energy of the unrefined path
    pub initial_energy: f64,
    /// Energy at the last iteration
    pub final_energy: f64,
    /// Gradient calls made by refinement (not counting integration)
    pub gradient_evaluations: usize,
}

/// Refined path points plus the run report.
#[derive(Debug, Clone)]
pub struct RefinedPath {
    points: Vec<FeatureVector>,
    report: RefinementReport,
}

impl RefinedPath {
    /// Refined points, baseline first and input last.
    #[must_use]
    pub fn points(&self) -> &[FeatureVector] {
        &self.points
    }

    /// Run statistics.
    #[must_use]
    pub fn report(&self) -> &RefinementReport {
        &self.report
    }

    /// Split into points and report.
    #[must_use]
    pub fn into_parts(self) -> (Vec<FeatureVector>, RefinementReport) {
        (self.points, self.report)
    }
}

impl PathRefinement {
    /// Refinement with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `beta`.
    #[must_use]
    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    /// Set the iteration budget.
    #[must_use]
    pub fn with_num_iterations(mut self, num_iterations: usize) -> Self {
        self.num_iterations = num_iterations;
        self
    }

    /// Set the initial step size.
    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Toggle the endpoint penalty.
    #[must_use]
    pub fn with_endpoints_matching(mut self, enabled: bool) -> Self {
        self.use_endpoints_matching = enabled;
        self
    }

    /// Check option ranges.
    ///
    /// # Errors
    /// `InvalidConfig` naming the first offending option.
    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(GeodesicError::invalid_config(name, value, "finite and positive"))
            }
        };
        if !(self.beta.is_finite() && self.beta >= 0.0) {
            return Err(GeodesicError::invalid_config(
                "refinement.beta",
                self.beta,
                "finite and non-negative",
            ));
        }
        if self.num_iterations == 0 {
            return Err(GeodesicError::invalid_config(
                "refinement.num_iterations",
                0,
                "at least 1",
            ));
        }
        positive("refinement.learning_rate", self.learning_rate)?;
        positive("refinement.min_learning_rate", self.min_learning_rate)?;
        positive("refinement.curvature_step", self.curvature_step)?;
        if !(self.lr_decay_factor > 0.0 && self.lr_decay_factor <= 1.0) {
            return Err(GeodesicError::invalid_config(
                "refinement.lr_decay_factor",
                self.lr_decay_factor,
                "in (0, 1]",
            ));
        }
        if !(self.endpoint_weight.is_finite() && self.endpoint_weight >= 0.0) {
            return Err(GeodesicError::invalid_config(
                "refinement.endpoint_weight",
                self.endpoint_weight,
                "finite and non-negative",
            ));
        }
        if !self.rel_improvement_threshold.is_finite() {
            return Err(GeodesicError::invalid_config(
                "refinement.rel_improvement_threshold",
                self.rel_improvement_threshold,
                "finite",
            ));
        }
        Ok(())
    }

    /// Refine `path` against `model`, observing `token` every iteration.
    ///
    /// The returned points have the same count as `path`; the caller
    /// re-spaces them with a [`PathDiscretizer`](super::PathDiscretizer).
    ///
    /// # Errors
    /// Option errors from [`validate`](Self::validate), `ShapeMismatch` for
    /// mixed dimensions, `GradientEvaluation` with the index of the sample
    /// that failed, and `Cancelled`.
    pub fn refine<M: Model + ?Sized>(
        &self,
        model: &M,
        path: &DiscretizedPath,
        token: Option<&CancellationToken>,
    ) -> Result<RefinedPath> {
        self.validate()?;
        let initial = path.points();
        let dim = check_dims(initial)?;
        let n = initial.len();
        let weights: Vec<f64> = (0..n).map(|i| self.distance_weight(i, n)).collect();
        let (mut beta, beta_decay) = self.beta_schedule();

        let mut points = initial.to_vec();
        let mut lr = self.learning_rate;
        let mut gradient_evaluations = 0;
        let mut initial_energy = None;
        let mut final_energy = 0.0;
        let mut iterations = 0;
        let mut best = f64::INFINITY;
        let mut previous: Option<f64> = None;
        let mut stalled = 0;
        let mut lr_stalled = 0;

        for iteration in 0..self.num_iterations {
            cancel::check(token)?;
            let grads = evaluate_gradients(model, &points, dim, token)?;
            gradient_evaluations += n;

            let energy = energy(&points, initial, &weights, &grads, beta);
            if initial_energy.is_none() {
                initial_energy = Some(energy);
            }
            final_energy = energy;
            iterations = iteration + 1;

            if energy < best {
                best = energy;
                stalled = 0;
                lr_stalled = 0;
            } else {
                stalled += 1;
                lr_stalled += 1;
                if lr_stalled >= self.lr_patience && lr > self.min_learning_rate {
                    lr = (lr * self.lr_decay_factor).max(self.min_learning_rate);
                    lr_stalled = 0;
                    tracing::debug!(iteration, lr, "refinement learning rate decayed");
                }
            }
            if let Some(prev) = previous {
                let rel_improvement = if prev == 0.0 {
                    0.0
                } else {
                    (prev - energy) / prev.abs()
                };
                if stalled >= self.patience && rel_improvement < self.rel_improvement_threshold {
                    tracing::debug!(iteration, energy, "refinement stopped early");
                    break;
                }
            }
            previous = Some(energy);

            let curvature = self.curvature(model, &points, &grads, dim, token)?;
            gradient_evaluations += 2 * curvature.iter().flatten().count();

            for i in 1..n - 1 {
                let moved = match &curvature[i] {
                    Some(hu) => points[i].add(&hu.scale(lr * beta)),
                    None => points[i].clone(),
                };
                points[i] = shrink_toward(&moved, &initial[i], lr * weights[i]);
            }
            beta *= beta_decay;
        }

        let report = RefinementReport {
            iterations,
            initial_energy: initial_energy.unwrap_or(final_energy),
            final_energy,
            gradient_evaluations,
        };
        tracing::debug!(
            iterations = report.iterations,
            initial_energy = report.initial_energy,
            final_energy = report.final_energy,
            "path refined"
        );
        Ok(RefinedPath { points, report })
    }

    /// Starting beta and per-iteration multiplier.
    fn beta_schedule(&self) -> (f64, f64) {
        let beta = if self.beta > 1.0 { 1.0 / self.beta } else { self.beta };
        let start = 10.0 * beta;
        let decay = (start * beta).powf(1.0 / self.num_iterations as f64);
        (start, decay)
    }

    fn distance_weight(&self, i: usize, n: usize) -> f64 {
        let edge = ((n as f64 * 0.1) as usize).max(1);
        if self.use_endpoints_matching && (i < edge || i >= n.saturating_sub(edge)) {
            1.0 + self.endpoint_weight
        } else {
            1.0
        }
    }

    /// `H u` at each interior sample, where `u` is the unit gradient, by
    /// central differences. `None` where the gradient vanishes.
    fn curvature<M: Model + ?Sized>(
        &self,
        model: &M,
        points: &[FeatureVector],
        grads: &[FeatureVector],
        dim: usize,
        token: Option<&CancellationToken>,
    ) -> Result<Vec<Option<FeatureVector>>> {
        let h = self.curvature_step;
        let n = points.len();
        let mut owners = Vec::new();
        let mut forward = Vec::new();
        let mut backward = Vec::new();
        for i in 1..n - 1 {
            let norm = l2(&grads[i]);
            if norm > 0.0 {
                let offset = grads[i].scale(h / norm);
                forward.push(points[i].add(&offset));
                backward.push(points[i].sub(&offset));
                owners.push(i);
            }
        }

        let at = |e: GeodesicError| remap_step(e, &owners);
        let plus = evaluate_gradients(model, &forward, dim, token).map_err(at)?;
        let minus = evaluate_gradients(model, &backward, dim, token).map_err(at)?;

        let mut curvature = vec![None; n];
        for (j, &i) in owners.iter().enumerate() {
            curvature[i] = Some(plus[j].sub(&minus[j]).scale(0.5 / h));
        }
        Ok(curvature)
    }
}

fn energy(
    points: &[FeatureVector],
    initial: &[FeatureVector],
    weights: &[f64],
    grads: &[FeatureVector],
    beta: f64,
) -> f64 {
    let distance: f64 = points
        .iter()
        .zip(initial)
        .zip(weights)
        .map(|((p, q), w)| w * l2(&p.sub(q)))
        .sum();
    let steepness: f64 = grads.iter().map(l2).sum();
    distance - beta * steepness
}

/// Proximal step for `lambda * ||x − target||`.
fn shrink_toward(x: &FeatureVector, target: &FeatureVector, lambda: f64) -> FeatureVector {
    let offset = x.sub(target);
    let dist = l2(&offset);
    if dist <= lambda {
        target.clone()
    } else {
        x.sub(&offset.scale(lambda / dist))
    }
}

fn l2(v: &FeatureVector) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

fn remap_step(err: GeodesicError, owners: &[usize]) -> GeodesicError {
    match err {
        GeodesicError::GradientEvaluation { step, source } => GeodesicError::GradientEvaluation {
            step: owners.get(step).copied().unwrap_or(step),
            source,
        },
        other => other,
    }
}
