//! Differentiable model capability and adapters.
//!
//! The attribution pipeline only needs two things from a model: its scalar
//! output at a point and the gradient of that output. [`Model`] captures
//! exactly that. [`MultiOutputModel`] covers vector-valued models; wrap one
//! in [`Targeted`] to explain a single output.
//!
//! # Examples
//!
//! ```
//! use aprender_geodesic::model::{FnModel, Model};
//! use aprender_geodesic::primitives::FeatureVector;
//!
//! // f(x) = x0^2 + 3 x1
//! let model = FnModel::new(
//!     2,
//!     |x: &FeatureVector| x[0] * x[0] + 3.0 * x[1],
//!     |x: &FeatureVector| FeatureVector::from_slice(&[2.0 * x[0], 3.0]),
//! );
//! let x = FeatureVector::from_slice(&[2.0, 1.0]);
//! assert_eq!(model.evaluate(&x).unwrap(), 7.0);
//! assert_eq!(model.gradient(&x).unwrap().as_slice(), &[4.0, 3.0]);
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::{GeodesicError, ModelError, Result};
use crate::primitives::FeatureVector;

/// A differentiable scalar model.
///
/// Implementations must be safe to call from several threads at once; the
/// integrator may evaluate gradients in parallel.
pub trait Model: Send + Sync {
    /// Input dimension.
    fn n_features(&self) -> usize;

    /// Scalar output at `x`.
    ///
    /// # Errors
    ///
    /// Any model-specific failure.
    fn evaluate(&self, x: &FeatureVector) -> std::result::Result<f64, ModelError>;

    /// Gradient of the output at `x`, one entry per feature.
    ///
    /// # Errors
    ///
    /// Any model-specific failure.
    fn gradient(&self, x: &FeatureVector) -> std::result::Result<FeatureVector, ModelError>;
}

impl<M: Model + ?Sized> Model for &M {
    fn n_features(&self) -> usize {
        (**self).n_features()
    }

    fn evaluate(&self, x: &FeatureVector) -> std::result::Result<f64, ModelError> {
        (**self).evaluate(x)
    }

    fn gradient(&self, x: &FeatureVector) -> std::result::Result<FeatureVector, ModelError> {
        (**self).gradient(x)
    }
}

impl<M: Model + ?Sized> Model for Box<M> {
    fn n_features(&self) -> usize {
        (**self).n_features()
    }

    fn evaluate(&self, x: &FeatureVector) -> std::result::Result<f64, ModelError> {
        (**self).evaluate(x)
    }

    fn gradient(&self, x: &FeatureVector) -> std::result::Result<FeatureVector, ModelError> {
        (**self).gradient(x)
    }
}

impl<M: Model + ?Sized> Model for Arc<M> {
    fn n_features(&self) -> usize {
        (**self).n_features()
    }

    fn evaluate(&self, x: &FeatureVector) -> std::result::Result<f64, ModelError> {
        (**self).evaluate(x)
    }

    fn gradient(&self, x: &FeatureVector) -> std::result::Result<FeatureVector, ModelError> {
        (**self).gradient(x)
    }
}

/// A differentiable model with several outputs (e.g. class scores).
pub trait MultiOutputModel: Send + Sync {
    /// Input dimension.
    fn n_features(&self) -> usize;

    /// Number of outputs.
    fn n_outputs(&self) -> usize;

    /// All outputs at `x`.
    ///
    /// # Errors
    ///
    /// Any model-specific failure.
    fn evaluate(&self, x: &FeatureVector) -> std::result::Result<Vec<f64>, ModelError>;

    /// Gradient of output `output` at `x`.
    ///
    /// # Errors
    ///
    /// Any model-specific failure.
    fn gradient(
        &self,
        x: &FeatureVector,
        output: usize,
    ) -> std::result::Result<FeatureVector, ModelError>;
}

/// Selects one output of a [`MultiOutputModel`] as a scalar [`Model`].
#[derive(Debug, Clone)]
pub struct Targeted<M> {
    model: M,
    target: usize,
}

impl<M: MultiOutputModel> Targeted<M> {
    /// Explain output `target` of `model`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `target` is not a valid output index.
    pub fn new(model: M, target: usize) -> Result<Self> {
        let n_outputs = model.n_outputs();
        if target >= n_outputs {
            return Err(GeodesicError::invalid_config(
                "target",
                target,
                format!("an output index below {n_outputs}"),
            ));
        }
        Ok(Self { model, target })
    }

    /// Selected output index.
    #[must_use]
    pub fn target(&self) -> usize {
        self.target
    }

    /// Wrapped model.
    #[must_use]
    pub fn inner(&self) -> &M {
        &self.model
    }
}

impl<M: MultiOutputModel> Model for Targeted<M> {
    fn n_features(&self) -> usize {
        self.model.n_features()
    }

    fn evaluate(&self, x: &FeatureVector) -> std::result::Result<f64, ModelError> {
        let outputs = self.model.evaluate(x)?;
        outputs.get(self.target).copied().ok_or_else(|| {
            format!(
                "model returned {} outputs, target is {}",
                outputs.len(),
                self.target
            )
            .into()
        })
    }

    fn gradient(&self, x: &FeatureVector) -> std::result::Result<FeatureVector, ModelError> {
        self.model.gradient(x, self.target)
    }
}

/// Affine model `w · x + b`.
///
/// Integrated gradients are exact for affine models, which makes this the
/// reference model for checking completeness.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    weights: FeatureVector,
    bias: f64,
}

impl LinearModel {
    /// Model with the given weights and zero bias.
    #[must_use]
    pub fn new(weights: FeatureVector) -> Self {
        Self { weights, bias: 0.0 }
    }

    /// Set the intercept.
    #[must_use]
    pub fn with_bias(mut self, bias: f64) -> Self {
        self.bias = bias;
        self
    }

    /// Coefficients.
    #[must_use]
    pub fn weights(&self) -> &FeatureVector {
        &self.weights
    }

    /// Intercept.
    #[must_use]
    pub fn bias(&self) -> f64 {
        self.bias
    }
}

impl Model for LinearModel {
    fn n_features(&self) -> usize {
        self.weights.len()
    }

    fn evaluate(&self, x: &FeatureVector) -> std::result::Result<f64, ModelError> {
        if x.len() != self.weights.len() {
            return Err(format!(
                "expected {} features, got {}",
                self.weights.len(),
                x.len()
            )
            .into());
        }
        let dot: f64 = self.weights.iter().zip(x.iter()).map(|(w, v)| w * v).sum();
        Ok(dot + self.bias)
    }

    fn gradient(&self, _x: &FeatureVector) -> std::result::Result<FeatureVector, ModelError> {
        Ok(self.weights.clone())
    }
}

/// Model built from an output closure and a gradient closure.
pub struct FnModel<F, G> {
    n_features: usize,
    f: F,
    grad: G,
}

impl<F, G> FnModel<F, G>
where
    F: Fn(&FeatureVector) -> f64 + Send + Sync,
    G: Fn(&FeatureVector) -> FeatureVector + Send + Sync,
{
    /// Wrap `f` and its gradient `grad`.
    pub fn new(n_features: usize, f: F, grad: G) -> Self {
        Self {
            n_features,
            f,
            grad,
        }
    }
}

impl<F, G> fmt::Debug for FnModel<F, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnModel")
            .field("n_features", &self.n_features)
            .finish_non_exhaustive()
    }
}

impl<F, G> Model for FnModel<F, G>
where
    F: Fn(&FeatureVector) -> f64 + Send + Sync,
    G: Fn(&FeatureVector) -> FeatureVector + Send + Sync,
{
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn evaluate(&self, x: &FeatureVector) -> std::result::Result<f64, ModelError> {
        Ok((self.f)(x))
    }

    fn gradient(&self, x: &FeatureVector) -> std::result::Result<FeatureVector, ModelError> {
        Ok((self.grad)(x))
    }
}

/// Model from an output closure, differentiated by central differences.
///
/// Feature `i` is perturbed by `h_i = step * max(1, |x_i|)`, giving
/// `(f(x + h_i e_i) - f(x - h_i e_i)) / (2 h_i)`. Costs `2 * n_features`
/// evaluations per gradient.
pub struct NumericalGradient<F> {
    n_features: usize,
    f: F,
    step: f64,
}

impl<F> NumericalGradient<F>
where
    F: Fn(&FeatureVector) -> f64 + Send + Sync,
{
    /// Default relative step.
    pub const DEFAULT_STEP: f64 = 1e-5;

    /// Wrap `f` with the default step.
    pub fn new(n_features: usize, f: F) -> Self {
        Self {
            n_features,
            f,
            step: Self::DEFAULT_STEP,
        }
    }

    /// Set the relative finite-difference step.
    #[must_use]
    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    /// Relative finite-difference step.
    #[must_use]
    pub fn step(&self) -> f64 {
        self.step
    }
}

impl<F> fmt::Debug for NumericalGradient<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NumericalGradient")
            .field("n_features", &self.n_features)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

impl<F> Model for NumericalGradient<F>
where
    F: Fn(&FeatureVector) -> f64 + Send + Sync,
{
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn evaluate(&self, x: &FeatureVector) -> std::result::Result<f64, ModelError> {
        Ok((self.f)(x))
    }

    fn gradient(&self, x: &FeatureVector) -> std::result::Result<FeatureVector, ModelError> {
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(format!("finite-difference step must be positive, got {}", self.step).into());
        }
        let mut shifted = x.clone().into_vec();
        let mut grad = Vec::with_capacity(shifted.len());
        for i in 0..shifted.len() {
            let original = shifted[i];
            let h = self.step * original.abs().max(1.0);

            shifted[i] = original + h;
            let forward = (self.f)(&FeatureVector::from_slice(&shifted));
            shifted[i] = original - h;
            let backward = (self.f)(&FeatureVector::from_slice(&shifted));
            shifted[i] = original;

            grad.push((forward - backward) / (2.0 * h));
        }
        Ok(FeatureVector::from_vec(grad))
    }
}
