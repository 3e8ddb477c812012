//! Aprender Geodesic: manifold-aware path attribution in pure Rust.
//!
//! Explains a differentiable model's prediction by integrating its gradient
//! along an approximate geodesic from a baseline to the input. The geodesic
//! is the shortest path through a k-nearest-neighbor graph over a reference
//! corpus, so the integration path stays near the data instead of cutting
//! through regions the model never saw. When the path degenerates to the
//! straight line, the result is classical Integrated Gradients.
//!
//! # Quick Start
//!
//! ```
//! use aprender_geodesic::prelude::*;
//!
//! // Reference corpus: points on a quarter circle
//! let rows: Vec<Vec<f64>> = (0..=40)
//!     .map(|i| {
//!         let t = std::f64::consts::FRAC_PI_2 * f64::from(i) / 40.0;
//!         vec![t.cos(), t.sin()]
//!     })
//!     .collect();
//! let corpus = ReferenceCorpus::from_rows(&rows).unwrap();
//!
//! // f(x) = x0 * x1
//! let model = FnModel::new(
//!     2,
//!     |x: &FeatureVector| x[0] * x[1],
//!     |x: &FeatureVector| FeatureVector::from_slice(&[x[1], x[0]]),
//! );
//!
//! let result = explain(
//!     &FeatureVector::from_slice(&[0.6, 0.8]),
//!     &[FeatureVector::from_slice(&[1.0, 0.0])],
//!     4,
//!     200,
//!     DistanceMetric::Euclidean,
//!     &model,
//!     &corpus,
//! )
//! .unwrap();
//!
//! // Attributions sum to f(input) - f(baseline)
//! assert!(result.completeness_error() < 1e-3);
//! ```
//!
//! # Pipeline
//!
//! 1. [`graph`]: k-NN graph over the corpus plus baseline and input
//! 2. [`path`]: Dijkstra shortest path, resampled at equal arc length
//! 3. [`integrate`]: Riemann sum of gradient ⊙ displacement
//! 4. [`engine`]: per-baseline orchestration, aggregation, completeness check
//!
//! # Modules
//!
//! - [`primitives`]: `FeatureVector` and `ReferenceCorpus`
//! - [`metric`]: Distance metrics for edge weights and arc length
//! - [`graph`]: CSR neighbor graph, builder, request overlay
//! - [`path`]: Geodesic path finding, discretization and optional refinement
//! - [`model`]: Differentiable model capability and adapters
//! - [`integrate`]: Gradient path integration, straight-line Integrated Gradients
//! - [`engine`]: Attribution requests and results
//! - [`config`]: Request options
//! - [`cache`]: Caller-owned graph cache
//! - [`cancel`]: Cooperative cancellation
//! - [`error`]: Error types
//!
//! # Features
//!
//! - `parallel` (default): Rayon for pairwise distances and gradient calls.
//!   Results are identical with or without it.

pub mod cache;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod integrate;
pub mod metric;
pub mod model;
pub mod path;
pub mod prelude;
pub mod primitives;

pub use engine::{explain, AttributionEngine, ExplanationResult};
pub use error::{GeodesicError, Result};
pub use primitives::{FeatureVector, ReferenceCorpus};
