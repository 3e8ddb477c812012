//! Convenience re-exports for common usage.
//!
//! # Usage
//!
//! ```
//! use aprender_geodesic::prelude::*;
//! ```

pub use crate::cache::GraphCache;
pub use crate::cancel::CancellationToken;
pub use crate::config::{BaselineAggregation, GeodesicConfig, NoPathPolicy};
pub use crate::engine::{explain, AttributionEngine, BaselineAttribution, ExplanationResult};
pub use crate::error::{GeodesicError, Stage};
pub use crate::graph::{CorpusGraph, NeighborGraphBuilder, NeighborSearch};
pub use crate::integrate::{integrated_gradients, GradientIntegrator, QuadratureRule};
pub use crate::metric::DistanceMetric;
pub use crate::model::{FnModel, LinearModel, Model, MultiOutputModel, NumericalGradient, Targeted};
pub use crate::path::{GeodesicPath, GeodesicPathFinder, PathDiscretizer, PathKind, PathRefinement};
pub use crate::primitives::{FeatureVector, ReferenceCorpus};
