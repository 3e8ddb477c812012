//! Request orchestration: graph, path, discretization and integration per
//! baseline, then aggregation and the completeness diagnostic.
//!
//! # Examples
//!
//! ```
//! use aprender_geodesic::prelude::*;
//!
//! let rows: Vec<Vec<f64>> = (0..=10)
//!     .flat_map(|i| (0..=10).map(move |j| vec![i as f64 / 10.0, j as f64 / 10.0]))
//!     .collect();
//! let corpus = ReferenceCorpus::from_rows(&rows).unwrap();
//! let model = LinearModel::new(FeatureVector::from_slice(&[2.0, -1.0]));
//!
//! let engine = AttributionEngine::new(GeodesicConfig::new().with_k(4).with_n_steps(20));
//! let result = engine
//!     .explain(
//!         &model,
//!         &FeatureVector::from_slice(&[1.0, 1.0]),
//!         &[FeatureVector::zeros(2)],
//!         &corpus,
//!     )
//!     .unwrap();
//!
//! assert!((result.attribution()[0] - 2.0).abs() < 1e-9);
//! assert!((result.attribution()[1] + 1.0).abs() < 1e-9);
//! assert!(result.is_complete());
//! ```

use serde::{Deserialize, Serialize};

use crate::cancel::{self, CancellationToken};
use crate::config::{GeodesicConfig, NoPathPolicy};
use crate::error::{GeodesicError, Result, Stage};
use crate::graph::{CorpusGraph, NeighborGraphBuilder, NodeId};
use crate::integrate::GradientIntegrator;
use crate::metric::DistanceMetric;
use crate::model::Model;
use crate::path::{GeodesicPath, GeodesicPathFinder, PathDiscretizer, PathKind, RefinementReport};
use crate::primitives::{FeatureVector, ReferenceCorpus};

/// Description of the path used for one baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSummary {
    /// How the path was obtained
    pub kind: PathKind,
    /// Graph node ids from baseline to input (empty for straight lines)
    pub nodes: Vec<NodeId>,
    /// Length of the integrated path under the request metric (after
    /// refinement, when enabled)
    pub length: f64,
    /// Number of discretized points
    pub n_points: usize,
    /// Discretized points, kept when `record_paths` is enabled
    pub samples: Option<Vec<FeatureVector>>,
    /// Refinement statistics, when refinement is enabled
    pub refinement: Option<RefinementReport>,
}

/// Attribution against a single baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineAttribution {
    /// Position in the request's baseline list
    pub index: usize,
    /// Normalized aggregation weight
    pub weight: f64,
    /// Attribution from this baseline alone
    pub attribution: FeatureVector,
    /// Model output at the baseline
    pub baseline_output: f64,
    /// `|Σ attribution − (f(input) − f(baseline))|`
    pub completeness_error: f64,
    /// Gradient calls made for this baseline
    pub gradient_evaluations: usize,
    /// Path metadata
    pub path: PathSummary,
}

/// Result of an attribution request.
///
/// The completeness error is a diagnostic. A result whose error exceeds the
/// tolerance is still returned; check [`is_complete`](Self::is_complete).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationResult {
    attribution: FeatureVector,
    completeness_error: f64,
    tolerance: f64,
    input_output: f64,
    baseline_output: f64,
    k: usize,
    n_steps: usize,
    baselines: Vec<BaselineAttribution>,
}

impl ExplanationResult {
    /// Aggregated attribution, one value per feature.
    #[must_use]
    pub fn attribution(&self) -> &FeatureVector {
        &self.attribution
    }

    /// `|Σ attribution − (f(input) − Σ_b w_b f(baseline_b))|`.
    #[must_use]
    pub fn completeness_error(&self) -> f64 {
        self.completeness_error
    }

    /// Tolerance the request was configured with.
    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// True if the completeness error is within tolerance.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completeness_error <= self.tolerance
    }

    /// Model output at the input.
    #[must_use]
    pub fn input_output(&self) -> f64 {
        self.input_output
    }

    /// Weighted model output over the baselines.
    #[must_use]
    pub fn baseline_output(&self) -> f64 {
        self.baseline_output
    }

    /// Effective neighbor count after clamping.
    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Points per discretized path.
    #[must_use]
    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    /// Per-baseline results, in request order.
    #[must_use]
    pub fn baselines(&self) -> &[BaselineAttribution] {
        &self.baselines
    }

    /// True if any baseline fell back to a straight line.
    #[must_use]
    pub fn used_fallback(&self) -> bool {
        self.baselines
            .iter()
            .any(|b| b.path.kind == PathKind::StraightLineFallback)
    }

    /// Feature indices ordered by descending absolute attribution.
    #[must_use]
    pub fn ranked_features(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.attribution.len()).collect();
        order.sort_by(|&a, &b| {
            self.attribution[b]
                .abs()
                .total_cmp(&self.attribution[a].abs())
                .then(a.cmp(&b))
        });
        order
    }
}

/// Runs attribution requests with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct AttributionEngine {
    config: GeodesicConfig,
    cancel: Option<CancellationToken>,
}

impl AttributionEngine {
    /// Engine with the given configuration.
    #[must_use]
    pub fn new(config: GeodesicConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    /// Observe `token` between discretization and integration steps.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &GeodesicConfig {
        &self.config
    }

    /// Build the corpus graph this engine would use, for caching.
    ///
    /// # Errors
    /// Configuration and graph construction errors.
    pub fn build_graph(&self, corpus: &ReferenceCorpus) -> Result<CorpusGraph> {
        self.config.validate()?;
        NeighborGraphBuilder::new(self.config.k)
            .with_metric(self.config.metric.clone())
            .with_search(self.config.neighbor_search.clone())
            .build(corpus)
    }

    /// Explain `model` at `input` against `baselines`, building the corpus
    /// graph for this request.
    ///
    /// # Errors
    /// - `InvalidConfig`, `InvalidNeighborCount`, `InvalidStepCount` for bad options
    /// - `ShapeMismatch` if input, baselines, model and corpus disagree on dimension
    /// - `EmptyCorpus` for an empty corpus
    /// - `ModelEvaluation` if the model fails at the input
    /// - `Baseline { index, stage, .. }` wrapping any per-baseline failure
    /// - `Cancelled` if the engine's token fires
    pub fn explain<M: Model + ?Sized>(
        &self,
        model: &M,
        input: &FeatureVector,
        baselines: &[FeatureVector],
        corpus: &ReferenceCorpus,
    ) -> Result<ExplanationResult> {
        self.check_request(model, input, baselines)?;
        let graph = self.build_graph(corpus)?;
        self.explain_with_graph(model, input, baselines, &graph)
    }

    /// Explain using a prebuilt corpus graph (for example from a
    /// [`GraphCache`](crate::cache::GraphCache)).
    ///
    /// # Errors
    /// As [`explain`](Self::explain), plus `InvalidConfig` if the graph was
    /// built with a different k, metric or neighbor search.
    pub fn explain_with_graph<M: Model + ?Sized>(
        &self,
        model: &M,
        input: &FeatureVector,
        baselines: &[FeatureVector],
        graph: &CorpusGraph,
    ) -> Result<ExplanationResult> {
        self.check_request(model, input, baselines)?;
        self.check_graph(graph)?;
        input.check_dim("input", graph.dim())?;
        cancel::check(self.cancel.as_ref())?;

        let weights = self.config.aggregation.weights(baselines.len())?;
        let input_output = model
            .evaluate(input)
            .map_err(|source| GeodesicError::ModelEvaluation { source })?;

        let mut results = Vec::with_capacity(baselines.len());
        for (index, baseline) in baselines.iter().enumerate() {
            let result =
                self.explain_baseline(model, input, baseline, index, weights[index], input_output, graph)?;
            results.push(result);
        }

        let dim = input.len();
        let mut attribution = vec![0.0; dim];
        let mut baseline_output = 0.0;
        for b in &results {
            for (acc, a) in attribution.iter_mut().zip(b.attribution.iter()) {
                *acc += b.weight * a;
            }
            baseline_output += b.weight * b.baseline_output;
        }
        let attribution = FeatureVector::from_vec(attribution);
        let completeness_error = (attribution.sum() - (input_output - baseline_output)).abs();

        if completeness_error > self.config.tolerance {
            tracing::warn!(
                completeness_error,
                tolerance = self.config.tolerance,
                n_steps = self.config.n_steps,
                "completeness error exceeds tolerance; consider more steps"
            );
        }
        tracing::info!(
            baselines = results.len(),
            features = dim,
            completeness_error,
            "explanation complete"
        );

        Ok(ExplanationResult {
            attribution,
            completeness_error,
            tolerance: self.config.tolerance,
            input_output,
            baseline_output,
            k: graph.k(),
            n_steps: self.config.n_steps,
            baselines: results,
        })
    }

    fn check_request<M: Model + ?Sized>(
        &self,
        model: &M,
        input: &FeatureVector,
        baselines: &[FeatureVector],
    ) -> Result<()> {
        self.config.validate()?;
        if baselines.is_empty() {
            return Err(GeodesicError::invalid_config(
                "baselines",
                0,
                "at least one baseline",
            ));
        }
        input.check_dim("input", model.n_features())?;
        for (i, baseline) in baselines.iter().enumerate() {
            baseline.check_dim(&format!("baselines[{i}]"), input.len())?;
        }
        Ok(())
    }

    fn check_graph(&self, graph: &CorpusGraph) -> Result<()> {
        let expected = (self.config.k, &self.config.metric, &self.config.neighbor_search);
        let actual = (graph.requested_k(), graph.metric(), graph.search());
        if expected != actual {
            return Err(GeodesicError::invalid_config(
                "graph",
                format!("k={} metric={} search={:?}", actual.0, actual.1.name(), actual.2),
                format!(
                    "a graph built with k={} metric={} search={:?}",
                    expected.0,
                    expected.1.name(),
                    expected.2
                ),
            ));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn explain_baseline<M: Model + ?Sized>(
        &self,
        model: &M,
        input: &FeatureVector,
        baseline: &FeatureVector,
        index: usize,
        weight: f64,
        input_output: f64,
        graph: &CorpusGraph,
    ) -> Result<BaselineAttribution> {
        let token = self.cancel.as_ref();
        let metric = &self.config.metric;

        let path = {
            let request = graph
                .attach(baseline, input)
                .map_err(|e| e.at_baseline(index, Stage::GraphConstruction))?;
            cancel::check(token)?;
            match GeodesicPathFinder::new().find(&request) {
                Ok(path) => path,
                Err(e) if e.is_no_path() && self.config.no_path == NoPathPolicy::StraightLine => {
                    tracing::warn!(
                        baseline = index,
                        k = graph.k(),
                        "no graph path to input; falling back to straight line"
                    );
                    straight_fallback(baseline, input, metric)
                        .map_err(|e| e.at_baseline(index, Stage::PathFinding))?
                }
                Err(e) => return Err(e.at_baseline(index, Stage::PathFinding)),
            }
        };

        let discretizer = PathDiscretizer::new(self.config.n_steps).with_metric(metric.clone());
        let mut samples = discretizer
            .discretize_with_cancel(&path, token)
            .map_err(|e| e.at_baseline(index, Stage::Discretization))?;

        let nodes = path.nodes().to_vec();
        let mut path = path;
        let mut refinement = None;
        if let Some(refiner) = &self.config.refinement {
            let (points, report) = refiner
                .refine(model, &samples, token)
                .map_err(|e| e.at_baseline(index, Stage::Refinement))?
                .into_parts();
            path = path
                .with_points(points, metric)
                .map_err(|e| e.at_baseline(index, Stage::Refinement))?;
            samples = discretizer
                .discretize_with_cancel(&path, token)
                .map_err(|e| e.at_baseline(index, Stage::Discretization))?;
            refinement = Some(report);
        }

        let outcome = GradientIntegrator::new()
            .with_rule(self.config.quadrature)
            .integrate_with_cancel(model, &samples, token)
            .map_err(|e| e.at_baseline(index, Stage::Integration))?;

        let baseline_output = model.evaluate(baseline).map_err(|source| {
            GeodesicError::ModelEvaluation { source }.at_baseline(index, Stage::Evaluation)
        })?;
        let completeness_error =
            (outcome.attribution().sum() - (input_output - baseline_output)).abs();

        tracing::debug!(
            baseline = index,
            path_nodes = nodes.len(),
            path_length = path.length(),
            completeness_error,
            "baseline attribution computed"
        );

        let gradient_evaluations = outcome.gradient_evaluations();
        Ok(BaselineAttribution {
            index,
            weight,
            attribution: outcome.into_attribution(),
            baseline_output,
            completeness_error,
            gradient_evaluations,
            path: PathSummary {
                kind: path.kind(),
                nodes,
                length: path.length(),
                n_points: samples.len(),
                samples: self.config.record_paths.then(|| samples.into_points()),
                refinement,
            },
        })
    }
}

fn straight_fallback(
    baseline: &FeatureVector,
    input: &FeatureVector,
    metric: &DistanceMetric,
) -> Result<GeodesicPath> {
    Ok(GeodesicPath::straight_line(baseline, input, metric)?.into_fallback())
}

/// Explain `model` at `input` with default options apart from `k`,
/// `n_steps` and `metric`.
///
/// # Errors
/// See [`AttributionEngine::explain`].
pub fn explain<M: Model + ?Sized>(
    input: &FeatureVector,
    baselines: &[FeatureVector],
    k: usize,
    n_steps: usize,
    metric: DistanceMetric,
    model: &M,
    corpus: &ReferenceCorpus,
) -> Result<ExplanationResult> {
    let config = GeodesicConfig::new()
        .with_k(k)
        .with_n_steps(n_steps)
        .with_metric(metric);
    AttributionEngine::new(config).explain(model, input, baselines, corpus)
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
