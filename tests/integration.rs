//! End-to-end attribution tests.

use aprender_geodesic::prelude::*;
use aprender_geodesic::error::ModelError;
use approx::assert_abs_diff_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn fv(values: &[f64]) -> FeatureVector {
    FeatureVector::from_slice(values)
}

fn uniform_corpus(n: usize, seed: u64) -> ReferenceCorpus {
    let mut rng = StdRng::seed_from_u64(seed);
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|_| vec![rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)])
        .collect();
    ReferenceCorpus::from_rows(&rows).expect("corpus")
}

fn grid_corpus(side: u32) -> ReferenceCorpus {
    let step = 1.0 / f64::from(side - 1);
    let rows: Vec<Vec<f64>> = (0..side)
        .flat_map(|i| (0..side).map(move |j| vec![f64::from(i) * step, f64::from(j) * step]))
        .collect();
    ReferenceCorpus::from_rows(&rows).expect("corpus")
}

/// Points `(t, t²)` at uniform `t` from the origin to `(1, 1)`.
///
/// Consecutive chords grow strictly along the parabola, so every point's
/// nearest neighbor is its predecessor and the graph is one chain for any k.
fn parabola_corpus(n: u32) -> ReferenceCorpus {
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let t = f64::from(i) / f64::from(n - 1);
            vec![t, t * t]
        })
        .collect();
    ReferenceCorpus::from_rows(&rows).expect("corpus")
}

/// f(x) = sin(2 x0) * exp(x1)
fn smooth_model() -> impl Model {
    FnModel::new(
        2,
        |x: &FeatureVector| (2.0 * x[0]).sin() * x[1].exp(),
        |x: &FeatureVector| {
            fv(&[
                2.0 * (2.0 * x[0]).cos() * x[1].exp(),
                (2.0 * x[0]).sin() * x[1].exp(),
            ])
        },
    )
}

#[test]
fn test_linear_scenario_recovers_weights() {
    let corpus = parabola_corpus(50);
    let model = LinearModel::new(fv(&[3.0, -2.0]));
    let input = fv(&[1.0, 1.0]);
    let baseline = fv(&[0.0, 0.0]);

    for k in [3, 5, 10] {
        for n_steps in [10, 25] {
            let config = GeodesicConfig::new().with_k(k).with_n_steps(n_steps);
            let result = AttributionEngine::new(config)
                .explain(&model, &input, std::slice::from_ref(&baseline), &corpus)
                .expect("explain");

            let path = &result.baselines()[0].path;
            assert_eq!(path.kind, PathKind::Geodesic, "k={k}");
            assert!(path.nodes.len() > 2, "k={k}");
            assert!(!result.used_fallback());

            assert_abs_diff_eq!(result.attribution()[0], 3.0, epsilon = 1e-9);
            assert_abs_diff_eq!(result.attribution()[1], -2.0, epsilon = 1e-9);
            assert!(result.completeness_error() < 1e-9, "k={k} n_steps={n_steps}");
            assert!(result.is_complete());
        }
    }
}

#[test]
fn test_linear_scenario_on_uniform_corpus() {
    let corpus = uniform_corpus(50, 42);
    let model = LinearModel::new(fv(&[3.0, -2.0]));
    let config = GeodesicConfig::new().with_k(10).with_n_steps(25);
    let result = AttributionEngine::new(config)
        .explain(&model, &fv(&[1.0, 1.0]), &[fv(&[0.0, 0.0])], &corpus)
        .expect("explain");

    assert_eq!(result.baselines()[0].path.kind, PathKind::Geodesic);
    assert_abs_diff_eq!(result.attribution()[0], 3.0, epsilon = 1e-9);
    assert_abs_diff_eq!(result.attribution()[1], -2.0, epsilon = 1e-9);
    assert!(result.completeness_error() < 1e-9);
}

#[test]
fn test_completeness_converges_for_smooth_model() {
    let corpus = grid_corpus(15);
    let model = smooth_model();
    let input = fv(&[0.9, 0.8]);
    let baseline = fv(&[0.05, 0.1]);

    let coarse = explain(&input, &[baseline.clone()], 8, 3, DistanceMetric::Euclidean, &model, &corpus)
        .expect("explain");
    let fine = explain(&input, &[baseline], 8, 400, DistanceMetric::Euclidean, &model, &corpus)
        .expect("explain");

    assert!(fine.completeness_error() < 1e-4, "error {}", fine.completeness_error());
    assert!(fine.is_complete());
    assert!(fine.completeness_error() < coarse.completeness_error());
    assert_eq!(fine.baselines()[0].path.kind, PathKind::Geodesic);
}

#[test]
fn test_results_are_bit_identical() {
    let corpus = uniform_corpus(120, 7);
    let model = smooth_model();
    let input = fv(&[0.85, 0.7]);
    let baselines = [fv(&[0.1, 0.1]), fv(&[0.2, 0.6])];

    for search in [
        NeighborSearch::Exact,
        NeighborSearch::RandomProjection {
            seed: 11,
            n_projections: 3,
            window: 4,
        },
    ] {
        let config = GeodesicConfig::new()
            .with_k(6)
            .with_n_steps(64)
            .with_neighbor_search(search)
            .with_no_path_policy(NoPathPolicy::StraightLine)
            .with_record_paths(true);
        let a = AttributionEngine::new(config.clone())
            .explain(&model, &input, &baselines, &corpus)
            .expect("explain");
        let b = AttributionEngine::new(config)
            .explain(&model, &input, &baselines, &corpus)
            .expect("explain");

        assert_eq!(a, b);
        for (x, y) in a.attribution().iter().zip(b.attribution().iter()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
        assert_eq!(
            serde_json::to_string(&a).expect("json"),
            serde_json::to_string(&b).expect("json")
        );
    }
}

#[test]
fn test_direct_edge_equals_straight_line_integrated_gradients() {
    // Corpus far away: baseline and input are each other's nearest node
    let corpus = ReferenceCorpus::from_rows(&[vec![10.0, 10.0], vec![11.0, 10.0], vec![10.0, 11.0]])
        .expect("corpus");
    let model = smooth_model();
    let input = fv(&[0.7, 0.4]);
    let baseline = fv(&[0.0, 0.1]);

    for rule in [QuadratureRule::Midpoint, QuadratureRule::Left, QuadratureRule::Trapezoid] {
        let config = GeodesicConfig::new().with_k(1).with_n_steps(30).with_quadrature(rule);
        let result = AttributionEngine::new(config)
            .explain(&model, &input, std::slice::from_ref(&baseline), &corpus)
            .expect("explain");
        let summary = &result.baselines()[0].path;
        assert_eq!(summary.kind, PathKind::Geodesic);
        assert_eq!(summary.nodes, vec![3, 4]);

        let reference = integrated_gradients(&model, &input, &baseline, 30, rule).expect("ig");
        assert_eq!(result.attribution(), reference.attribution());
    }
}

#[test]
fn test_swapping_baseline_and_input_negates_attribution() {
    let corpus = uniform_corpus(200, 3);
    let model = smooth_model();
    let a = fv(&[0.1, 0.2]);
    let b = fv(&[0.9, 0.75]);
    let config = GeodesicConfig::new()
        .with_k(8)
        .with_n_steps(100)
        .with_no_path_policy(NoPathPolicy::StraightLine);
    let engine = AttributionEngine::new(config);

    let forward = engine
        .explain(&model, &b, std::slice::from_ref(&a), &corpus)
        .expect("explain");
    let backward = engine
        .explain(&model, &a, std::slice::from_ref(&b), &corpus)
        .expect("explain");

    let mut reversed = backward.baselines()[0].path.nodes.clone();
    reversed.reverse();
    // Node ids swap roles: baseline n <-> input n + 1
    let n = corpus.len();
    for id in &mut reversed {
        if *id == n {
            *id = n + 1;
        } else if *id == n + 1 {
            *id = n;
        }
    }
    assert_eq!(forward.baselines()[0].path.nodes, reversed);

    for i in 0..2 {
        assert_abs_diff_eq!(forward.attribution()[i], -backward.attribution()[i], epsilon = 1e-9);
    }
}

#[test]
fn test_disconnected_clusters() {
    let mut rows = Vec::new();
    for i in 0..10 {
        rows.push(vec![0.05 * f64::from(i), 0.0]);
        rows.push(vec![50.0 + 0.05 * f64::from(i), 0.0]);
    }
    let corpus = ReferenceCorpus::from_rows(&rows).expect("corpus");
    let model = LinearModel::new(fv(&[1.0, 1.0]));
    let input = fv(&[50.2, 0.1]);
    let baseline = fv(&[0.1, 0.1]);

    let err = explain(&input, &[baseline.clone()], 3, 10, DistanceMetric::Euclidean, &model, &corpus)
        .unwrap_err();
    assert!(err.is_no_path());
    assert!(err.to_string().contains("increase k"));

    let config = GeodesicConfig::new()
        .with_k(3)
        .with_n_steps(10)
        .with_no_path_policy(NoPathPolicy::StraightLine);
    let result = AttributionEngine::new(config)
        .explain(&model, &input, &[baseline], &corpus)
        .expect("explain");
    assert!(result.used_fallback());
    assert_abs_diff_eq!(result.attribution()[0], 50.1, epsilon = 1e-9);
    assert_abs_diff_eq!(result.attribution()[1], 0.0, epsilon = 1e-12);

    // A large enough k bridges the clusters
    let bridged = explain(&input, &[fv(&[0.1, 0.1])], 20, 10, DistanceMetric::Euclidean, &model, &corpus)
        .expect("explain");
    assert_eq!(bridged.baselines()[0].path.kind, PathKind::Geodesic);
}

#[test]
fn test_mean_of_baselines_matches_individual_runs() {
    let corpus = grid_corpus(9);
    let model = smooth_model();
    let input = fv(&[0.8, 0.9]);
    let baselines = [fv(&[0.0, 0.0]), fv(&[0.5, 0.1]), fv(&[0.1, 0.7])];
    let config = GeodesicConfig::new().with_k(6).with_n_steps(40);
    let engine = AttributionEngine::new(config);

    let combined = engine.explain(&model, &input, &baselines, &corpus).expect("explain");
    let mut expected = [0.0; 2];
    for (i, baseline) in baselines.iter().enumerate() {
        let single = engine
            .explain(&model, &input, std::slice::from_ref(baseline), &corpus)
            .expect("explain");
        assert_eq!(
            single.attribution(),
            &combined.baselines()[i].attribution,
            "baseline {i}"
        );
        for (e, a) in expected.iter_mut().zip(single.attribution().iter()) {
            *e += a / 3.0;
        }
    }
    for i in 0..2 {
        assert_abs_diff_eq!(combined.attribution()[i], expected[i], epsilon = 1e-12);
    }
}

#[test]
fn test_cancellation_during_integration() {
    struct CancelsOnGradient {
        token: CancellationToken,
    }

    impl Model for CancelsOnGradient {
        fn n_features(&self) -> usize {
            2
        }

        fn evaluate(&self, x: &FeatureVector) -> Result<f64, ModelError> {
            Ok(x.sum())
        }

        fn gradient(&self, _x: &FeatureVector) -> Result<FeatureVector, ModelError> {
            self.token.cancel();
            Ok(fv(&[1.0, 1.0]))
        }
    }

    let token = CancellationToken::new();
    let model = CancelsOnGradient {
        token: token.clone(),
    };
    let engine = AttributionEngine::new(GeodesicConfig::new().with_k(4).with_n_steps(20))
        .with_cancellation(token);
    let err = engine
        .explain(&model, &fv(&[1.0, 1.0]), &[fv(&[0.0, 0.0])], &grid_corpus(6))
        .unwrap_err();
    assert!(matches!(err, GeodesicError::Cancelled));
}

#[test]
fn test_targeted_multi_output_model() {
    struct Softmax2;

    impl MultiOutputModel for Softmax2 {
        fn n_features(&self) -> usize {
            2
        }

        fn n_outputs(&self) -> usize {
            2
        }

        fn evaluate(&self, x: &FeatureVector) -> Result<Vec<f64>, ModelError> {
            let p = 1.0 / (1.0 + (x[1] - x[0]).exp());
            Ok(vec![p, 1.0 - p])
        }

        fn gradient(&self, x: &FeatureVector, output: usize) -> Result<FeatureVector, ModelError> {
            let p = 1.0 / (1.0 + (x[1] - x[0]).exp());
            let d = p * (1.0 - p);
            Ok(match output {
                0 => fv(&[d, -d]),
                _ => fv(&[-d, d]),
            })
        }
    }

    let corpus = grid_corpus(8);
    let input = fv(&[0.9, 0.2]);
    let baseline = [fv(&[0.1, 0.1])];
    let config = GeodesicConfig::new().with_k(5).with_n_steps(200);
    let engine = AttributionEngine::new(config);

    let first = engine
        .explain(&Targeted::new(Softmax2, 0).expect("target"), &input, &baseline, &corpus)
        .expect("explain");
    let second = engine
        .explain(&Targeted::new(Softmax2, 1).expect("target"), &input, &baseline, &corpus)
        .expect("explain");

    assert!(first.is_complete());
    // Outputs sum to one, so attributions for the two classes cancel
    for i in 0..2 {
        assert_abs_diff_eq!(first.attribution()[i], -second.attribution()[i], epsilon = 1e-12);
    }
}

#[test]
fn test_numerical_gradient_close_to_analytic() {
    let corpus = grid_corpus(10);
    let analytic = smooth_model();
    let numeric = NumericalGradient::new(2, |x: &FeatureVector| (2.0 * x[0]).sin() * x[1].exp());
    let input = fv(&[0.7, 0.9]);
    let baseline = [fv(&[0.0, 0.0])];
    let engine = AttributionEngine::new(GeodesicConfig::new().with_k(5).with_n_steps(50));

    let a = engine.explain(&analytic, &input, &baseline, &corpus).expect("explain");
    let b = engine.explain(&numeric, &input, &baseline, &corpus).expect("explain");
    assert_eq!(a.baselines()[0].path.nodes, b.baselines()[0].path.nodes);
    for i in 0..2 {
        assert_abs_diff_eq!(a.attribution()[i], b.attribution()[i], epsilon = 1e-6);
    }
}

#[test]
fn test_standardized_metric_from_corpus() {
    // Second feature spans a range 100x wider than the first
    let rows: Vec<Vec<f64>> = (0..60)
        .map(|i| {
            let t = f64::from(i) / 59.0;
            vec![t, 100.0 * (1.0 - t) * t]
        })
        .collect();
    let corpus = ReferenceCorpus::from_rows(&rows).expect("corpus");
    let metric = DistanceMetric::standardized(&corpus).expect("metric");
    let model = LinearModel::new(fv(&[1.0, 0.01]));

    let config = GeodesicConfig::new().with_k(4).with_n_steps(30).with_metric(metric);
    let result = AttributionEngine::new(config)
        .explain(&model, &fv(&[1.0, 0.0]), &[fv(&[0.0, 0.0])], &corpus)
        .expect("explain");
    assert_abs_diff_eq!(result.attribution()[0], 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(result.attribution()[1], 0.0, epsilon = 1e-9);
    assert!(result.baselines()[0].path.nodes.len() > 2);
}

#[test]
fn test_shared_graph_across_threads() {
    let corpus = grid_corpus(8);
    let config = GeodesicConfig::new().with_k(4).with_n_steps(20);
    let mut cache = GraphCache::new();
    let graph = cache.get_or_build_for(&config, &corpus).expect("graph");
    let engine = AttributionEngine::new(config);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let graph = std::sync::Arc::clone(&graph);
            let engine = engine.clone();
            std::thread::spawn(move || {
                let model = LinearModel::new(fv(&[1.0, -1.0]));
                let input = fv(&[0.2 * f64::from(i) + 0.3, 0.9]);
                engine
                    .explain_with_graph(&model, &input, &[fv(&[0.0, 0.0])], &graph)
                    .expect("explain")
                    .completeness_error()
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().expect("thread") < 1e-9);
    }
}
