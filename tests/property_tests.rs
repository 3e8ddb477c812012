//! Property-based tests using proptest.
//!
//! These tests verify invariants of graph construction, path discretization
//! and attribution over randomly generated corpora.

use aprender_geodesic::graph::WeightedAdjacency;
use aprender_geodesic::path::shortest_path;
use aprender_geodesic::prelude::*;
use proptest::prelude::*;

// Strategy for 2-D points in a bounded box
fn point_strategy() -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(-10.0f64..10.0, 2)
}

fn corpus_strategy() -> impl Strategy<Value = ReferenceCorpus> {
    proptest::collection::vec(point_strategy(), 3..30)
        .prop_map(|rows| ReferenceCorpus::from_rows(&rows).expect("Test data should be valid"))
}

fn metric_strategy() -> impl Strategy<Value = DistanceMetric> {
    prop_oneof![
        Just(DistanceMetric::Euclidean),
        Just(DistanceMetric::Manhattan),
        Just(DistanceMetric::Chebyshev),
        (1.0f64..4.0).prop_map(DistanceMetric::Minkowski),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Attribution of an affine model telescopes along any path
    #[test]
    fn linear_attribution_is_exact(
        corpus in corpus_strategy(),
        k in 1usize..6,
        n_steps in 2usize..40,
        metric in metric_strategy(),
        w in point_strategy(),
        input in point_strategy(),
        baseline in point_strategy(),
    ) {
        let model = LinearModel::new(FeatureVector::from_vec(w.clone()));
        let config = GeodesicConfig::new()
            .with_k(k)
            .with_n_steps(n_steps)
            .with_metric(metric)
            .with_no_path_policy(NoPathPolicy::StraightLine);
        let input = FeatureVector::from_vec(input);
        let baseline = FeatureVector::from_vec(baseline);
        let result = AttributionEngine::new(config)
            .explain(&model, &input, std::slice::from_ref(&baseline), &corpus)
            .expect("explain");

        for i in 0..2 {
            let expected = w[i] * (input[i] - baseline[i]);
            prop_assert!((result.attribution()[i] - expected).abs() < 1e-8);
        }
        prop_assert!(result.completeness_error() < 1e-8);
    }

    // Every corpus node keeps at least one neighbor and weights match the metric
    #[test]
    fn graph_edges_are_metric_distances(
        corpus in corpus_strategy(),
        k in 1usize..5,
        metric in metric_strategy(),
    ) {
        let graph = NeighborGraphBuilder::new(k)
            .with_metric(metric.clone())
            .build(&corpus)
            .expect("graph");
        let csr = graph.graph();
        for u in 0..csr.num_nodes() {
            prop_assert!(csr.degree(u) >= 1);
            for (&v, &w) in csr.neighbors(u).iter().zip(csr.neighbor_weights(u)) {
                let d = metric.distance(&corpus.points()[u], &corpus.points()[v]).expect("dist");
                prop_assert_eq!(w, d);
                prop_assert_eq!(csr.edge_weight(v, u), Some(w));
            }
        }
    }

    // Geodesic length is never shorter than the direct distance
    #[test]
    fn geodesic_not_shorter_than_chord(
        corpus in corpus_strategy(),
        k in 1usize..5,
        input in point_strategy(),
        baseline in point_strategy(),
    ) {
        let graph = NeighborGraphBuilder::new(k).build(&corpus).expect("graph");
        let input = FeatureVector::from_vec(input);
        let baseline = FeatureVector::from_vec(baseline);
        let request = graph.attach(&baseline, &input).expect("attach");
        prop_assert_eq!(request.num_nodes(), corpus.len() + 2);

        if let Some((_, length)) = shortest_path(&request, request.baseline_node(), request.input_node()) {
            let chord = DistanceMetric::Euclidean.distance(&baseline, &input).expect("dist");
            prop_assert!(length >= chord - 1e-9);

            let path = GeodesicPathFinder::new().find(&request).expect("path");
            prop_assert!((path.length() - length).abs() < 1e-12);
            prop_assert_eq!(path.start(), &baseline);
            prop_assert_eq!(path.end(), &input);
        }
    }

    // Discretized points are equally spaced along the path
    #[test]
    fn discretization_is_equal_arc_length(
        points in proptest::collection::vec(point_strategy(), 2..8),
        n_steps in 2usize..60,
    ) {
        let points: Vec<FeatureVector> = points.into_iter().map(FeatureVector::from_vec).collect();
        let path = GeodesicPath::from_points(points.clone(), &DistanceMetric::Euclidean).expect("path");
        let samples = PathDiscretizer::new(n_steps).discretize(&path).expect("discretize");

        prop_assert_eq!(samples.len(), n_steps);
        prop_assert_eq!(&samples.points()[0], &points[0]);
        prop_assert_eq!(&samples.points()[n_steps - 1], &points[points.len() - 1]);

        // Chords never exceed the arc spacing, and sum to at most the arc length
        let spacing = path.length() / (n_steps - 1) as f64;
        let mut chord_total = 0.0;
        for pair in samples.points().windows(2) {
            let chord = DistanceMetric::Euclidean.distance(&pair[0], &pair[1]).expect("dist");
            prop_assert!(chord <= spacing + 1e-9);
            chord_total += chord;
        }
        prop_assert!(chord_total <= path.length() + 1e-9);
    }

    // Normalized aggregation weights sum to one
    #[test]
    fn aggregation_weights_normalized(weights in proptest::collection::vec(0.01f64..10.0, 1..8)) {
        let n = weights.len();
        let normalized = BaselineAggregation::Weighted(weights).weights(n).expect("weights");
        let total: f64 = normalized.iter().sum();
        prop_assert!((total - 1.0).abs() < 1e-12);
        prop_assert!(normalized.iter().all(|&w| w >= 0.0));
    }

    // Metrics satisfy the triangle inequality
    #[test]
    fn metric_triangle_inequality(
        a in point_strategy(),
        b in point_strategy(),
        c in point_strategy(),
        metric in metric_strategy(),
    ) {
        let (a, b, c) = (FeatureVector::from_vec(a), FeatureVector::from_vec(b), FeatureVector::from_vec(c));
        let ab = metric.distance(&a, &b).expect("dist");
        let bc = metric.distance(&b, &c).expect("dist");
        let ac = metric.distance(&a, &c).expect("dist");
        prop_assert!(ac <= ab + bc + 1e-9);
    }
}
