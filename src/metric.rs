//! Pairwise distance metrics over feature vectors.
//!
//! Metrics are a closed set of variants. Every variant is induced by a norm,
//! so distance grows linearly along a straight segment; the path
//! discretizer relies on this to resample segments uniformly.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::{GeodesicError, Result};
use crate::primitives::{FeatureVector, ReferenceCorpus};

/// Distance metric used for graph edge weights and path arc length.
///
/// # Examples
///
/// ```
/// use aprender_geodesic::metric::DistanceMetric;
/// use aprender_geodesic::primitives::FeatureVector;
///
/// let a = FeatureVector::from_slice(&[0.0, 0.0]);
/// let b = FeatureVector::from_slice(&[3.0, 4.0]);
/// assert_eq!(DistanceMetric::Euclidean.distance(&a, &b).unwrap(), 5.0);
/// assert_eq!(DistanceMetric::Manhattan.distance(&a, &b).unwrap(), 7.0);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean distance: `sqrt(sum((a_i - b_i)^2))`
    #[default]
    Euclidean,
    /// Manhattan distance: `sum(|a_i - b_i|)`
    Manhattan,
    /// Chebyshev distance: `max(|a_i - b_i|)`
    Chebyshev,
    /// Minkowski distance with parameter `p >= 1`
    Minkowski(f64),
    /// Euclidean distance after scaling feature `i` by `inv_scale[i]`
    Standardized {
        /// Per-feature multiplicative scale (typically `1 / std`)
        inv_scale: Vec<f64>,
    },
}

impl DistanceMetric {
    /// Standardized Euclidean metric fitted to a corpus.
    ///
    /// Each feature is divided by its standard deviation over the corpus.
    /// Features with zero (or non-finite) spread keep unit scale.
    ///
    /// # Errors
    /// `EmptyCorpus` if the corpus has no points.
    pub fn standardized(corpus: &ReferenceCorpus) -> Result<Self> {
        if corpus.is_empty() {
            return Err(GeodesicError::EmptyCorpus);
        }
        let inv_scale = corpus
            .feature_std()
            .into_iter()
            .map(|s| if s > 0.0 && s.is_finite() { 1.0 / s } else { 1.0 })
            .collect();
        Ok(Self::Standardized { inv_scale })
    }

    /// Check that the metric parameters are usable.
    ///
    /// # Errors
    /// `InvalidConfig` for `p < 1` or scales that are not finite and positive.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Minkowski(p) if !(p.is_finite() && *p >= 1.0) => Err(
                GeodesicError::invalid_config("minkowski p", p, "finite p >= 1"),
            ),
            Self::Standardized { inv_scale }
                if inv_scale.iter().any(|s| !(s.is_finite() && *s > 0.0)) =>
            {
                Err(GeodesicError::invalid_config(
                    "inv_scale",
                    format!("{inv_scale:?}"),
                    "finite positive scales",
                ))
            }
            _ => Ok(()),
        }
    }

    /// Distance between two vectors.
    ///
    /// # Errors
    /// `ShapeMismatch` if the dimensions differ (or do not match the
    /// standardized scale vector).
    pub fn distance(&self, a: &FeatureVector, b: &FeatureVector) -> Result<f64> {
        b.check_dim("distance operand", a.len())?;
        if let Self::Standardized { inv_scale } = self {
            a.check_dim("standardized metric", inv_scale.len())?;
        }
        Ok(self.distance_unchecked(a.as_slice(), b.as_slice()))
    }

    /// Distance without dimension checks; callers guarantee equal lengths.
    pub(crate) fn distance_unchecked(&self, a: &[f64], b: &[f64]) -> f64 {
        let diffs = a.iter().zip(b).map(|(x, y)| (x - y).abs());
        match self {
            Self::Euclidean => diffs.map(|d| d * d).sum::<f64>().sqrt(),
            Self::Manhattan => diffs.sum(),
            Self::Chebyshev => diffs.fold(0.0, f64::max),
            Self::Minkowski(p) => diffs.map(|d| d.powf(*p)).sum::<f64>().powf(1.0 / p),
            Self::Standardized { inv_scale } => diffs
                .zip(inv_scale)
                .map(|(d, s)| {
                    let scaled = d * s;
                    scaled * scaled
                })
                .sum::<f64>()
                .sqrt(),
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Euclidean => "euclidean",
            Self::Manhattan => "manhattan",
            Self::Chebyshev => "chebyshev",
            Self::Minkowski(_) => "minkowski",
            Self::Standardized { .. } => "standardized",
        }
    }

    /// Deterministic identity of the metric including its parameters.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.name().hash(&mut hasher);
        match self {
            Self::Minkowski(p) => p.to_bits().hash(&mut hasher),
            Self::Standardized { inv_scale } => {
                for s in inv_scale {
                    s.to_bits().hash(&mut hasher);
                }
            }
            _ => {}
        }
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (FeatureVector, FeatureVector) {
        (
            FeatureVector::from_slice(&[1.0, -2.0, 0.5]),
            FeatureVector::from_slice(&[-1.0, 2.0, 2.5]),
        )
    }

    #[test]
    fn test_known_distances() {
        let (a, b) = pair();
        // diffs = [2, 4, 2]
        let euclid = DistanceMetric::Euclidean.distance(&a, &b).expect("dist");
        assert!((euclid - 24.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!(DistanceMetric::Manhattan.distance(&a, &b).expect("dist"), 8.0);
        assert_eq!(DistanceMetric::Chebyshev.distance(&a, &b).expect("dist"), 4.0);
        let mink1 = DistanceMetric::Minkowski(1.0).distance(&a, &b).expect("dist");
        assert!((mink1 - 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_symmetry_and_identity() {
        let (a, b) = pair();
        let metrics = [
            DistanceMetric::Euclidean,
            DistanceMetric::Manhattan,
            DistanceMetric::Chebyshev,
            DistanceMetric::Minkowski(3.0),
            DistanceMetric::Standardized {
                inv_scale: vec![1.0, 0.5, 2.0],
            },
        ];
        for m in &metrics {
            let ab = m.distance(&a, &b).expect("dist");
            let ba = m.distance(&b, &a).expect("dist");
            assert_eq!(ab, ba, "{} not symmetric", m.name());
            assert_eq!(m.distance(&a, &a).expect("dist"), 0.0);
            assert!(ab >= 0.0);
        }
    }

    #[test]
    fn test_homogeneous_along_segment() {
        let (a, b) = pair();
        let m = DistanceMetric::Minkowski(3.0);
        let quarter = a.lerp(&b, 0.25);
        let full = m.distance(&a, &b).expect("dist");
        let part = m.distance(&a, &quarter).expect("dist");
        assert!((part - 0.25 * full).abs() < 1e-12);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = FeatureVector::from_slice(&[1.0, 2.0]);
        let b = FeatureVector::from_slice(&[1.0]);
        let err = DistanceMetric::Euclidean.distance(&a, &b).unwrap_err();
        assert!(matches!(err, GeodesicError::ShapeMismatch { .. }));

        let m = DistanceMetric::Standardized {
            inv_scale: vec![1.0],
        };
        assert!(m.distance(&a, &a).is_err());
    }

    #[test]
    fn test_standardized_from_corpus() {
        let corpus = ReferenceCorpus::from_rows(&[vec![0.0, 1.0], vec![4.0, 1.0]])
            .expect("corpus");
        let m = DistanceMetric::standardized(&corpus).expect("metric");
        match &m {
            DistanceMetric::Standardized { inv_scale } => {
                assert!((inv_scale[0] - 0.5).abs() < 1e-12);
                assert_eq!(inv_scale[1], 1.0);
            }
            other => panic!("unexpected metric {other:?}"),
        }
        let d = m
            .distance(
                &FeatureVector::from_slice(&[0.0, 0.0]),
                &FeatureVector::from_slice(&[4.0, 0.0]),
            )
            .expect("dist");
        assert!((d - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_standardized_empty_corpus() {
        let corpus = ReferenceCorpus::new(Vec::new()).expect("corpus");
        assert!(matches!(
            DistanceMetric::standardized(&corpus),
            Err(GeodesicError::EmptyCorpus)
        ));
    }

    #[test]
    fn test_validate() {
        assert!(DistanceMetric::Euclidean.validate().is_ok());
        assert!(DistanceMetric::Minkowski(2.0).validate().is_ok());
        assert!(DistanceMetric::Minkowski(0.5).validate().is_err());
        assert!(DistanceMetric::Minkowski(f64::NAN).validate().is_err());
        let bad = DistanceMetric::Standardized {
            inv_scale: vec![1.0, -1.0],
        };
        assert!(bad.validate().is_err());
        let zero = DistanceMetric::Standardized {
            inv_scale: vec![1.0, 0.0],
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_fingerprint_distinguishes_parameters() {
        assert_eq!(
            DistanceMetric::Minkowski(2.0).fingerprint(),
            DistanceMetric::Minkowski(2.0).fingerprint()
        );
        assert_ne!(
            DistanceMetric::Minkowski(2.0).fingerprint(),
            DistanceMetric::Minkowski(3.0).fingerprint()
        );
        assert_ne!(
            DistanceMetric::Euclidean.fingerprint(),
            DistanceMetric::Manhattan.fingerprint()
        );
    }
}
