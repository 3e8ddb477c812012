//! Reference corpus: the background point cloud.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::FeatureVector;
use crate::error::{GeodesicError, Result};

/// Ordered, read-only collection of same-dimension feature vectors.
///
/// The corpus carries a content fingerprint computed at construction. Two
/// corpora with the same points in the same order share a fingerprint, which
/// is what [`GraphCache`](crate::cache::GraphCache) keys on.
///
/// An empty corpus is representable; graph construction rejects it with
/// [`GeodesicError::EmptyCorpus`].
///
/// # Examples
///
/// ```
/// use aprender_geodesic::primitives::ReferenceCorpus;
///
/// let corpus = ReferenceCorpus::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
/// assert_eq!(corpus.len(), 2);
/// assert_eq!(corpus.dim(), Some(2));
/// ```
#[derive(Debug, Clone)]
pub struct ReferenceCorpus {
    points: Vec<FeatureVector>,
    dim: Option<usize>,
    fingerprint: u64,
}

impl ReferenceCorpus {
    /// Build a corpus, checking that every point has the same dimension.
    ///
    /// # Errors
    /// `ShapeMismatch` if any point differs in dimension from the first.
    pub fn new(points: Vec<FeatureVector>) -> Result<Self> {
        let dim = points.first().map(FeatureVector::len);
        if let Some(expected) = dim {
            for (i, p) in points.iter().enumerate() {
                if p.len() != expected {
                    return Err(GeodesicError::dimension_mismatch(
                        &format!("corpus[{i}]"),
                        expected,
                        p.len(),
                    ));
                }
            }
        }
        let fingerprint = fingerprint_points(&points);
        Ok(Self {
            points,
            dim,
            fingerprint,
        })
    }

    /// Build from raw rows.
    ///
    /// # Errors
    /// `ShapeMismatch` on ragged rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        Self::new(rows.iter().map(|r| FeatureVector::from_slice(r)).collect())
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if the corpus has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Feature dimension, `None` for an empty corpus.
    #[must_use]
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    /// Point at `idx`.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&FeatureVector> {
        self.points.get(idx)
    }

    /// All points in order.
    #[must_use]
    pub fn points(&self) -> &[FeatureVector] {
        &self.points
    }

    /// Iterate over the points in order.
    pub fn iter(&self) -> std::slice::Iter<'_, FeatureVector> {
        self.points.iter()
    }

    /// Content fingerprint (order-sensitive).
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Per-feature population standard deviation.
    ///
    /// Returns an empty vector for an empty corpus.
    #[must_use]
    pub fn feature_std(&self) -> Vec<f64> {
        let Some(dim) = self.dim else {
            return Vec::new();
        };
        let n = self.points.len() as f64;
        let mut mean = vec![0.0; dim];
        for p in &self.points {
            for (m, v) in mean.iter_mut().zip(p.iter()) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }
        let mut var = vec![0.0; dim];
        for p in &self.points {
            for ((s, v), m) in var.iter_mut().zip(p.iter()).zip(&mean) {
                let d = v - m;
                *s += d * d;
            }
        }
        var.into_iter().map(|s| (s / n).sqrt()).collect()
    }
}

fn fingerprint_points(points: &[FeatureVector]) -> u64 {
    let mut hasher = DefaultHasher::new();
    points.len().hash(&mut hasher);
    for p in points {
        p.len().hash(&mut hasher);
        for v in p.iter() {
            v.to_bits().hash(&mut hasher);
        }
    }
    hasher.finish()
}
