//! Immutable fixed-dimension feature vector.

use serde::{Deserialize, Serialize};
use std::ops::Index;

use crate::error::{GeodesicError, Result};

/// Fixed-dimension `f64` feature vector.
///
/// There are no mutable accessors: arithmetic helpers always return a new
/// vector, so a vector handed to the pipeline can never change under it.
///
/// # Examples
///
/// ```
/// use aprender_geodesic::primitives::FeatureVector;
///
/// let a = FeatureVector::from_slice(&[0.0, 2.0]);
/// let b = FeatureVector::from_slice(&[4.0, 2.0]);
/// let mid = a.lerp(&b, 0.5);
/// assert_eq!(mid.as_slice(), &[2.0, 2.0]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector {
    data: Vec<f64>,
}

impl FeatureVector {
    /// Create from a slice.
    #[must_use]
    pub fn from_slice(data: &[f64]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    /// Create from an owned vector.
    #[must_use]
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self { data }
    }

    /// All-zero vector of the given dimension.
    #[must_use]
    pub fn zeros(dim: usize) -> Self {
        Self {
            data: vec![0.0; dim],
        }
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for a zero-dimensional vector.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the underlying values.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Iterate over the values.
    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.data.iter()
    }

    /// Consume into the underlying vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Sequential left-to-right sum.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Fail with `ShapeMismatch` unless `self.len() == expected`.
    pub fn check_dim(&self, context: &str, expected: usize) -> Result<()> {
        if self.len() == expected {
            Ok(())
        } else {
            Err(GeodesicError::dimension_mismatch(context, expected, self.len()))
        }
    }

    /// Element-wise `self - other`.
    ///
    /// # Panics
    /// Panics if the dimensions differ.
    #[must_use]
    pub fn sub(&self, other: &Self) -> Self {
        assert_eq!(self.len(), other.len(), "vector dimensions must match");
        Self {
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| a - b)
                .collect(),
        }
    }

    /// Element-wise `self + other`.
    ///
    /// # Panics
    /// Panics if the dimensions differ.
    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        assert_eq!(self.len(), other.len(), "vector dimensions must match");
        Self {
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| a + b)
                .collect(),
        }
    }

    /// Element-wise product.
    ///
    /// # Panics
    /// Panics if the dimensions differ.
    #[must_use]
    pub fn hadamard(&self, other: &Self) -> Self {
        assert_eq!(self.len(), other.len(), "vector dimensions must match");
        Self {
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| a * b)
                .collect(),
        }
    }

    /// Multiply every component by `factor`.
    #[must_use]
    pub fn scale(&self, factor: f64) -> Self {
        Self {
            data: self.data.iter().map(|v| v * factor).collect(),
        }
    }

    /// Linear interpolation `self + t * (other - self)`.
    ///
    /// `t = 0` returns `self` exactly and `t = 1` returns `other` exactly.
    ///
    /// # Panics
    /// Panics if the dimensions differ.
    #[must_use]
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        assert_eq!(self.len(), other.len(), "vector dimensions must match");
        if t == 0.0 {
            return self.clone();
        }
        if t == 1.0 {
            return other.clone();
        }
        Self {
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| a + t * (b - a))
                .collect(),
        }
    }

    /// Midpoint `(self + other) / 2`.
    #[must_use]
    pub fn midpoint(&self, other: &Self) -> Self {
        self.lerp(other, 0.5)
    }

    /// True if every component is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

impl Index<usize> for FeatureVector {
    type Output = f64;

    fn index(&self, idx: usize) -> &f64 {
        &self.data[idx]
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(data: Vec<f64>) -> Self {
        Self::from_vec(data)
    }
}

impl From<&[f64]> for FeatureVector {
    fn from(data: &[f64]) -> Self {
        Self::from_slice(data)
    }
}

impl<const N: usize> From<[f64; N]> for FeatureVector {
    fn from(data: [f64; N]) -> Self {
        Self::from_vec(data.to_vec())
    }
}

impl AsRef<[f64]> for FeatureVector {
    fn as_ref(&self) -> &[f64] {
        &self.data
    }
}

impl<'a> IntoIterator for &'a FeatureVector {
    type Item = &'a f64;
    type IntoIter = std::slice::Iter<'a, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}
