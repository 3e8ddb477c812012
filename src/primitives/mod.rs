//! Core data primitives: feature vectors and the reference corpus.
//!
//! [`FeatureVector`] is immutable once built; the pipeline only ever derives
//! new vectors from existing ones. [`ReferenceCorpus`] is the caller-owned
//! background point cloud that approximates the data manifold.

mod corpus;
mod vector;

pub use corpus::ReferenceCorpus;
pub use vector::FeatureVector;
