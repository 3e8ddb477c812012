//! Caller-owned cache of corpus neighbor graphs.
//!
//! Building the k-NN graph is the O(N²) part of a request. When many inputs
//! are explained against the same corpus, build the graph once and reuse
//! it: graphs are immutable and handed out as `Arc<CorpusGraph>`, so they can
//! be shared across threads. The cache is an explicit value owned by the
//! caller; nothing is cached behind the caller's back.
//!
//! # Examples
//!
//! ```
//! use aprender_geodesic::cache::GraphCache;
//! use aprender_geodesic::graph::NeighborGraphBuilder;
//! use aprender_geodesic::primitives::ReferenceCorpus;
//!
//! let corpus = ReferenceCorpus::from_rows(&[vec![0.0], vec![1.0], vec![2.0]]).unwrap();
//! let builder = NeighborGraphBuilder::new(1);
//! let mut cache = GraphCache::new();
//!
//! let first = cache.get_or_build(&corpus, &builder).unwrap();
//! let second = cache.get_or_build(&corpus, &builder).unwrap();
//! assert!(std::sync::Arc::ptr_eq(&first, &second));
//! assert_eq!(cache.stats().hits, 1);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::GeodesicConfig;
use crate::error::Result;
use crate::graph::{CorpusGraph, NeighborGraphBuilder};
use crate::primitives::ReferenceCorpus;

/// Identity of a corpus graph: corpus content plus every build parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphKey {
    /// Corpus content fingerprint
    pub corpus: u64,
    /// Requested neighbor count
    pub k: usize,
    /// Metric fingerprint
    pub metric: u64,
    /// Neighbor search fingerprint
    pub search: u64,
}

impl GraphKey {
    /// Key for building `corpus` with `builder`.
    #[must_use]
    pub fn new(corpus: &ReferenceCorpus, builder: &NeighborGraphBuilder) -> Self {
        Self {
            corpus: corpus.fingerprint(),
            k: builder.k(),
            metric: builder.metric().fingerprint(),
            search: builder.search().fingerprint(),
        }
    }

    /// Key of an already built graph.
    #[must_use]
    pub fn of(graph: &CorpusGraph) -> Self {
        Self {
            corpus: graph.corpus_fingerprint(),
            k: graph.requested_k(),
            metric: graph.metric().fingerprint(),
            search: graph.search().fingerprint(),
        }
    }
}

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that built a graph
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache (0 when unused).
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Map from [`GraphKey`] to shared corpus graphs.
#[derive(Debug, Default)]
pub struct GraphCache {
    graphs: HashMap<GraphKey, Arc<CorpusGraph>>,
    stats: CacheStats,
}

impl GraphCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached graph for `corpus` and `builder`, building it on a miss.
    ///
    /// # Errors
    /// Graph construction errors; nothing is cached on failure.
    pub fn get_or_build(
        &mut self,
        corpus: &ReferenceCorpus,
        builder: &NeighborGraphBuilder,
    ) -> Result<Arc<CorpusGraph>> {
        let key = GraphKey::new(corpus, builder);
        if let Some(graph) = self.graphs.get(&key) {
            self.stats.hits += 1;
            tracing::debug!(corpus = key.corpus, k = key.k, "graph cache hit");
            return Ok(Arc::clone(graph));
        }

        self.stats.misses += 1;
        let graph = Arc::new(builder.build(corpus)?);
        tracing::debug!(corpus = key.corpus, k = key.k, "graph cache miss, built graph");
        self.graphs.insert(key, Arc::clone(&graph));
        Ok(graph)
    }

    /// Cached graph matching an engine configuration.
    ///
    /// # Errors
    /// Configuration and graph construction errors.
    pub fn get_or_build_for(
        &mut self,
        config: &GeodesicConfig,
        corpus: &ReferenceCorpus,
    ) -> Result<Arc<CorpusGraph>> {
        config.validate()?;
        let builder = NeighborGraphBuilder::new(config.k)
            .with_metric(config.metric.clone())
            .with_search(config.neighbor_search.clone());
        self.get_or_build(corpus, &builder)
    }

    /// Store a graph built elsewhere, replacing any graph with the same key.
    pub fn insert(&mut self, graph: Arc<CorpusGraph>) {
        self.graphs.insert(GraphKey::of(&graph), graph);
    }

    /// Cached graph for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &GraphKey) -> Option<Arc<CorpusGraph>> {
        self.graphs.get(key).cloned()
    }

    /// Drop every graph built from the corpus with this fingerprint.
    ///
    /// Returns the number of graphs removed.
    pub fn invalidate_corpus(&mut self, corpus_fingerprint: u64) -> usize {
        let before = self.graphs.len();
        self.graphs.retain(|key, _| key.corpus != corpus_fingerprint);
        before - self.graphs.len()
    }

    /// Number of cached graphs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    /// True if no graph is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Drop all graphs. Counters are kept.
    pub fn clear(&mut self) {
        self.graphs.clear();
    }

    /// Hit and miss counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
