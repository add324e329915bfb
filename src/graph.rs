use rayon::prelude::*;
use tracing::debug;

use crate::build::{BuildStats, GraphBuilder};
use crate::config::{GraphConfig, SearchParams};
use crate::predicate::{AcceptAll, Predicate};
use crate::search::{Adjacency, SearchResult, Traversal, TraversalStats};
use crate::store::VectorStore;
use crate::AcornError;

/// Identifier of the node every traversal starts from.
pub(crate) const ENTRY_POINT: u32 = 0;

/// Outgoing edges of one vector.
///
/// `base` and `robust` are disjoint and never contain the node itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Node {
    pub(crate) base: Vec<u32>,
    pub(crate) robust: Vec<u32>,
}

impl Adjacency for [Node] {
    fn node_count(&self) -> usize {
        self.len()
    }

    #[inline]
    fn load_neighbors(&self, id: u32, out: &mut Vec<u32>) {
        let node = &self[id as usize];
        out.clear();
        out.extend_from_slice(&node.base);
        out.extend_from_slice(&node.robust);
    }
}

/// Predicate-aware proximity graph over a [`VectorStore`].
///
/// Every node keeps a diversity-pruned base list of at most `m` edges for
/// navigation and a robust list of at most `m_beta` edges that keeps
/// predicate-matching regions connected when most nodes are filtered out.
#[derive(Debug, Clone)]
pub struct AcornIndex {
    config: GraphConfig,
    store: VectorStore,
    nodes: Vec<Node>,
    entry_point: u32,
    build_stats: Option<BuildStats>,
}

impl AcornIndex {
    /// Build the graph by inserting vectors one at a time in identifier order.
    ///
    /// The result is deterministic for a given store and configuration.
    pub fn build(store: VectorStore, config: GraphConfig) -> Result<Self, AcornError> {
        let (nodes, stats) = GraphBuilder::new(&store, &config)?.run_sequential();
        Ok(Self::from_parts(config, store, nodes, ENTRY_POINT, Some(stats)))
    }

    /// Build the graph with concurrent insertions on the rayon thread pool.
    ///
    /// Degree bounds hold as for [`AcornIndex::build`] but edge sets depend on
    /// scheduling.
    pub fn build_parallel(store: VectorStore, config: GraphConfig) -> Result<Self, AcornError> {
        let (nodes, stats) = GraphBuilder::new(&store, &config)?.run_parallel();
        Ok(Self::from_parts(config, store, nodes, ENTRY_POINT, Some(stats)))
    }

    pub(crate) fn from_parts(
        config: GraphConfig,
        store: VectorStore,
        nodes: Vec<Node>,
        entry_point: u32,
        build_stats: Option<BuildStats>,
    ) -> Self {
        Self {
            config,
            store,
            nodes,
            entry_point,
            build_stats,
        }
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check whether the index is empty. Built and loaded indexes never are.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Dimension of the indexed vectors.
    pub fn dim(&self) -> usize {
        self.store.dim()
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn entry_point(&self) -> usize {
        self.entry_point as usize
    }

    /// Statistics of the construction that produced this index.
    ///
    /// `None` for an index loaded from disk.
    pub fn build_stats(&self) -> Option<&BuildStats> {
        self.build_stats.as_ref()
    }

    /// Base and robust neighbor lists of `id`.
    pub fn neighbors(&self, id: usize) -> Result<(&[u32], &[u32]), AcornError> {
        let node = self.nodes.get(id).ok_or(AcornError::OutOfRange {
            id,
            len: self.nodes.len(),
        })?;
        Ok((node.base.as_slice(), node.robust.as_slice()))
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Search for the nearest neighbours of `query` without filtering.
    pub fn search(
        &self,
        query: &[f32],
        params: &SearchParams,
    ) -> Result<Vec<SearchResult>, AcornError> {
        self.search_filtered(query, &AcceptAll, params)
    }

    /// Search for the nearest neighbours of `query` among vectors whose label
    /// satisfies `predicate`.
    ///
    /// Fewer than `top_k` results is not an error; a predicate that matches no
    /// reachable vector yields an empty list.
    pub fn search_filtered<P: Predicate + ?Sized>(
        &self,
        query: &[f32],
        predicate: &P,
        params: &SearchParams,
    ) -> Result<Vec<SearchResult>, AcornError> {
        params.validate()?;
        if query.len() != self.dim() {
            return Err(AcornError::DimensionMismatch {
                expected: self.dim(),
                got: query.len(),
            });
        }

        let traversal = Traversal {
            store: &self.store,
            metric: self.config.metric,
            query,
            entry: self.entry_point,
            predicate,
            ef: params.ef_search,
            two_hop: params.two_hop,
        };
        let mut stats = TraversalStats::default();
        let found = traversal.run_pooled(self.nodes.as_slice(), &mut stats);
        debug!(
            expanded = stats.expanded,
            distance_evals = stats.distance_evals,
            two_hop_evals = stats.two_hop_evals,
            matches = found.len(),
            "query finished"
        );

        Ok(found
            .into_iter()
            .take(params.top_k)
            .map(|neighbor| SearchResult {
                id: neighbor.id as usize,
                distance: neighbor.distance,
            })
            .collect())
    }

    /// Run every query with the same predicate in parallel.
    pub fn search_batch_filtered<P: Predicate + Sync + ?Sized>(
        &self,
        queries: &[Vec<f32>],
        predicate: &P,
        params: &SearchParams,
    ) -> Result<Vec<Vec<SearchResult>>, AcornError> {
        queries
            .par_iter()
            .map(|query| self.search_filtered(query, predicate, params))
            .collect()
    }

    /// Run every query with its own predicate in parallel.
    pub fn search_batch<P: Predicate + Sync>(
        &self,
        queries: &[Vec<f32>],
        predicates: &[P],
        params: &SearchParams,
    ) -> Result<Vec<Vec<SearchResult>>, AcornError> {
        if predicates.len() != queries.len() {
            return Err(AcornError::DimensionMismatch {
                expected: queries.len(),
                got: predicates.len(),
            });
        }
        queries
            .par_iter()
            .zip(predicates.par_iter())
            .map(|(query, predicate)| self.search_filtered(query, predicate, params))
            .collect()
    }
}
