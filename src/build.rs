//! Incremental graph construction.
//!
//! Each insertion runs an unfiltered candidate search from the entry point,
//! picks a diversity-pruned base list and a label-aware robust list out of the
//! candidates, then links back from every chosen neighbor. Nodes live behind
//! per-node locks so the parallel builder can share the arena.

use std::collections::HashMap;
use std::iter;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::{GraphConfig, RobustPolicy};
use crate::graph::{Node, ENTRY_POINT};
use crate::predicate::AcceptAll;
use crate::search::{Adjacency, Neighbor, Traversal, TraversalStats};
use crate::store::{Label, VectorStore};
use crate::visited::VisitedSet;
use crate::{AcornError, Metric};

/// Summary of a finished construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuildStats {
    /// Wall-clock time spent wiring the graph.
    pub elapsed: Duration,
    pub nodes: usize,
    pub base_edges: usize,
    pub robust_edges: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeKind {
    Base,
    Robust,
}

/// Node arena shared between insertions.
struct LockedNodes(Vec<RwLock<Node>>);

impl Adjacency for LockedNodes {
    fn node_count(&self) -> usize {
        self.0.len()
    }

    fn load_neighbors(&self, id: u32, out: &mut Vec<u32>) {
        let node = self.0[id as usize].read();
        out.clear();
        out.extend_from_slice(&node.base);
        out.extend_from_slice(&node.robust);
    }
}

pub(crate) struct GraphBuilder<'a> {
    store: &'a VectorStore,
    config: &'a GraphConfig,
    nodes: LockedNodes,
    robust_quota: usize,
    width: usize,
}

impl<'a> GraphBuilder<'a> {
    pub(crate) fn new(store: &'a VectorStore, config: &'a GraphConfig) -> Result<Self, AcornError> {
        config.validate()?;
        if store.is_empty() {
            return Err(AcornError::EmptyInput);
        }
        let nodes = (0..store.len())
            .map(|_| RwLock::new(Node::default()))
            .collect();
        Ok(Self {
            store,
            config,
            nodes: LockedNodes(nodes),
            robust_quota: config.robust_quota(),
            width: config.candidate_width(),
        })
    }

    /// Insert identifiers `1..N` in order on the calling thread.
    pub(crate) fn run_sequential(self) -> (Vec<Node>, BuildStats) {
        let start = Instant::now();
        self.log_start("sequential");

        let total = self.store.len();
        let step = progress_step(total);
        let mut visited = VisitedSet::new(total);
        for id in 1..total {
            self.insert(id as u32, &mut visited);
            if (id + 1) % step == 0 {
                log_progress(id + 1, total);
            }
        }

        self.finish(start)
    }

    /// Insert identifiers `1..N` concurrently.
    pub(crate) fn run_parallel(self) -> (Vec<Node>, BuildStats) {
        let start = Instant::now();
        self.log_start("parallel");

        let total = self.store.len();
        let step = progress_step(total);
        let completed = AtomicUsize::new(1);
        (1..total as u32).into_par_iter().for_each_init(
            || VisitedSet::new(total),
            |visited, id| {
                self.insert(id, visited);
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if done % step == 0 {
                    log_progress(done, total);
                }
            },
        );

        self.finish(start)
    }

    fn log_start(&self, mode: &str) {
        info!(
            vectors = self.store.len(),
            dim = self.store.dim(),
            m = self.config.m,
            m_beta = self.config.m_beta,
            gamma = self.config.gamma,
            robust_quota = self.robust_quota,
            candidate_width = self.width,
            mode,
            "building predicate-aware graph"
        );
    }

    fn finish(self, start: Instant) -> (Vec<Node>, BuildStats) {
        let nodes: Vec<Node> = self.nodes.0.into_iter().map(RwLock::into_inner).collect();
        let stats = BuildStats {
            elapsed: start.elapsed(),
            nodes: nodes.len(),
            base_edges: nodes.iter().map(|n| n.base.len()).sum(),
            robust_edges: nodes.iter().map(|n| n.robust.len()).sum(),
        };
        info!(
            elapsed_secs = stats.elapsed.as_secs_f64(),
            base_edges = stats.base_edges,
            robust_edges = stats.robust_edges,
            "graph construction complete"
        );
        (nodes, stats)
    }

    fn insert(&self, id: u32, visited: &mut VisitedSet) {
        let store = self.store;
        let metric = self.config.metric;
        let traversal = Traversal {
            store,
            metric,
            query: store.vector(id),
            entry: ENTRY_POINT,
            predicate: &AcceptAll,
            ef: self.width,
            two_hop: false,
        };
        let mut stats = TraversalStats::default();
        let mut candidates = traversal.run(&self.nodes, visited, &mut stats);
        candidates.retain(|candidate| candidate.id != id);

        let base = select_diverse(store, metric, &candidates, self.config.m);
        let robust = select_robust(
            store,
            metric,
            &self.config.policy,
            &base,
            &candidates,
            self.robust_quota,
        );

        {
            let mut node = self.nodes.0[id as usize].write();
            node.base.clone_from(&base);
            node.robust.clone_from(&robust);
        }

        for &neighbor in &base {
            self.link(neighbor, id, EdgeKind::Base);
        }
        for &neighbor in &robust {
            self.link(neighbor, id, EdgeKind::Robust);
        }
    }

    /// Add the back-edge `target -> id`, re-pruning `target`'s list on overflow.
    fn link(&self, target: u32, id: u32, kind: EdgeKind) {
        let bound = match kind {
            EdgeKind::Base => self.config.m,
            EdgeKind::Robust => self.config.m_beta,
        };
        if bound == 0 {
            return;
        }

        let store = self.store;
        let metric = self.config.metric;
        let mut node = self.nodes.0[target as usize].write();
        if node.base.contains(&id) || node.robust.contains(&id) {
            return;
        }

        let list = match kind {
            EdgeKind::Base => &node.base,
            EdgeKind::Robust => &node.robust,
        };
        if list.len() < bound {
            match kind {
                EdgeKind::Base => node.base.push(id),
                EdgeKind::Robust => node.robust.push(id),
            }
            return;
        }

        let center = store.vector(target);
        let mut pool: Vec<Neighbor> = list
            .iter()
            .copied()
            .chain(iter::once(id))
            .map(|other| Neighbor {
                id: other,
                distance: metric.distance(center, store.vector(other)),
            })
            .collect();
        pool.sort_unstable();

        match kind {
            EdgeKind::Base => node.base = select_diverse(store, metric, &pool, bound),
            EdgeKind::Robust => {
                let kept =
                    select_robust(store, metric, &self.config.policy, &node.base, &pool, bound);
                node.robust = kept;
            }
        }
    }
}

fn progress_step(total: usize) -> usize {
    (total / 20).max(1)
}

fn log_progress(done: usize, total: usize) {
    debug!(
        inserted = done,
        total,
        percent = 100.0 * done as f64 / total as f64,
        "construction progress"
    );
}

/// Diversity rule: walk `candidates` (ascending distance to the center) and
/// keep `c` unless an already kept `k` has `dist(k, c) < dist(center, c)`.
pub(crate) fn select_diverse(
    store: &VectorStore,
    metric: Metric,
    candidates: &[Neighbor],
    limit: usize,
) -> Vec<u32> {
    let mut kept: Vec<u32> = Vec::with_capacity(limit);
    for candidate in candidates {
        if kept.len() >= limit {
            break;
        }
        let vector = store.vector(candidate.id);
        let occluded = kept
            .iter()
            .any(|&k| metric.distance(store.vector(k), vector) < candidate.distance);
        if !occluded {
            kept.push(candidate.id);
        }
    }
    kept
}

/// Robust selection over `candidates` (ascending distance to the center),
/// never picking anything already in `base`.
///
/// The first pass accepts candidates whose label is rare among the neighbors
/// kept so far; the second pass fills what is left of `quota` with the relaxed
/// dominance test.
pub(crate) fn select_robust(
    store: &VectorStore,
    metric: Metric,
    policy: &RobustPolicy,
    base: &[u32],
    candidates: &[Neighbor],
    quota: usize,
) -> Vec<u32> {
    let mut kept: Vec<u32> = Vec::with_capacity(quota);
    if quota == 0 {
        return kept;
    }

    let mut label_counts: HashMap<Label, usize> = HashMap::new();
    for &id in base {
        *label_counts.entry(store.label(id)).or_default() += 1;
    }
    let mut population = base.len();
    let mut taken = vec![false; candidates.len()];

    for (slot, candidate) in candidates.iter().enumerate() {
        if kept.len() >= quota {
            return kept;
        }
        if base.contains(&candidate.id) {
            continue;
        }
        let label = store.label(candidate.id);
        let seen = label_counts.get(&label).copied().unwrap_or(0);
        let share = if population == 0 {
            0.0
        } else {
            seen as f32 / population as f32
        };
        if share <= policy.rarity_threshold {
            kept.push(candidate.id);
            taken[slot] = true;
            *label_counts.entry(label).or_default() += 1;
            population += 1;
        }
    }

    for (slot, candidate) in candidates.iter().enumerate() {
        if kept.len() >= quota {
            break;
        }
        if taken[slot] || base.contains(&candidate.id) {
            continue;
        }
        let vector = store.vector(candidate.id);
        // inf * 0 is NaN, so exact duplicates are never treated as dominated.
        let dominated = base.iter().chain(kept.iter()).any(|&k| {
            policy.relaxation * metric.distance(store.vector(k), vector) < candidate.distance
        });
        if !dominated {
            kept.push(candidate.id);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(store: &VectorStore, center: u32, ids: &[u32]) -> Vec<Neighbor> {
        let mut pool: Vec<Neighbor> = ids
            .iter()
            .map(|&id| Neighbor {
                id,
                distance: Metric::L2.distance(store.vector(center), store.vector(id)),
            })
            .collect();
        pool.sort_unstable();
        pool
    }

    fn square() -> VectorStore {
        VectorStore::new(
            vec![
                vec![0.0, 0.0],
                vec![1.0, 0.0],
                vec![0.0, 1.0],
                vec![5.0, 5.0],
            ],
            vec![0, 0, 0, 1],
        )
        .unwrap()
    }

    #[test]
    fn diversity_rule_drops_occluded_candidates() {
        let store = square();
        let pool = scored(&store, 3, &[0, 1, 2]);
        // 1 and 2 are equidistant from 3; 1 wins the tie and occludes both others.
        assert_eq!(select_diverse(&store, Metric::L2, &pool, 4), vec![1]);

        let pool = scored(&store, 0, &[1, 2, 3]);
        assert_eq!(select_diverse(&store, Metric::L2, &pool, 4), vec![1, 2]);
        assert_eq!(select_diverse(&store, Metric::L2, &pool, 1), vec![1]);
    }

    #[test]
    fn rarity_pass_prefers_unseen_labels() {
        let store = square();
        let policy = RobustPolicy::default();
        // Center 2 with base [0]: candidate 1 shares label 0 with every base
        // neighbor, candidate 3 carries an unseen label.
        let pool = scored(&store, 2, &[1, 3]);
        let robust = select_robust(&store, Metric::L2, &policy, &[0], &pool, 1);
        assert_eq!(robust, vec![3]);
    }

    #[test]
    fn fallback_pass_fills_quota_with_nearest() {
        let store = square();
        let policy = RobustPolicy::default();
        let pool = scored(&store, 3, &[0, 1, 2]);
        let robust = select_robust(&store, Metric::L2, &policy, &[1], &pool, 2);
        assert_eq!(robust, vec![2, 0]);
        assert!(select_robust(&store, Metric::L2, &policy, &[1], &pool, 0).is_empty());
    }

    #[test]
    fn finite_relaxation_prunes_dominated_candidates() {
        let store = square();
        let policy = RobustPolicy {
            rarity_threshold: 0.0,
            relaxation: 1.0,
        };
        let pool = scored(&store, 3, &[0, 1, 2]);
        // With relaxation 1 the fallback pass is the base rule again.
        assert!(select_robust(&store, Metric::L2, &policy, &[1], &pool, 2).is_empty());
    }

    #[test]
    fn builds_expected_wiring_for_small_square() {
        let store = square();
        let config = GraphConfig::new(2, 1, 2);
        let (nodes, stats) = GraphBuilder::new(&store, &config)
            .unwrap()
            .run_sequential();

        assert_eq!(nodes[0].base, vec![1, 2]);
        assert!(nodes[0].robust.is_empty());
        assert_eq!(nodes[1].base, vec![0, 3]);
        assert_eq!(nodes[1].robust, vec![2]);
        assert_eq!(nodes[2].base, vec![0]);
        assert_eq!(nodes[2].robust, vec![3]);
        assert_eq!(nodes[3].base, vec![1]);
        assert_eq!(nodes[3].robust, vec![2]);
        assert_eq!(stats.nodes, 4);
        assert_eq!(stats.base_edges, 6);
        assert_eq!(stats.robust_edges, 3);
    }

    #[test]
    fn gamma_one_adds_no_robust_edges() {
        let store = square();
        let config = GraphConfig::new(2, 4, 1);
        let (nodes, stats) = GraphBuilder::new(&store, &config)
            .unwrap()
            .run_sequential();
        assert!(nodes.iter().all(|node| node.robust.is_empty()));
        assert_eq!(stats.robust_edges, 0);
    }

    #[test]
    fn rejects_empty_store_and_bad_config() {
        let empty = VectorStore::from_flat(2, Vec::new(), Vec::new()).unwrap();
        assert!(matches!(
            GraphBuilder::new(&empty, &GraphConfig::default()),
            Err(AcornError::EmptyInput)
        ));
        let store = square();
        let config = GraphConfig::new(0, 1, 1);
        assert!(matches!(
            GraphBuilder::new(&store, &config),
            Err(AcornError::InvalidParameters(_))
        ));
    }
}
