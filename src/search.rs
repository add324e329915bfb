//! Bounded best-first traversal shared by queries and construction.
//!
//! Nodes that fail the predicate still drive navigation: they enter the
//! frontier and are expanded, they only stay out of the result pool.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};

use crate::predicate::Predicate;
use crate::store::VectorStore;
use crate::visited::VisitedSet;
use crate::Metric;

thread_local! {
    static SEARCH_VISITED: RefCell<VisitedSet> = RefCell::new(VisitedSet::new(0));
}

/// Result entry returned by graph search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    pub id: usize,
    pub distance: f32,
}

/// Identifier scored against a reference vector, ordered by `(distance, id)`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Neighbor {
    pub id: u32,
    pub distance: f32,
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

/// Read access to outgoing edges, implemented by the frozen graph and by the
/// lock-guarded node arena used during construction.
pub(crate) trait Adjacency {
    fn node_count(&self) -> usize;

    /// Replace `out` with the base neighbors of `id` followed by its robust neighbors.
    fn load_neighbors(&self, id: u32, out: &mut Vec<u32>);
}

/// Everything a traversal needs besides the adjacency itself.
pub(crate) struct Traversal<'a, P: Predicate + ?Sized> {
    pub store: &'a VectorStore,
    pub metric: Metric,
    pub query: &'a [f32],
    pub entry: u32,
    pub predicate: &'a P,
    pub ef: usize,
    pub two_hop: bool,
}

/// Counters collected per traversal, logged at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TraversalStats {
    pub expanded: usize,
    pub distance_evals: usize,
    pub two_hop_evals: usize,
}

/// Frontier of discovered-but-unexpanded nodes, capped at `capacity`.
struct Frontier {
    entries: BTreeSet<Neighbor>,
    capacity: usize,
}

impl Frontier {
    fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeSet::new(),
            capacity,
        }
    }

    fn offer(&mut self, candidate: Neighbor) {
        if self.entries.len() < self.capacity {
            self.entries.insert(candidate);
            return;
        }
        let worse_than_worst = self
            .entries
            .last()
            .map_or(false, |worst| candidate >= *worst);
        if worse_than_worst {
            return;
        }
        self.entries.insert(candidate);
        self.entries.pop_last();
    }

    fn pop_closest(&mut self) -> Option<Neighbor> {
        self.entries.pop_first()
    }
}

/// Matching nodes, a max-heap capped at `capacity`.
struct ResultPool {
    heap: BinaryHeap<Neighbor>,
    capacity: usize,
}

impl ResultPool {
    fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity + 1),
            capacity,
        }
    }

    fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    fn worst(&self) -> Option<&Neighbor> {
        self.heap.peek()
    }

    fn offer(&mut self, candidate: Neighbor) {
        if self.is_full() {
            match self.heap.peek() {
                Some(worst) if candidate < *worst => {}
                _ => return,
            }
        }
        self.heap.push(candidate);
        if self.heap.len() > self.capacity {
            self.heap.pop();
        }
    }

    fn into_sorted(self) -> Vec<Neighbor> {
        self.heap.into_sorted_vec()
    }
}

impl<P: Predicate + ?Sized> Traversal<'_, P> {
    #[inline]
    fn score(&self, id: u32) -> Neighbor {
        Neighbor {
            id,
            distance: self.metric.distance(self.query, self.store.vector(id)),
        }
    }

    #[inline]
    fn accepts(&self, id: u32) -> bool {
        self.predicate.matches(self.store.label(id))
    }

    /// Run the traversal with a caller-owned visited set.
    ///
    /// Returns up to `ef` matching nodes ascending by `(distance, id)`.
    pub(crate) fn run<A: Adjacency + ?Sized>(
        &self,
        graph: &A,
        visited: &mut VisitedSet,
        stats: &mut TraversalStats,
    ) -> Vec<Neighbor> {
        visited.ensure_capacity(graph.node_count());
        visited.clear();

        let mut frontier = Frontier::new(self.ef);
        let mut pool = ResultPool::new(self.ef);
        let mut neighbors = Vec::new();
        let mut second_hop = Vec::new();

        visited.insert(self.entry);
        let seed = self.score(self.entry);
        stats.distance_evals += 1;
        frontier.offer(seed);
        if self.accepts(self.entry) {
            pool.offer(seed);
        }

        while let Some(current) = frontier.pop_closest() {
            if pool.is_full() {
                if let Some(worst) = pool.worst() {
                    if current.distance > worst.distance {
                        break;
                    }
                }
            }
            stats.expanded += 1;

            graph.load_neighbors(current.id, &mut neighbors);
            for &id in &neighbors {
                if !visited.insert(id) {
                    continue;
                }
                let candidate = self.score(id);
                stats.distance_evals += 1;
                frontier.offer(candidate);

                if self.accepts(id) {
                    pool.offer(candidate);
                    continue;
                }
                if !self.two_hop {
                    continue;
                }

                graph.load_neighbors(id, &mut second_hop);
                for &hop in &second_hop {
                    if !self.accepts(hop) || !visited.insert(hop) {
                        continue;
                    }
                    let reached = self.score(hop);
                    stats.two_hop_evals += 1;
                    frontier.offer(reached);
                    pool.offer(reached);
                }
            }
        }

        pool.into_sorted()
    }

    /// Run the traversal with this thread's cached visited set.
    pub(crate) fn run_pooled<A: Adjacency + ?Sized>(
        &self,
        graph: &A,
        stats: &mut TraversalStats,
    ) -> Vec<Neighbor> {
        SEARCH_VISITED.with(|cell| {
            let mut visited = cell.borrow_mut();
            self.run(graph, &mut visited, stats)
        })
    }
}
