//! Exact filtered k-NN, used as ground truth when measuring graph recall.

use std::collections::{BinaryHeap, HashSet};

use rayon::prelude::*;

use crate::predicate::Predicate;
use crate::search::{Neighbor, SearchResult};
use crate::store::VectorStore;
use crate::{AcornError, Metric};

/// Scan every stored vector and return the `k` nearest ones whose label
/// satisfies `predicate`, ascending by `(distance, id)`.
pub fn exact_knn<P: Predicate + ?Sized>(
    store: &VectorStore,
    metric: Metric,
    query: &[f32],
    predicate: &P,
    k: usize,
) -> Result<Vec<SearchResult>, AcornError> {
    if k == 0 {
        return Err(AcornError::InvalidArgument("top_k must be positive"));
    }
    if query.len() != store.dim() {
        return Err(AcornError::DimensionMismatch {
            expected: store.dim(),
            got: query.len(),
        });
    }

    let mut heap: BinaryHeap<Neighbor> = BinaryHeap::with_capacity(k + 1);
    for (id, (vector, &label)) in store.iter().zip(store.labels()).enumerate() {
        if !predicate.matches(label) {
            continue;
        }
        let candidate = Neighbor {
            id: id as u32,
            distance: metric.distance(query, vector),
        };
        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().map_or(false, |worst| candidate < *worst) {
            heap.pop();
            heap.push(candidate);
        }
    }

    Ok(heap
        .into_sorted_vec()
        .into_iter()
        .map(|neighbor| SearchResult {
            id: neighbor.id as usize,
            distance: neighbor.distance,
        })
        .collect())
}

/// Exact answers for a query batch, one predicate per query.
pub fn groundtruth<P: Predicate + Sync>(
    store: &VectorStore,
    metric: Metric,
    queries: &[Vec<f32>],
    predicates: &[P],
    k: usize,
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
        .map(|(query, predicate)| exact_knn(store, metric, query, predicate, k))
        .collect()
}

/// Fraction of the first `k` true neighbours found among the first `k`
/// results.
///
/// When fewer than `k` vectors satisfy the predicate only those count; an
/// empty truth set scores `1.0`.
pub fn recall_at_k(results: &[SearchResult], truth: &[SearchResult], k: usize) -> f32 {
    let expected = truth.len().min(k);
    if expected == 0 {
        return 1.0;
    }
    let truth_ids: HashSet<usize> = truth.iter().take(k).map(|r| r.id).collect();
    let hits = results
        .iter()
        .take(k)
        .filter(|r| truth_ids.contains(&r.id))
        .count();
    hits as f32 / expected as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{AcceptAll, LabelEquals};

    fn line() -> VectorStore {
        let vectors = (0..8).map(|i| vec![i as f32, 0.0]).collect();
        VectorStore::new(vectors, vec![0, 1, 0, 1, 0, 1, 0, 1]).unwrap()
    }

    #[test]
    fn exact_knn_orders_and_filters() {
        let store = line();
        let query = [2.2f32, 0.0];
        let all = exact_knn(&store, Metric::L2, &query, &AcceptAll, 3).unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 3, 1]);

        let odd = exact_knn(&store, Metric::L2, &query, &LabelEquals(1), 2).unwrap();
        assert_eq!(odd.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 1]);

        let none = exact_knn(&store, Metric::L2, &query, &LabelEquals(9), 2).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn exact_knn_validates_arguments() {
        let store = line();
        assert!(matches!(
            exact_knn(&store, Metric::L2, &[0.0, 0.0], &AcceptAll, 0),
            Err(AcornError::InvalidArgument(_))
        ));
        assert!(matches!(
            exact_knn(&store, Metric::L2, &[0.0], &AcceptAll, 1),
            Err(AcornError::DimensionMismatch {
                expected: 2,
                got: 1
            })
        ));
    }

    #[test]
    fn groundtruth_runs_each_query_with_its_predicate() {
        let store = line();
        let queries = vec![vec![0.0, 0.0], vec![7.0, 0.0]];
        let predicates = vec![LabelEquals(1), LabelEquals(0)];
        let truth = groundtruth(&store, Metric::L2, &queries, &predicates, 1).unwrap();
        assert_eq!(truth[0][0].id, 1);
        assert_eq!(truth[1][0].id, 6);
        assert!(groundtruth(&store, Metric::L2, &queries, &predicates[..1], 1).is_err());
    }

    #[test]
    fn recall_counts_overlap() {
        let result = |id| SearchResult { id, distance: 0.0 };
        let truth = vec![result(1), result(2), result(3)];
        assert_eq!(recall_at_k(&[result(1), result(9), result(3)], &truth, 3), 2.0 / 3.0);
        assert_eq!(recall_at_k(&[result(2)], &truth[..1], 5), 0.0);
        assert_eq!(recall_at_k(&[], &[], 5), 1.0);
    }
}
