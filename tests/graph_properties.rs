use acorn_rs::{AcornIndex, GraphConfig, LabelEquals, Metric, SearchParams, VectorStore};
use proptest::prelude::*;

/// Small labelled datasets: up to 60 vectors of dimension 2..6, labels 0..4.
fn arb_store() -> impl Strategy<Value = VectorStore> {
    (1..60usize, 2..6usize)
        .prop_flat_map(|(total, dim)| {
            (
                prop::collection::vec(prop::collection::vec(-10.0f32..10.0, dim), total),
                prop::collection::vec(0u32..4, total),
            )
        })
        .prop_map(|(vectors, labels)| VectorStore::new(vectors, labels).expect("valid store"))
}

fn arb_config() -> impl Strategy<Value = GraphConfig> {
    (1..6usize, 0..6usize, 1..4usize, 1..32usize).prop_map(|(m, m_beta, gamma, ef)| {
        GraphConfig::new(m, m_beta, gamma).with_ef_construction(ef)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every node respects its degree bounds and its lists stay disjoint.
    #[test]
    fn prop_degree_bounds(store in arb_store(), config in arb_config()) {
        let index = AcornIndex::build(store, config.clone()).expect("build");
        for id in 0..index.len() {
            let (base, robust) = index.neighbors(id).expect("node");
            prop_assert!(base.len() <= config.m);
            prop_assert!(robust.len() <= config.m_beta);
            for &neighbor in base.iter().chain(robust) {
                prop_assert!((neighbor as usize) < index.len());
                prop_assert_ne!(neighbor as usize, id);
            }
            prop_assert!(base.iter().all(|n| !robust.contains(n)));
        }
        if config.gamma == 1 {
            let stats = index.build_stats().expect("stats");
            prop_assert_eq!(stats.robust_edges, 0);
        }
    }

    /// Filtered results match the predicate, are ascending and report true distances.
    #[test]
    fn prop_filtered_results_are_sound(
        store in arb_store(),
        config in arb_config(),
        label in 0u32..5,
        k in 1..8usize,
        seed_query in prop::collection::vec(-10.0f32..10.0, 6),
    ) {
        let index = AcornIndex::build(store, config).expect("build");
        let query = &seed_query[..index.dim()];
        let params = SearchParams::new(k, k + 8);
        let results = index
            .search_filtered(query, &LabelEquals(label), &params)
            .expect("search");

        prop_assert!(results.len() <= k);
        for pair in results.windows(2) {
            prop_assert!(pair[0].distance <= pair[1].distance);
        }
        for result in &results {
            let (vector, stored_label) = index.store().get(result.id).expect("stored");
            prop_assert_eq!(stored_label, label);
            prop_assert_eq!(result.distance, Metric::L2.distance(query, vector));
        }
        if !index.store().labels().contains(&label) {
            prop_assert!(results.is_empty());
        }
    }

    /// Reloading a saved graph keeps every adjacency list.
    #[test]
    fn prop_persistence_roundtrip(store in arb_store(), config in arb_config()) {
        let index = AcornIndex::build(store, config).expect("build");
        let mut buffer = Vec::new();
        index.save_to_writer(&mut buffer).expect("serialize");
        let restored = AcornIndex::load_from_reader(buffer.as_slice()).expect("deserialize");
        prop_assert_eq!(restored.config(), index.config());
        for id in 0..index.len() {
            prop_assert_eq!(restored.neighbors(id).unwrap(), index.neighbors(id).unwrap());
        }
    }
}
