//! Property tests for vector store search ordering.

use std::collections::BTreeMap;

use insightlens_rag::{
    DistanceMetric, InMemoryVectorStore, LocalVectorStore, Metadata, Record, VectorStore,
};
use proptest::prelude::*;

const DIM: usize = 8;

fn arb_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-10.0f32..10.0f32, dim)
}

/// Records keyed by id so that upserts never overwrite within a case.
fn arb_records(dim: usize) -> impl Strategy<Value = Vec<Record>> {
    proptest::collection::btree_map("[a-z]{3,8}", ("[a-z ]{5,30}", arb_embedding(dim)), 1..20)
        .prop_map(|map: BTreeMap<String, (String, Vec<f32>)>| {
            map.into_iter()
                .map(|(id, (document, embedding))| Record {
                    id,
                    embedding,
                    document,
                    metadata: Metadata::new(),
                })
                .collect()
        })
}

fn arb_metric() -> impl Strategy<Value = DistanceMetric> {
    prop_oneof![Just(DistanceMetric::L2), Just(DistanceMetric::Cosine), Just(DistanceMetric::Ip)]
}

/// *For any* set of records in an InMemoryVectorStore, a search returns at
/// most `top_k` hits, ordered by ascending distance with ties broken by id,
/// and every hit's distance matches the metric applied to its embedding.
mod prop_inmemory_search_ordering {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_ascending_and_bounded_by_top_k(
            records in arb_records(DIM),
            query in arb_embedding(DIM),
            top_k in 1usize..25,
            metric in arb_metric(),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let store = InMemoryVectorStore::with_metric(metric);
                store.ensure_exists("test").await.unwrap();
                store.upsert("test", &records).await.unwrap();
                store.search("test", &query, top_k).await.unwrap()
            });

            prop_assert_eq!(results.len(), top_k.min(records.len()));

            for window in results.windows(2) {
                prop_assert!(
                    window[0].distance < window[1].distance
                        || (window[0].distance == window[1].distance && window[0].id < window[1].id),
                    "results out of order: {} ({}) before {} ({})",
                    window[0].id,
                    window[0].distance,
                    window[1].id,
                    window[1].distance,
                );
            }

            for hit in &results {
                let record = records.iter().find(|r| r.id == hit.id).unwrap();
                prop_assert_eq!(hit.distance, metric.distance(&record.embedding, &query));
                prop_assert_eq!(hit.document.as_deref(), Some(record.document.as_str()));
            }
        }
    }
}

/// *For any* set of records, the local store returns the same hits as the
/// in-memory store, both before and after reopening the data directory.
mod prop_local_matches_inmemory {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(25))]

        #[test]
        fn local_store_search_matches_inmemory(
            records in arb_records(DIM),
            query in arb_embedding(DIM),
            top_k in 1usize..10,
        ) {
            let dir = tempfile::tempdir().unwrap();
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (expected, local, reopened) = rt.block_on(async {
                let memory = InMemoryVectorStore::new();
                memory.ensure_exists("test").await.unwrap();
                memory.upsert("test", &records).await.unwrap();

                let store = LocalVectorStore::open(dir.path()).await.unwrap();
                store.ensure_exists("test").await.unwrap();
                store.upsert("test", &records).await.unwrap();
                let local = store.search("test", &query, top_k).await.unwrap();
                drop(store);

                let reopened = LocalVectorStore::open(dir.path()).await.unwrap();
                (
                    memory.search("test", &query, top_k).await.unwrap(),
                    local,
                    reopened.search("test", &query, top_k).await.unwrap(),
                )
            });

            let ids = |hits: &[insightlens_rag::IndexHit]| {
                hits.iter().map(|h| h.id.clone()).collect::<Vec<_>>()
            };
            prop_assert_eq!(ids(&expected), ids(&local));
            prop_assert_eq!(ids(&expected), ids(&reopened));
        }
    }
}
