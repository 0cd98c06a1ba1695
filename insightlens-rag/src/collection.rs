//! Collection contents shared by the bundled vector stores.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::distance::DistanceMetric;
use crate::document::{IndexHit, Metadata, MetadataValue, Record};

/// A record as kept inside a collection, keyed by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct StoredRecord {
    pub(crate) embedding: Vec<f32>,
    #[serde(default)]
    pub(crate) document: Option<String>,
    #[serde(default)]
    pub(crate) metadata: Metadata,
}

/// One named collection: its metric, dimensionality, and records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct StoredCollection {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) metric: DistanceMetric,
    /// Set by the first record written.
    #[serde(default)]
    pub(crate) dimensions: Option<usize>,
    #[serde(default)]
    pub(crate) records: BTreeMap<String, StoredRecord>,
}

impl StoredCollection {
    pub(crate) fn new(name: &str, metric: DistanceMetric) -> Self {
        Self { name: name.to_string(), metric, dimensions: None, records: BTreeMap::new() }
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Insert or replace records. The whole batch is checked before anything
    /// is written, so a rejected batch leaves the collection untouched.
    pub(crate) fn upsert(&mut self, records: &[Record]) -> Result<(), String> {
        let mut dimensions = self.dimensions;
        for record in records {
            if record.embedding.is_empty() {
                return Err(format!("record '{}' has an empty embedding", record.id));
            }
            if !record.embedding.iter().all(|x| x.is_finite()) {
                return Err(format!("record '{}' has a non-finite embedding value", record.id));
            }
            match dimensions {
                Some(expected) if expected != record.embedding.len() => {
                    return Err(format!(
                        "record '{}' has {} dimensions but collection '{}' expects {expected}",
                        record.id,
                        record.embedding.len(),
                        self.name
                    ));
                }
                Some(_) => {}
                None => dimensions = Some(record.embedding.len()),
            }
        }

        self.dimensions = dimensions;
        for record in records {
            self.records.insert(
                record.id.clone(),
                StoredRecord {
                    embedding: record.embedding.clone(),
                    document: Some(record.document.clone()),
                    metadata: record.metadata.clone(),
                },
            );
        }
        Ok(())
    }

    /// Remove records by id. An emptied collection forgets its
    /// dimensionality.
    pub(crate) fn delete(&mut self, ids: &[&str]) -> usize {
        let removed = ids.iter().filter(|id| self.records.remove(**id).is_some()).count();
        if self.records.is_empty() {
            self.dimensions = None;
        }
        removed
    }

    pub(crate) fn ids_where(&self, key: &str, value: &MetadataValue) -> Vec<String> {
        self.records
            .iter()
            .filter(|(_, record)| record.metadata.get(key) == Some(value))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Brute-force nearest neighbours, ascending by distance then id.
    pub(crate) fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<IndexHit>, String> {
        let Some(dimensions) = self.dimensions else {
            return Ok(Vec::new());
        };
        if !embedding.iter().all(|x| x.is_finite()) {
            return Err(format!("query for collection '{}' has a non-finite value", self.name));
        }
        if embedding.len() != dimensions {
            return Err(format!(
                "query has {} dimensions but collection '{}' expects {dimensions}",
                embedding.len(),
                self.name
            ));
        }

        let mut scored: Vec<IndexHit> = self
            .records
            .iter()
            .map(|(id, record)| IndexHit {
                id: id.clone(),
                document: record.document.clone(),
                metadata: record.metadata.clone(),
                distance: self.metric.distance(&record.embedding, embedding),
            })
            .collect();

        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, embedding: Vec<f32>) -> Record {
        Record { id: id.into(), embedding, document: format!("text {id}"), metadata: Metadata::new() }
    }

    #[test]
    fn first_record_fixes_dimensions() {
        let mut collection = StoredCollection::new("docs", DistanceMetric::L2);
        collection.upsert(&[record("a", vec![1.0, 0.0])]).unwrap();
        assert_eq!(collection.dimensions, Some(2));

        let err = collection.upsert(&[record("b", vec![1.0, 0.0, 0.0])]).unwrap_err();
        assert!(err.contains("expects 2"));
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn rejected_batch_writes_nothing() {
        let mut collection = StoredCollection::new("docs", DistanceMetric::L2);
        let batch = [record("a", vec![1.0]), record("b", vec![1.0, 2.0])];
        assert!(collection.upsert(&batch).is_err());
        assert_eq!(collection.len(), 0);
        assert_eq!(collection.dimensions, None);
    }

    #[test]
    fn search_breaks_distance_ties_by_id() {
        let mut collection = StoredCollection::new("docs", DistanceMetric::L2);
        collection
            .upsert(&[record("b", vec![1.0]), record("a", vec![1.0]), record("c", vec![5.0])])
            .unwrap();
        let hits = collection.search(&[1.0], 3).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn emptied_collection_accepts_a_new_dimensionality() {
        let mut collection = StoredCollection::new("docs", DistanceMetric::L2);
        collection.upsert(&[record("a", vec![1.0, 0.0]), record("b", vec![0.0, 1.0])]).unwrap();
        assert_eq!(collection.delete(&["a"]), 1);
        assert_eq!(collection.dimensions, Some(2));

        assert_eq!(collection.delete(&["b", "missing"]), 1);
        assert_eq!(collection.dimensions, None);
        collection.upsert(&[record("c", vec![1.0, 2.0, 3.0])]).unwrap();
        assert_eq!(collection.dimensions, Some(3));
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let mut collection = StoredCollection::new("docs", DistanceMetric::L2);
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let err = collection.upsert(&[record("ok", vec![1.0, 0.0]), record("x", vec![bad, 0.0])]);
            assert!(err.unwrap_err().contains("non-finite"));
        }
        assert_eq!(collection.len(), 0);
        assert_eq!(collection.dimensions, None);

        collection.upsert(&[record("a", vec![1.0, 0.0])]).unwrap();
        assert!(collection.search(&[f32::NAN, 0.0], 1).unwrap_err().contains("non-finite"));
    }

    #[test]
    fn overflowing_distances_still_sort() {
        let mut collection = StoredCollection::new("docs", DistanceMetric::Ip);
        collection
            .upsert(&[
                record("a", vec![f32::MAX, f32::MAX]),
                record("b", vec![1.0, 0.0]),
                record("c", vec![0.0, 1.0]),
            ])
            .unwrap();
        // `a` overflows to inf - inf.
        let hits = collection.search(&[f32::MAX, -f32::MAX], 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().any(|h| h.id == "a" && h.distance.is_nan()));
        let finite: Vec<&str> =
            hits.iter().filter(|h| !h.distance.is_nan()).map(|h| h.id.as_str()).collect();
        assert_eq!(finite, ["b", "c"]);
    }

    #[test]
    fn search_on_empty_collection_ignores_query_shape() {
        let collection = StoredCollection::new("docs", DistanceMetric::Cosine);
        assert!(collection.search(&[1.0, 2.0, 3.0], 5).unwrap().is_empty());
    }
}
