use super::adapter::{DocumentStore, DocumentStream};
use super::types::*;

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-memory reference store.
///
/// Backs every [`DocumentStore`] capability with a per-collection vector
/// behind a `tokio` mutex, which gives the single-record atomicity the
/// framework assumes from a real document store. Used by the demo driver
/// and the test suite.
pub struct MemoryStore {
    collections: DashMap<String, Arc<Mutex<Vec<Document>>>>,
    unique_indexes: DashMap<String, Vec<Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            collections: DashMap::new(),
            unique_indexes: DashMap::new(),
        })
    }

    fn collection(&self, name: &str) -> Arc<Mutex<Vec<Document>>> {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }

    fn ensure_id(doc: &mut Document) {
        if let Some(obj) = doc.as_object_mut() {
            if !obj.contains_key("_id") {
                obj.insert(
                    "_id".to_string(),
                    serde_json::Value::from(Uuid::new_v4().to_string()),
                );
            }
        }
    }

    fn violates_unique(&self, collection: &str, docs: &[Document], candidate: &Document) -> bool {
        let indexes = match self.unique_indexes.get(collection) {
            Some(indexes) => indexes.value().clone(),
            None => return false,
        };
        for index in &indexes {
            let collides = docs.iter().any(|existing| {
                index
                    .iter()
                    .all(|field| existing.get(field) == candidate.get(field))
            });
            if collides {
                return true;
            }
        }
        false
    }

    fn doc_size(doc: &Document) -> u64 {
        serde_json::to_string(doc).map_or(0, |s| s.len() as u64)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_unique_index(&self, collection: &str, fields: &[&str]) -> StoreResult<()> {
        let index: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let mut indexes = self
            .unique_indexes
            .entry(collection.to_string())
            .or_default();
        if !indexes.contains(&index) {
            indexes.push(index);
        }
        Ok(())
    }

    async fn insert(&self, collection: &str, mut doc: Document) -> StoreResult<()> {
        Self::ensure_id(&mut doc);
        let docs = self.collection(collection);
        let mut docs = docs.lock().await;
        docs.push(doc);
        Ok(())
    }

    async fn insert_unique(&self, collection: &str, mut doc: Document) -> StoreResult<()> {
        Self::ensure_id(&mut doc);
        let docs = self.collection(collection);
        let mut docs = docs.lock().await;
        if self.violates_unique(collection, &docs, &doc) {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
            });
        }
        docs.push(doc);
        Ok(())
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        let docs = self.collection(collection);
        let docs = docs.lock().await;
        Ok(docs.iter().find(|doc| filter.matches(doc)).cloned())
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<Option<Document>> {
        let docs = self.collection(collection);
        let mut docs = docs.lock().await;
        for doc in docs.iter_mut() {
            if filter.matches(doc) {
                update.apply(doc);
                return Ok(Some(doc.clone()));
            }
        }
        Ok(None)
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        mut doc: Document,
    ) -> StoreResult<bool> {
        let docs = self.collection(collection);
        let mut docs = docs.lock().await;
        for existing in docs.iter_mut() {
            if filter.matches(existing) {
                // A replacement never changes the record's identity.
                if doc.get("_id").is_none() {
                    if let (Some(obj), Some(id)) = (doc.as_object_mut(), existing.get("_id")) {
                        obj.insert("_id".to_string(), id.clone());
                    }
                }
                *existing = doc;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn find_range(
        &self,
        collection: &str,
        field: &str,
        range: &Range,
    ) -> StoreResult<DocumentStream> {
        let docs = self.collection(collection);
        let docs = docs.lock().await;
        let mut matched: Vec<(KeyValue, Document)> = docs
            .iter()
            .filter_map(|doc| {
                KeyValue::of_field(doc, field)
                    .filter(|key| range.contains(key))
                    .map(|key| (key, doc.clone()))
            })
            .collect();
        matched.sort_by(|a, b| a.0.cmp(&b.0));
        let stream =
            futures::stream::iter(matched.into_iter().map(|(_, doc)| Ok::<_, StoreError>(doc)));
        Ok(Box::pin(stream))
    }

    async fn project_sorted(&self, collection: &str, field: &str) -> StoreResult<Vec<KeyValue>> {
        let docs = self.collection(collection);
        let docs = docs.lock().await;
        let mut values: Vec<KeyValue> = docs
            .iter()
            .filter_map(|doc| KeyValue::of_field(doc, field))
            .collect();
        values.sort();
        Ok(values)
    }

    async fn collection_stats(&self, collection: &str) -> StoreResult<CollectionStats> {
        let docs = self.collection(collection);
        let docs = docs.lock().await;
        let count = docs.len() as u64;
        let total: u64 = docs.iter().map(Self::doc_size).sum();
        let avg_obj_size = if count == 0 { 0 } else { total / count };
        Ok(CollectionStats {
            count,
            avg_obj_size,
        })
    }

    async fn split_vector(
        &self,
        collection: &str,
        field: &str,
        max_chunk_size_bytes: u64,
    ) -> StoreResult<Vec<KeyValue>> {
        if max_chunk_size_bytes == 0 {
            return Err(StoreError::CommandFailed(
                "split_vector: max_chunk_size_bytes must be positive".to_string(),
            ));
        }
        let docs = self.collection(collection);
        let docs = docs.lock().await;
        let mut keyed: Vec<(KeyValue, u64)> = docs
            .iter()
            .filter_map(|doc| KeyValue::of_field(doc, field).map(|key| (key, Self::doc_size(doc))))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        let mut splits = Vec::new();
        let mut chunk_bytes = 0u64;
        for (key, size) in keyed {
            if chunk_bytes + size > max_chunk_size_bytes && chunk_bytes > 0 {
                // Avoid a duplicate boundary when many documents share a key.
                if splits.last() != Some(&key) {
                    splits.push(key);
                }
                chunk_bytes = size;
            } else {
                chunk_bytes += size;
            }
        }
        Ok(splits)
    }
}
