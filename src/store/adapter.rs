use super::types::*;

use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;

/// A lazy cursor over matching documents, delivered in key order.
pub type DocumentStream = Pin<Box<dyn Stream<Item = StoreResult<Document>> + Send>>;

/// The capabilities the coordination core assumes from the document store.
///
/// Everything the framework persists goes through this seam: the work table
/// lives behind the atomic single-record operations, the data collection is
/// only ever read through `find_range`, and the two split strategies consume
/// `project_sorted` and `collection_stats`/`split_vector` respectively.
/// No multi-record transactions are required.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates a unique index over `fields`. Idempotent.
    async fn create_unique_index(&self, collection: &str, fields: &[&str]) -> StoreResult<()>;

    /// Inserts a document, assigning a fresh `_id` when absent.
    async fn insert(&self, collection: &str, doc: Document) -> StoreResult<()>;

    /// Inserts a document; fails with [`StoreError::DuplicateKey`] when a
    /// uniqueness constraint is violated.
    async fn insert_unique(&self, collection: &str, doc: Document) -> StoreResult<()>;

    /// Returns the first document matching `filter`, without modifying it.
    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>>;

    /// Atomically updates the first document matching `filter` and returns
    /// the post-update document, or `None` when nothing matched.
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<Option<Document>>;

    /// Atomically replaces the first document matching `filter`. Returns
    /// whether a document matched.
    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        doc: Document,
    ) -> StoreResult<bool>;

    /// Cursor over documents whose `field` lies in `range`, ascending by
    /// `field`. Documents without a scalar `field` value are not matched.
    async fn find_range(
        &self,
        collection: &str,
        field: &str,
        range: &Range,
    ) -> StoreResult<DocumentStream>;

    /// All scalar values of `field` across the collection, ascending.
    async fn project_sorted(&self, collection: &str, field: &str) -> StoreResult<Vec<KeyValue>>;

    /// The store's collection-statistics command.
    async fn collection_stats(&self, collection: &str) -> StoreResult<CollectionStats>;

    /// Interior split keys of `field` such that the data between two
    /// consecutive keys is bounded by roughly `max_chunk_size_bytes`.
    async fn split_vector(
        &self,
        collection: &str,
        field: &str,
        max_chunk_size_bytes: u64,
    ) -> StoreResult<Vec<KeyValue>>;
}
