//! Store Adapter
//!
//! Thin capability layer between the coordination core and the document
//! store. The [`DocumentStore`] trait names exactly the operations the
//! framework needs (atomic conditional update on a single record,
//! insert-unique, indexed range scans, collection statistics); everything
//! above this module is store-agnostic.
//!
//! ## Submodules
//! - **`types`**: documents, key values and their total order, ranges,
//!   filters, updates, and the store error type.
//! - **`adapter`**: the `DocumentStore` trait and its cursor type.
//! - **`memory`**: in-memory reference implementation used by the demo
//!   driver and the tests.

pub mod adapter;
pub mod memory;
pub mod types;

pub use adapter::{DocumentStore, DocumentStream};
pub use memory::MemoryStore;
pub use types::{CollectionStats, Document, Filter, KeyValue, Range, StoreError, StoreResult, Update};
