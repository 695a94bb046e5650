//! Coordinated Parallel Scan Framework
//!
//! A fleet of independent workers, without central coordination, processes
//! every document of a collection exactly once (modulo crash recovery).
//! Each worker claims a disjoint key range of the collection; if a worker
//! dies mid-range, a peer detects the missed heartbeats, cleans the range
//! up, and makes it available again.
//!
//! ## Architecture Modules
//! The crate is composed of four subsystems, leaves first:
//!
//! - **`store`**: The capability layer over the document store. Everything
//!   the coordination core needs (atomic conditional updates,
//!   insert-unique, indexed range scans, collection statistics) sits behind
//!   one trait, with an in-memory reference implementation.
//! - **`split`**: The range partitioning algorithm. Divides the collection
//!   into approximately equal units of a chosen split field, either by
//!   sampling every key or from the store's statistics facility.
//! - **`work`**: The shared work table. One record per
//!   `(collection, field)` pair carries the unit list and the advisory
//!   lease that serializes all mutations of it, with stuck-lock recovery.
//! - **`worker`**: The scanning actor. Claims units, streams their ranges
//!   through the user's `process` callback, heartbeats, and hands stale
//!   work to peers via the cleanup protocol.

pub mod split;
pub mod store;
pub mod work;
pub mod worker;
