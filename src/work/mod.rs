//! Work Table
//!
//! The shared state of a coordinated scan: one record per
//! `(collection, field)` pair holding the unit list and the advisory lease
//! that serializes every mutation of it.
//!
//! ## Submodules
//! - **`types`**: the persisted data model (units, statuses, the table
//!   record) and the protocol's timing knobs.
//! - **`table`**: bootstrap, lease acquire/release with randomized backoff,
//!   and stuck-lock recovery.
//! - **`picker`**: the two-pass unit selection run under the lease.

pub mod picker;
pub mod table;
pub mod types;

pub use picker::{pick_unit, PickedUnit};
pub use table::WorkTableClient;
pub use types::{now_ms, Tunables, Unit, UnitStatus, WorkTable, WORK_COLLECTION};
