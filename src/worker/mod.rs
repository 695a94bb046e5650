//! Worker
//!
//! The long-running actor of the framework. Each worker claims one unit at
//! a time under the work-table lease, scans the unit's key range from the
//! data collection, heartbeats on the wall clock while it does, and marks
//! the unit's terminal transition before picking the next. Crash recovery
//! falls out of the same loop: a worker that picks a stale unit runs the
//! user's cleanup hook instead of the scan, and a worker whose unit was
//! taken over discovers it at its next heartbeat and stands down.
//!
//! ## Submodules
//! - **`hooks`**: the pluggable per-scan callbacks (`process` plus optional
//!   lifecycle hooks).
//! - **`worker`**: configuration, initialization, and the scan loop.

pub mod hooks;
pub mod worker;

pub use hooks::ScanHooks;
pub use worker::{ScanOutcome, Worker, WorkerConfig, WorkerHandle};

#[cfg(test)]
mod tests;
