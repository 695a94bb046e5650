use crate::store::KeyValue;
use serde::{Deserialize, Serialize};

/// Name of the collection holding work tables, in the same database as the
/// data collections they coordinate.
pub const WORK_COLLECTION: &str = "work";

/// Lifecycle of a unit.
///
/// Normal path: `Open -> Processing -> Completed`. Recovery path:
/// `Processing -> Cleanup -> Open`. Cleanup is only ever entered from a
/// claimed state, never from `Open`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Open,
    Processing,
    Cleanup,
    Completed,
}

/// One contiguous range of the split field, assigned to at most one worker
/// at a time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Unit {
    pub lower_bound: Option<KeyValue>,
    pub upper_bound: Option<KeyValue>,
    pub status: UnitStatus,
    /// Worker currently responsible; absent unless processing or cleanup.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub owner: Option<String>,
    /// Timestamp of the last status change or heartbeat, in epoch millis.
    pub ts: u64,
}

impl Unit {
    pub fn open(lower_bound: Option<KeyValue>, upper_bound: Option<KeyValue>) -> Self {
        Self {
            lower_bound,
            upper_bound,
            status: UnitStatus::Open,
            owner: None,
            ts: now_ms(),
        }
    }
}

/// The shared record coordinating one scan, keyed by `(collection, field)`.
///
/// The whole unit list lives in this single record and is written back in
/// full under the lease, so no cross-record atomicity is ever needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkTable {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none", default)]
    pub id: Option<serde_json::Value>,
    /// Data collection this table coordinates.
    pub collection: String,
    /// Split field of the scan.
    pub field: String,
    /// Advisory lease; true while some worker holds it.
    pub lock: bool,
    /// When the lease was last taken or released, in epoch millis.
    pub ts: u64,
    /// Ordered units tiling the key space; absent until first
    /// initialization.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub units: Option<Vec<Unit>>,
}

impl WorkTable {
    pub fn fresh(collection: &str, field: &str) -> Self {
        Self {
            id: None,
            collection: collection.to_string(),
            field: field.to_string(),
            lock: false,
            ts: now_ms(),
            units: None,
        }
    }

    pub fn all_units_completed(&self) -> bool {
        match &self.units {
            Some(units) => units
                .iter()
                .all(|unit| unit.status == UnitStatus::Completed),
            None => false,
        }
    }
}

/// Timing knobs of the coordination protocol.
#[derive(Debug, Clone)]
pub struct Tunables {
    /// Nominal sleep between lease-acquisition attempts; jittered to
    /// 0.9-1.1x.
    pub backoff_millis: u64,
    /// Age past which a held lease with units present is forcibly cleared.
    pub max_lock_millis: u64,
    /// Interval between heartbeats while processing a unit.
    pub heartbeat_millis: u64,
    /// Missed heartbeats before a unit counts as stale.
    pub max_missed_heartbeats: u64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            backoff_millis: 100,
            max_lock_millis: 1_000,
            heartbeat_millis: 10_000,
            max_missed_heartbeats: 2,
        }
    }
}

impl Tunables {
    /// Age past which a claimed unit counts as stale.
    pub fn stale_millis(&self) -> u64 {
        self.max_missed_heartbeats * self.heartbeat_millis
    }
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}
