use super::types::*;
use crate::store::KeyValue;

/// The unit a worker claimed, as local worker state.
#[derive(Debug, Clone)]
pub struct PickedUnit {
    pub num_unit: usize,
    pub lower_bound: Option<KeyValue>,
    pub upper_bound: Option<KeyValue>,
    pub cleanup: bool,
}

/// Scans the unit list and claims one, mutating the in-memory table. Must
/// be called while holding the lease, with units present.
///
/// Pass 1 takes the first stale claimed unit and marks it for cleanup: a
/// `processing` unit whose owner stopped heartbeating, or a `cleanup` unit
/// whose cleaner itself died. Pass 2 takes the first open unit for regular
/// processing. Returns `None` when no work remains.
pub fn pick_unit(table: &mut WorkTable, worker_id: &str, tunables: &Tunables) -> Option<PickedUnit> {
    let units = table.units.as_mut()?;
    let now = now_ms();
    let stale_millis = tunables.stale_millis();

    for (i, unit) in units.iter_mut().enumerate() {
        let claimed = matches!(unit.status, UnitStatus::Processing | UnitStatus::Cleanup);
        if claimed && now.saturating_sub(unit.ts) > stale_millis {
            tracing::info!(
                "worker {} claiming stale unit {} ({:?}, owner {:?}) for cleanup",
                worker_id,
                i,
                unit.status,
                unit.owner
            );
            unit.status = UnitStatus::Cleanup;
            unit.owner = Some(worker_id.to_string());
            unit.ts = now;
            return Some(PickedUnit {
                num_unit: i,
                lower_bound: unit.lower_bound.clone(),
                upper_bound: unit.upper_bound.clone(),
                cleanup: true,
            });
        }
    }

    for (i, unit) in units.iter_mut().enumerate() {
        if unit.status == UnitStatus::Open {
            tracing::debug!("worker {} claiming open unit {}", worker_id, i);
            unit.status = UnitStatus::Processing;
            unit.owner = Some(worker_id.to_string());
            unit.ts = now;
            return Some(PickedUnit {
                num_unit: i,
                lower_bound: unit.lower_bound.clone(),
                upper_bound: unit.upper_bound.clone(),
                cleanup: false,
            });
        }
    }

    None
}
