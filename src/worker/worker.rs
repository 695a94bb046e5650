use super::hooks::ScanHooks;
use crate::split::{SplitFinder, SplitStrategy};
use crate::store::{DocumentStore, Range};
use crate::work::{now_ms, pick_unit, PickedUnit, Tunables, Unit, UnitStatus, WorkTable, WorkTableClient};

use anyhow::{Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Parameters of one scan, shared by every worker participating in it.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub collection: String,
    pub field: String,
    pub num_units: usize,
    pub strategy: SplitStrategy,
    pub tunables: Tunables,
}

impl WorkerConfig {
    pub fn new(collection: &str, num_units: usize) -> Self {
        Self {
            collection: collection.to_string(),
            field: "_id".to_string(),
            num_units,
            strategy: SplitStrategy::Sample,
            tunables: Tunables::default(),
        }
    }

    pub fn split_field(mut self, field: &str) -> Self {
        self.field = field.to_string();
        self
    }

    pub fn strategy(mut self, strategy: SplitStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn tunables(mut self, tunables: Tunables) -> Self {
        self.tunables = tunables;
        self
    }
}

/// How a worker's life ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Ran out of units to claim after finishing its work.
    Completed,
    /// A heartbeat found the unit reassigned; the worker stepped aside.
    Fired,
    /// There was nothing to claim at startup.
    NoWork,
}

/// Handle to a spawned worker.
pub struct WorkerHandle {
    id: String,
    join: Option<tokio::task::JoinHandle<Result<ScanOutcome>>>,
}

impl WorkerHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits for the worker's scan loop to end.
    pub async fn join(self) -> Result<ScanOutcome> {
        match self.join {
            Some(handle) => handle.await?,
            None => Ok(ScanOutcome::NoWork),
        }
    }
}

enum Heartbeat {
    Alive,
    Fired,
}

/// One scanning actor. Many workers, each in its own task and typically its
/// own process, coordinate exclusively through the shared work table.
pub struct Worker {
    id: String,
    store: Arc<dyn DocumentStore>,
    config: WorkerConfig,
    hooks: ScanHooks,
    table: WorkTableClient,
    unit: PickedUnit,
}

impl Worker {
    /// Initializes a worker against the work table and, if it could claim a
    /// unit, spawns its scan loop.
    ///
    /// Under the lease: creates the unit list when it is absent or fully
    /// completed (a completed table is reset for a rerun), then picks a
    /// unit. Workers that find nothing to claim terminate immediately with
    /// [`ScanOutcome::NoWork`].
    pub async fn spawn(
        store: Arc<dyn DocumentStore>,
        config: WorkerConfig,
        hooks: ScanHooks,
    ) -> Result<WorkerHandle> {
        let id = Uuid::new_v4().to_string();
        let table = WorkTableClient::new(
            store.clone(),
            &config.collection,
            &config.field,
            config.tunables.clone(),
        );
        table.ensure().await?;

        let mut record = table.acquire().await?;
        if record.units.is_none() || record.all_units_completed() {
            match Self::initialize_units(&store, &config).await {
                Ok(units) => record.units = Some(units),
                Err(e) => {
                    // Surface the initialization error, but never leave
                    // with the lease held.
                    table.release(&mut record).await.ok();
                    return Err(e);
                }
            }
        }
        let picked = pick_unit(&mut record, &id, &config.tunables);
        table.release(&mut record).await?;

        match picked {
            Some(unit) => {
                let worker = Worker {
                    id: id.clone(),
                    store,
                    config,
                    hooks,
                    table,
                    unit,
                };
                let join = tokio::spawn(worker.run());
                Ok(WorkerHandle {
                    id,
                    join: Some(join),
                })
            }
            None => {
                tracing::info!("worker {} found nothing to claim, terminating", id);
                Ok(WorkerHandle { id, join: None })
            }
        }
    }

    async fn initialize_units(
        store: &Arc<dyn DocumentStore>,
        config: &WorkerConfig,
    ) -> Result<Vec<Unit>> {
        let finder = SplitFinder::new(
            store.clone(),
            &config.collection,
            &config.field,
            config.num_units,
            config.strategy,
        )
        .await?;
        tracing::info!(
            "initialized {} unit(s) over ({}, {})",
            finder.num_ranges(),
            config.collection,
            config.field
        );
        Ok(finder
            .ranges()
            .iter()
            .map(|range| Unit::open(range.lower.clone(), range.upper.clone()))
            .collect())
    }

    async fn run(mut self) -> Result<ScanOutcome> {
        let mut last_heartbeat = Instant::now();
        let heartbeat_interval = Duration::from_millis(self.config.tunables.heartbeat_millis);
        self.hooks.run_start_processing().await;

        loop {
            if !self.unit.cleanup {
                self.hooks
                    .run_start_unit(&self.unit.lower_bound, &self.unit.upper_bound)
                    .await;
                let range = Range::new(
                    self.unit.lower_bound.clone(),
                    self.unit.upper_bound.clone(),
                );
                let mut cursor = self
                    .store
                    .find_range(&self.config.collection, &self.config.field, &range)
                    .await?;
                while let Some(doc) = cursor.next().await {
                    self.hooks.run_process(doc?).await?;
                    if last_heartbeat.elapsed() >= heartbeat_interval {
                        match self.write_heartbeat().await? {
                            Heartbeat::Alive => last_heartbeat = Instant::now(),
                            Heartbeat::Fired => {
                                tracing::warn!(
                                    "worker {} fired from unit {}",
                                    self.id,
                                    self.unit.num_unit
                                );
                                self.hooks
                                    .run_fired(&self.unit.lower_bound, &self.unit.upper_bound)
                                    .await;
                                return Ok(ScanOutcome::Fired);
                            }
                        }
                    }
                }
                self.hooks
                    .run_finish_unit(&self.unit.lower_bound, &self.unit.upper_bound)
                    .await;
            } else {
                self.hooks
                    .run_cleanup(&self.unit.lower_bound, &self.unit.upper_bound)
                    .await;
            }

            let mut record = self.table.acquire().await?;
            let marked = self.mark_unit_done(&mut record);
            if let Err(e) = marked {
                // Never leave with the lease held, even on a corrupt table.
                self.table.release(&mut record).await.ok();
                return Err(e);
            }
            let picked = pick_unit(&mut record, &self.id, &self.config.tunables);
            self.table.release(&mut record).await?;
            match picked {
                Some(unit) => self.unit = unit,
                None => break,
            }
        }

        self.hooks.run_finish_processing().await;
        tracing::info!("worker {} finished", self.id);
        Ok(ScanOutcome::Completed)
    }

    /// Refreshes the unit's timestamp under the lease. An owner mismatch
    /// means a peer claimed the unit for cleanup after missed heartbeats;
    /// the worker must stand down without marking anything.
    async fn write_heartbeat(&self) -> Result<Heartbeat> {
        let mut record = self.table.acquire().await?;
        let verdict = self.refresh_owned_unit(&mut record);
        let released = self.table.release(&mut record).await;
        let verdict = verdict?;
        released?;
        Ok(verdict)
    }

    fn refresh_owned_unit(&self, record: &mut WorkTable) -> Result<Heartbeat> {
        let units = record
            .units
            .as_mut()
            .context("work table lost its unit list")?;
        let unit = units
            .get_mut(self.unit.num_unit)
            .context("unit index out of range")?;
        if unit.owner.as_deref() == Some(self.id.as_str()) {
            unit.ts = now_ms();
            Ok(Heartbeat::Alive)
        } else {
            Ok(Heartbeat::Fired)
        }
    }

    /// Post-iteration transition: a processed unit completes, a cleaned
    /// unit reopens for regular processing by whoever picks it next.
    fn mark_unit_done(&self, record: &mut WorkTable) -> Result<()> {
        let units = record
            .units
            .as_mut()
            .context("work table lost its unit list")?;
        let unit = units
            .get_mut(self.unit.num_unit)
            .context("unit index out of range")?;
        unit.status = if self.unit.cleanup {
            UnitStatus::Open
        } else {
            UnitStatus::Completed
        };
        unit.owner = None;
        unit.ts = now_ms();
        Ok(())
    }
}
