use super::types::*;
use crate::store::{DocumentStore, Filter, StoreError, Update};

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

/// Client for one work-table record: bootstrap, lease acquire/release, and
/// stuck-lock recovery.
///
/// The lease is an advisory boolean on the record. It becomes effectively
/// exclusive because every acquisition goes through the store's atomic
/// conditional update, filtered on `lock == false`. Mutations of the unit
/// list happen on the in-memory copy returned by [`acquire`] and are
/// persisted in full by [`release`].
///
/// [`acquire`]: WorkTableClient::acquire
/// [`release`]: WorkTableClient::release
pub struct WorkTableClient {
    store: Arc<dyn DocumentStore>,
    collection: String,
    field: String,
    tunables: Tunables,
}

impl WorkTableClient {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collection: &str,
        field: &str,
        tunables: Tunables,
    ) -> Self {
        Self {
            store,
            collection: collection.to_string(),
            field: field.to_string(),
            tunables,
        }
    }

    fn key_filter(&self) -> Filter {
        Filter::new()
            .eq("collection", self.collection.as_str())
            .eq("field", self.field.as_str())
    }

    /// Makes sure the work collection has a record for this scan. A
    /// duplicate-key failure means another worker got there first and is
    /// treated as success.
    pub async fn ensure(&self) -> Result<()> {
        self.store
            .create_unique_index(WORK_COLLECTION, &["collection", "field"])
            .await?;
        let table = WorkTable::fresh(&self.collection, &self.field);
        let doc = serde_json::to_value(&table)?;
        match self.store.insert_unique(WORK_COLLECTION, doc).await {
            Ok(()) => {
                tracing::info!(
                    "created work table for ({}, {})",
                    self.collection,
                    self.field
                );
                Ok(())
            }
            Err(StoreError::DuplicateKey { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Takes the lease, waiting as long as it takes. Each failed attempt
    /// runs the stuck-lock check and sleeps a jittered backoff.
    pub async fn acquire(&self) -> Result<WorkTable> {
        loop {
            let filter = self.key_filter().eq("lock", false);
            let update = Update::new().set("lock", true).set("ts", now_ms());
            let result = self
                .store
                .find_one_and_update(WORK_COLLECTION, &filter, &update)
                .await?;
            if let Some(doc) = result {
                let table: WorkTable = serde_json::from_value(doc)
                    .context("work table record has unexpected shape")?;
                return Ok(table);
            }
            self.check_stuck_lock().await?;
            let jitter = 0.9 + 0.2 * rand::random::<f64>();
            let interval = (jitter * self.tunables.backoff_millis as f64) as u64;
            tokio::time::sleep(Duration::from_millis(interval)).await;
        }
    }

    /// Writes the mutated in-memory copy back with the lease cleared.
    pub async fn release(&self, table: &mut WorkTable) -> Result<()> {
        table.lock = false;
        table.ts = now_ms();
        let id = table
            .id
            .clone()
            .context("cannot release a work table that was never persisted")?;
        let doc = serde_json::to_value(&*table)?;
        self.store
            .replace_one(WORK_COLLECTION, &Filter::new().eq("_id", id), doc)
            .await?;
        Ok(())
    }

    /// Reads the record without touching the lease. If some holder kept it
    /// past `max_lock_millis` with units present, clears it. Filtering on
    /// the observed timestamp guarantees at most one clearer succeeds.
    async fn check_stuck_lock(&self) -> Result<()> {
        let doc = match self
            .store
            .find_one(WORK_COLLECTION, &self.key_filter())
            .await?
        {
            Some(doc) => doc,
            None => return Ok(()),
        };
        let table: WorkTable =
            serde_json::from_value(doc).context("work table record has unexpected shape")?;
        if !table.lock {
            return Ok(());
        }
        // Without a unit list the holder may legitimately be inside the
        // initial split computation, which can take a long time.
        if table.units.is_none() {
            return Ok(());
        }
        let age = now_ms().saturating_sub(table.ts);
        if age > self.tunables.max_lock_millis {
            tracing::warn!(
                "lock on ({}, {}) stuck for {} ms, clearing it",
                self.collection,
                self.field,
                age
            );
            let filter = self.key_filter().eq("ts", table.ts);
            let update = Update::new().set("lock", false).set("ts", now_ms());
            self.store
                .find_one_and_update(WORK_COLLECTION, &filter, &update)
                .await?;
        }
        Ok(())
    }

    /// Snapshot of the record, for inspection. Does not take the lease.
    pub async fn read(&self) -> Result<Option<WorkTable>> {
        let doc = self
            .store
            .find_one(WORK_COLLECTION, &self.key_filter())
            .await?;
        match doc {
            Some(doc) => Ok(Some(
                serde_json::from_value(doc).context("work table record has unexpected shape")?,
            )),
            None => Ok(None),
        }
    }

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }
}
