//! StateStore: redb-backed fleet state for Stagegrid.
//!
//! Provides typed CRUD operations over clusters, managed units, rollouts,
//! and rollout status. All values are JSON-serialized into redb's `&[u8]`
//! value columns. The store supports both on-disk and in-memory backends
//! (the latter for testing).
//!
//! Unit and rollout writes publish a [`StoreEvent`] after the transaction
//! commits; subscribe with [`StateStore::subscribe`].

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Capacity of the change-event channel. Lagging subscribers drop events.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    events: broadcast::Sender<StoreEvent>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::from_database(db);
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::from_database(db);
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn from_database(db: Database) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            db: Arc::new(db),
            events,
        }
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        txn.open_table(UNITS).map_err(map_err!(Table))?;
        txn.open_table(ROLLOUTS).map_err(map_err!(Table))?;
        txn.open_table(ROLLOUT_STATUS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Subscribe to unit and rollout change events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    // ── Generic table access ───────────────────────────────────────

    fn put_json<T: Serialize>(&self, table: Table, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, table: Table, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// List values whose key starts with `prefix` (empty prefix lists all).
    fn list_json<T: DeserializeOwned>(&self, table: Table, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let item: T =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(item);
            }
        }
        Ok(results)
    }

    /// Remove a key and return the value it held, if any.
    fn take_json<T: DeserializeOwned>(&self, table: Table, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed = {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            let guard = table.remove(key).map_err(map_err!(Write))?;
            match guard {
                Some(guard) => Some(
                    serde_json::from_slice::<T>(guard.value()).map_err(map_err!(Deserialize))?,
                ),
                None => None,
            }
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(removed)
    }

    // ── Clusters ───────────────────────────────────────────────────

    /// Register or update a cluster.
    pub fn put_cluster(&self, cluster: &ClusterRecord) -> StateResult<()> {
        self.put_json(CLUSTERS, &cluster.name, cluster)?;
        debug!(cluster = %cluster.name, "cluster stored");
        Ok(())
    }

    /// Get a cluster by name.
    pub fn get_cluster(&self, name: &str) -> StateResult<Option<ClusterRecord>> {
        self.get_json(CLUSTERS, name)
    }

    /// List all registered clusters, ordered by name.
    pub fn list_clusters(&self) -> StateResult<Vec<ClusterRecord>> {
        self.list_json(CLUSTERS, "")
    }

    /// Remove a cluster. Returns true if it existed.
    pub fn delete_cluster(&self, name: &str) -> StateResult<bool> {
        let existed = self.take_json::<ClusterRecord>(CLUSTERS, name)?.is_some();
        debug!(cluster = %name, existed, "cluster deleted");
        Ok(existed)
    }

    // ── Units ──────────────────────────────────────────────────────

    /// Insert or update a managed unit and publish the change.
    pub fn put_unit(&self, unit: &ManagedUnit) -> StateResult<()> {
        let key = unit.table_key();
        self.put_json(UNITS, &key, unit)?;
        debug!(%key, sync = ?unit.sync, health = ?unit.health, "unit stored");
        self.publish(StoreEvent::Unit {
            kind: EventKind::Upserted,
            unit: unit.clone(),
        });
        Ok(())
    }

    /// Get a unit by `{namespace}/{name}` key.
    pub fn get_unit(&self, key: &str) -> StateResult<Option<ManagedUnit>> {
        self.get_json(UNITS, key)
    }

    /// List all units, ordered by key.
    pub fn list_units(&self) -> StateResult<Vec<ManagedUnit>> {
        self.list_json(UNITS, "")
    }

    /// List the units carrying an owner reference equal to `source`.
    pub fn list_units_owned_by(&self, source: &SourceRef) -> StateResult<Vec<ManagedUnit>> {
        let units: Vec<ManagedUnit> = self.list_json(UNITS, "")?;
        Ok(units.into_iter().filter(|u| u.is_owned_by(source)).collect())
    }

    /// Delete a unit by key and publish the removal. Returns true if it existed.
    pub fn delete_unit(&self, key: &str) -> StateResult<bool> {
        let removed = self.take_json::<ManagedUnit>(UNITS, key)?;
        debug!(%key, existed = removed.is_some(), "unit deleted");
        match removed {
            Some(unit) => {
                self.publish(StoreEvent::Unit {
                    kind: EventKind::Deleted,
                    unit,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ── Rollouts ───────────────────────────────────────────────────

    /// Insert or replace a rollout and publish the change.
    pub fn put_rollout(&self, rollout: &Rollout) -> StateResult<()> {
        let key = rollout.key();
        self.put_json(ROLLOUTS, &key.table_key(), rollout)?;
        debug!(rollout = %key, stages = rollout.spec.stages.len(), "rollout stored");
        self.publish(StoreEvent::Rollout {
            kind: EventKind::Upserted,
            key,
        });
        Ok(())
    }

    /// Get a rollout by key.
    pub fn get_rollout(&self, key: &RolloutKey) -> StateResult<Option<Rollout>> {
        self.get_json(ROLLOUTS, &key.table_key())
    }

    /// List every rollout in every namespace.
    pub fn list_rollouts(&self) -> StateResult<Vec<Rollout>> {
        self.list_json(ROLLOUTS, "")
    }

    /// List the rollouts of one namespace.
    pub fn list_rollouts_in_namespace(&self, namespace: &str) -> StateResult<Vec<Rollout>> {
        self.list_json(ROLLOUTS, &format!("{namespace}/"))
    }

    /// Delete a rollout together with its status. Returns true if it existed.
    pub fn delete_rollout(&self, key: &RolloutKey) -> StateResult<bool> {
        let table_key = key.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed = {
            let mut rollouts = txn.open_table(ROLLOUTS).map_err(map_err!(Table))?;
            let mut statuses = txn.open_table(ROLLOUT_STATUS).map_err(map_err!(Table))?;
            statuses
                .remove(table_key.as_str())
                .map_err(map_err!(Write))?;
            let removed = rollouts
                .remove(table_key.as_str())
                .map_err(map_err!(Write))?
                .is_some();
            removed
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(rollout = %key, existed, "rollout deleted");
        if existed {
            self.publish(StoreEvent::Rollout {
                kind: EventKind::Deleted,
                key: key.clone(),
            });
        }
        Ok(existed)
    }

    // ── Rollout status ─────────────────────────────────────────────

    /// Record the result of the latest pass for a rollout.
    ///
    /// The write is skipped when the rollout no longer exists, so a pass that
    /// races a delete cannot leave an orphaned status behind. Returns whether
    /// the status was written.
    pub fn put_rollout_status(
        &self,
        key: &RolloutKey,
        status: &RolloutStatus,
    ) -> StateResult<bool> {
        let table_key = key.table_key();
        let bytes = serde_json::to_vec(status).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let exists = {
            let rollouts = txn.open_table(ROLLOUTS).map_err(map_err!(Table))?;
            let found = rollouts
                .get(table_key.as_str())
                .map_err(map_err!(Read))?
                .is_some();
            found
        };
        if !exists {
            txn.abort().map_err(map_err!(Transaction))?;
            debug!(rollout = %key, "rollout gone, status dropped");
            return Ok(false);
        }
        {
            let mut statuses = txn.open_table(ROLLOUT_STATUS).map_err(map_err!(Table))?;
            statuses
                .insert(table_key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(true)
    }

    /// Get the last recorded status of a rollout.
    pub fn get_rollout_status(&self, key: &RolloutKey) -> StateResult<Option<RolloutStatus>> {
        self.get_json(ROLLOUT_STATUS, &key.table_key())
    }
}
