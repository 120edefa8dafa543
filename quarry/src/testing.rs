//! Test doubles.
//!
//! An in-memory persistence driver that records creations and deletions,
//! used by the test suites of this workspace and by controller bootstrap
//! in environments without a database.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::db::{DriverSet, ObjectDriver};
use crate::error::QuarryResult;
use crate::objects::{
    NetInterface, Node, NodeConnection, Resource, ResourceConnection, ResourceDefinition,
    SatelliteConnection, Snapshot, SnapshotDefinition, SnapshotVolume, SnapshotVolumeDefinition,
    StorPool, StorPoolDefinition, Volume, VolumeConnection, VolumeDefinition,
};

/// Records created entities keyed by their natural key.
pub struct InMemoryDriver<K: Ord + Clone + Send, E> {
    map: Mutex<BTreeMap<K, Arc<E>>>,
    key_fn: fn(&E) -> K,
}

impl<K: Ord + Clone + Send, E> InMemoryDriver<K, E> {
    pub fn new(key_fn: fn(&E) -> K) -> Arc<Self> {
        Arc::new(Self {
            map: Mutex::new(BTreeMap::new()),
            key_fn,
        })
    }

    pub fn created_count(&self) -> usize {
        self.map.lock().unwrap().len()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.lock().unwrap().contains_key(key)
    }
}

impl<K: Ord + Clone + Send + Sync, E: Send + Sync> ObjectDriver<K, E> for InMemoryDriver<K, E> {
    fn load(&self, key: &K) -> QuarryResult<Option<Arc<E>>> {
        Ok(self.map.lock().unwrap().get(key).cloned())
    }

    fn create(&self, obj: &Arc<E>) -> QuarryResult<()> {
        let key = (self.key_fn)(obj);
        self.map.lock().unwrap().insert(key, Arc::clone(obj));
        Ok(())
    }

    fn delete(&self, obj: &E) -> QuarryResult<()> {
        let key = (self.key_fn)(obj);
        self.map.lock().unwrap().remove(&key);
        Ok(())
    }
}

/// A complete in-memory driver set.
pub fn in_memory_drivers() -> DriverSet {
    DriverSet {
        node: InMemoryDriver::new(|node: &Node| node.name().clone()),
        net_interface: InMemoryDriver::new(|nif: &NetInterface| {
            (nif.node().name().clone(), nif.name().clone())
        }),
        satellite_connection: InMemoryDriver::new(|conn: &SatelliteConnection| {
            conn.node().name().clone()
        }),
        resource_definition: InMemoryDriver::new(|dfn: &ResourceDefinition| dfn.name().clone()),
        resource: InMemoryDriver::new(|rsc: &Resource| rsc.key()),
        volume_definition: InMemoryDriver::new(|dfn: &VolumeDefinition| dfn.key()),
        volume: InMemoryDriver::new(|vlm: &Volume| vlm.key()),
        stor_pool_definition: InMemoryDriver::new(|dfn: &StorPoolDefinition| dfn.name().clone()),
        stor_pool: InMemoryDriver::new(|pool: &StorPool| pool.key()),
        snapshot_definition: InMemoryDriver::new(|dfn: &SnapshotDefinition| dfn.key()),
        snapshot: InMemoryDriver::new(|snap: &Snapshot| snap.key()),
        snapshot_volume_definition: InMemoryDriver::new(|dfn: &SnapshotVolumeDefinition| dfn.key()),
        snapshot_volume: InMemoryDriver::new(|vlm: &SnapshotVolume| vlm.key()),
        node_connection: InMemoryDriver::new(|conn: &NodeConnection| conn.key()),
        resource_connection: InMemoryDriver::new(|conn: &ResourceConnection| conn.key()),
        volume_connection: InMemoryDriver::new(|conn: &VolumeConnection| conn.key()),
    }
}
