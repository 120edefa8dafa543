//! Persistence driver contracts.
//!
//! The SQL-backed drivers live outside this crate; entities and factories
//! only consume the load/create/delete contract. Satellites run with the
//! no-op driver: a satellite never persists, its state is a memory-only
//! mirror rebuilt from controller pushes.

use std::sync::Arc;

use crate::error::QuarryResult;
use crate::identifier::{
    NetInterfaceName, NodeName, ResourceName, SnapshotName, StorPoolName, VolumeNumber,
};
use crate::objects::{
    NetInterface, Node, NodeConnection, Resource, ResourceConnection, ResourceDefinition,
    SatelliteConnection, Snapshot, SnapshotDefinition, SnapshotVolume, SnapshotVolumeDefinition,
    StorPool, StorPoolDefinition, Volume, VolumeConnection, VolumeDefinition,
};

/// Per-entity persistence contract, keyed by the entity's natural key.
pub trait ObjectDriver<K, E>: Send + Sync {
    fn load(&self, key: &K) -> QuarryResult<Option<Arc<E>>>;

    fn create(&self, obj: &Arc<E>) -> QuarryResult<()>;

    fn delete(&self, obj: &E) -> QuarryResult<()>;
}

pub type DriverRef<K, E> = Arc<dyn ObjectDriver<K, E>>;

/// The driver used on satellites: loads nothing, persists nothing.
pub struct NoOpDriver;

impl<K: Send + Sync, E: Send + Sync> ObjectDriver<K, E> for NoOpDriver {
    fn load(&self, _key: &K) -> QuarryResult<Option<Arc<E>>> {
        Ok(None)
    }

    fn create(&self, _obj: &Arc<E>) -> QuarryResult<()> {
        Ok(())
    }

    fn delete(&self, _obj: &E) -> QuarryResult<()> {
        Ok(())
    }
}

/// One driver per entity type, injected into the factories.
#[derive(Clone)]
pub struct DriverSet {
    pub node: DriverRef<NodeName, Node>,
    pub net_interface: DriverRef<(NodeName, NetInterfaceName), NetInterface>,
    pub satellite_connection: DriverRef<NodeName, SatelliteConnection>,
    pub resource_definition: DriverRef<ResourceName, ResourceDefinition>,
    pub resource: DriverRef<(NodeName, ResourceName), Resource>,
    pub volume_definition: DriverRef<(ResourceName, VolumeNumber), VolumeDefinition>,
    pub volume: DriverRef<(NodeName, ResourceName, VolumeNumber), Volume>,
    pub stor_pool_definition: DriverRef<StorPoolName, StorPoolDefinition>,
    pub stor_pool: DriverRef<(NodeName, StorPoolName), StorPool>,
    pub snapshot_definition: DriverRef<(ResourceName, SnapshotName), SnapshotDefinition>,
    pub snapshot: DriverRef<(NodeName, ResourceName, SnapshotName), Snapshot>,
    pub snapshot_volume_definition:
        DriverRef<(ResourceName, SnapshotName, VolumeNumber), SnapshotVolumeDefinition>,
    pub snapshot_volume:
        DriverRef<(NodeName, ResourceName, SnapshotName, VolumeNumber), SnapshotVolume>,
    pub node_connection: DriverRef<(NodeName, NodeName), NodeConnection>,
    pub resource_connection: DriverRef<(NodeName, NodeName, ResourceName), ResourceConnection>,
    pub volume_connection:
        DriverRef<(NodeName, NodeName, ResourceName, VolumeNumber), VolumeConnection>,
}

impl DriverSet {
    /// The satellite driver set: every driver is a no-op.
    pub fn no_op() -> Self {
        Self {
            node: Arc::new(NoOpDriver),
            net_interface: Arc::new(NoOpDriver),
            satellite_connection: Arc::new(NoOpDriver),
            resource_definition: Arc::new(NoOpDriver),
            resource: Arc::new(NoOpDriver),
            volume_definition: Arc::new(NoOpDriver),
            volume: Arc::new(NoOpDriver),
            stor_pool_definition: Arc::new(NoOpDriver),
            stor_pool: Arc::new(NoOpDriver),
            snapshot_definition: Arc::new(NoOpDriver),
            snapshot: Arc::new(NoOpDriver),
            snapshot_volume_definition: Arc::new(NoOpDriver),
            snapshot_volume: Arc::new(NoOpDriver),
            node_connection: Arc::new(NoOpDriver),
            resource_connection: Arc::new(NoOpDriver),
            volume_connection: Arc::new(NoOpDriver),
        }
    }
}
