//! The Quarry Satellite.
//!
//! A satellite holds a memory-only mirror of the slice of the cluster
//! topology that concerns it, rebuilt from controller pushes. Nothing
//! here persists and nothing allocates pooled numbers; the mirror
//! construction paths accept the controller's UUIDs and attribute
//! values verbatim and are idempotent against replayed messages.

#![deny(
    asm_sub_register,
    deprecated,
    missing_abi,
    unsafe_code,
    unused_macros,
    unused_must_use,
    unused_unsafe
)]
#![deny(clippy::from_over_into, clippy::needless_question_mark)]
#![cfg_attr(
    not(debug_assertions),
    deny(unused_imports, unused_mut, unused_variables,)
)]

pub mod mirror;
pub mod repos;

pub use repos::SatelliteRepos;

use std::sync::Arc;

use quarry::access::AccessContext;
use quarry::db::DriverSet;

use mirror::{
    NetInterfaceMirror, NodeConnectionMirror, NodeMirror, ResourceConnectionMirror,
    ResourceDefinitionMirror, ResourceMirror, SnapshotDefinitionMirror, SnapshotMirror,
    SnapshotVolumeDefinitionMirror, SnapshotVolumeMirror, StorPoolDefinitionMirror,
    StorPoolMirror, VolumeConnectionMirror, VolumeDefinitionMirror, VolumeMirror,
};

/// The satellite core: repositories and mirror construction paths, all
/// backed by the no-op driver set.
pub struct Satellite {
    pub repos: Arc<SatelliteRepos>,

    pub nodes: NodeMirror,
    pub net_interfaces: NetInterfaceMirror,
    pub resource_definitions: ResourceDefinitionMirror,
    pub resources: ResourceMirror,
    pub volume_definitions: VolumeDefinitionMirror,
    pub volumes: VolumeMirror,
    pub stor_pool_definitions: StorPoolDefinitionMirror,
    pub stor_pools: StorPoolMirror,
    pub snapshot_definitions: SnapshotDefinitionMirror,
    pub snapshots: SnapshotMirror,
    pub snapshot_volume_definitions: SnapshotVolumeDefinitionMirror,
    pub snapshot_volumes: SnapshotVolumeMirror,
    pub node_connections: NodeConnectionMirror,
    pub resource_connections: ResourceConnectionMirror,
    pub volume_connections: VolumeConnectionMirror,
}

impl Satellite {
    pub fn new() -> Self {
        let system = AccessContext::system();
        let repos = Arc::new(SatelliteRepos::new(&system));
        let drivers = DriverSet::no_op();

        Self {
            nodes: NodeMirror::new(Arc::clone(&repos), drivers.clone()),
            net_interfaces: NetInterfaceMirror::new(drivers.clone()),
            resource_definitions: ResourceDefinitionMirror::new(
                Arc::clone(&repos),
                drivers.clone(),
            ),
            resources: ResourceMirror::new(drivers.clone()),
            volume_definitions: VolumeDefinitionMirror::new(drivers.clone()),
            volumes: VolumeMirror::new(drivers.clone()),
            stor_pool_definitions: StorPoolDefinitionMirror::new(
                Arc::clone(&repos),
                drivers.clone(),
            ),
            stor_pools: StorPoolMirror::new(drivers.clone()),
            snapshot_definitions: SnapshotDefinitionMirror::new(drivers.clone()),
            snapshots: SnapshotMirror::new(drivers.clone()),
            snapshot_volume_definitions: SnapshotVolumeDefinitionMirror::new(drivers.clone()),
            snapshot_volumes: SnapshotVolumeMirror::new(drivers.clone()),
            node_connections: NodeConnectionMirror::new(drivers.clone()),
            resource_connections: ResourceConnectionMirror::new(drivers.clone()),
            volume_connections: VolumeConnectionMirror::new(drivers),
            repos,
        }
    }
}

impl Default for Satellite {
    fn default() -> Self {
        Self::new()
    }
}
