//! The Quarry Controller.
//!
//! The authoritative construction paths of the entity graph. Factories
//! here decide whether an entity should exist, draw pooled numeric
//! resources, persist through the injected drivers and register new
//! entities in the cluster-wide repositories. Satellites only ever
//! mirror the decisions made in this crate.

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

pub mod config;
pub mod error;
pub mod factory;
pub mod repos;

pub use config::Config;
pub use error::{ControllerError, ControllerResult};
pub use repos::CoreRepos;

use std::sync::Arc;

use quarry::access::AccessContext;
use quarry::db::DriverSet;
use quarry::pool::{BitmapPool, NumberPool};

use factory::{
    NetInterfaceFactory, NodeConnectionFactory, NodeFactory, ResourceConnectionFactory,
    ResourceDefinitionFactory, ResourceFactory, SatelliteConnectionFactory,
    SnapshotDefinitionFactory, SnapshotFactory, SnapshotVolumeDefinitionFactory,
    SnapshotVolumeFactory, StorPoolDefinitionFactory, StorPoolFactory,
    VolumeConnectionFactory, VolumeDefinitionFactory, VolumeFactory,
};

/// The controller core: repositories, pools and factories wired from a
/// configuration and an injected driver set.
pub struct Controller {
    pub repos: Arc<CoreRepos>,
    pub tcp_port_pool: Arc<dyn NumberPool>,
    pub minor_nr_pool: Arc<dyn NumberPool>,

    pub nodes: NodeFactory,
    pub net_interfaces: NetInterfaceFactory,
    pub satellite_connections: SatelliteConnectionFactory,
    pub resource_definitions: ResourceDefinitionFactory,
    pub resources: ResourceFactory,
    pub volume_definitions: VolumeDefinitionFactory,
    pub volumes: VolumeFactory,
    pub stor_pool_definitions: StorPoolDefinitionFactory,
    pub stor_pools: StorPoolFactory,
    pub snapshot_definitions: SnapshotDefinitionFactory,
    pub snapshots: SnapshotFactory,
    pub snapshot_volume_definitions: SnapshotVolumeDefinitionFactory,
    pub snapshot_volumes: SnapshotVolumeFactory,
    pub node_connections: NodeConnectionFactory,
    pub resource_connections: ResourceConnectionFactory,
    pub volume_connections: VolumeConnectionFactory,
}

impl Controller {
    /// Builds the controller core and bootstraps the reserved diskless
    /// storage pool definition.
    pub fn new(config: &Config, drivers: DriverSet) -> ControllerResult<Self> {
        let system = AccessContext::system();
        let repos = Arc::new(CoreRepos::new(&system));

        let tcp_port_pool: Arc<dyn NumberPool> = Arc::new(BitmapPool::new(
            u32::from(config.port_range.start),
            u32::from(config.port_range.end),
        ));
        let minor_nr_pool: Arc<dyn NumberPool> =
            Arc::new(BitmapPool::new(config.minor_range.start, config.minor_range.end));

        let controller = Self {
            nodes: NodeFactory::new(Arc::clone(&repos), drivers.clone()),
            net_interfaces: NetInterfaceFactory::new(drivers.clone()),
            satellite_connections: SatelliteConnectionFactory::new(drivers.clone()),
            resource_definitions: ResourceDefinitionFactory::new(
                Arc::clone(&repos),
                drivers.clone(),
                Arc::clone(&tcp_port_pool),
            ),
            resources: ResourceFactory::new(drivers.clone()),
            volume_definitions: VolumeDefinitionFactory::new(
                drivers.clone(),
                Arc::clone(&minor_nr_pool),
            ),
            volumes: VolumeFactory::new(drivers.clone()),
            stor_pool_definitions: StorPoolDefinitionFactory::new(
                Arc::clone(&repos),
                drivers.clone(),
            ),
            stor_pools: StorPoolFactory::new(drivers.clone()),
            snapshot_definitions: SnapshotDefinitionFactory::new(drivers.clone()),
            snapshots: SnapshotFactory::new(drivers.clone()),
            snapshot_volume_definitions: SnapshotVolumeDefinitionFactory::new(drivers.clone()),
            snapshot_volumes: SnapshotVolumeFactory::new(drivers.clone()),
            node_connections: NodeConnectionFactory::new(drivers.clone()),
            resource_connections: ResourceConnectionFactory::new(drivers.clone()),
            volume_connections: VolumeConnectionFactory::new(drivers.clone()),
            repos,
            tcp_port_pool,
            minor_nr_pool,
        };

        controller
            .stor_pool_definitions
            .ensure_diskless_default(&system)?;
        Ok(controller)
    }
}
