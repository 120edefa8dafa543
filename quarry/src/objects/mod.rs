//! The entity graph.
//!
//! Cluster topology as shared, transaction-aware objects: nodes, their
//! network interfaces, replicated resource definitions and the per-node
//! resources and volumes instantiated from them, storage pools, snapshots,
//! and the pairwise relations between like entities. Controller and
//! satellite construct the same types through different paths; everything
//! here is path-agnostic.
//!
//! Entities reference each other with strong shared handles in both
//! directions. The graph lives for the process lifetime, so the resulting
//! reference cycles are intentional; the unit-of-work registration guard
//! keeps traversal over them finite.

mod connection;
mod net_interface;
mod node;
mod resource;
mod resource_definition;
mod snapshot;
mod stor_pool;
mod volume;
mod volume_definition;

pub mod api;

pub use connection::{ordered_node_names, NodeConnection, ResourceConnection, VolumeConnection};
pub use net_interface::{EncryptionType, NetInterface, NetworkPath, SatelliteConnection};
pub use node::{Node, NodeType};
pub use resource::Resource;
pub use resource_definition::{ResourceDefinition, TransportType};
pub use snapshot::{Snapshot, SnapshotDefinition, SnapshotVolume, SnapshotVolumeDefinition};
pub use stor_pool::{StorPool, StorPoolDefinition, DISKLESS_STOR_POOL_NAME};
pub use volume::Volume;
pub use volume_definition::VolumeDefinition;
