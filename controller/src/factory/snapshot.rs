//! Snapshot entity factories.
//!
//! Snapshot sizes are frozen copies of the source volume definitions;
//! no pooled numbers are drawn here.

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use quarry::access::{AccessContext, AccessType, ObjectProtection};
use quarry::db::DriverSet;
use quarry::error::QuarryError;
use quarry::flags::{mask_of, SnapshotDfnFlags, SnapshotFlags};
use quarry::identifier::{SnapshotName, VolumeNumber};
use quarry::objects::{
    Node, ResourceDefinition, Snapshot, SnapshotDefinition, SnapshotVolume,
    SnapshotVolumeDefinition, StorPool,
};

use crate::error::ControllerResult;

use super::resolve;

pub struct SnapshotDefinitionFactory {
    drivers: DriverSet,
    create_lock: Mutex<()>,
}

impl SnapshotDefinitionFactory {
    pub fn new(drivers: DriverSet) -> Self {
        Self {
            drivers,
            create_lock: Mutex::new(()),
        }
    }

    pub fn get(
        &self,
        ctx: &AccessContext,
        resource_definition: &Arc<ResourceDefinition>,
        name: SnapshotName,
        flags: &[SnapshotDfnFlags],
        create_if_not_exists: bool,
        fail_if_exists: bool,
    ) -> ControllerResult<Option<Arc<SnapshotDefinition>>> {
        resource_definition
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        let _serial = self.create_lock.lock().unwrap();

        let existing = match resource_definition.snapshot_definition(ctx, &name)? {
            Some(found) => Some(found),
            None => {
                let key = (resource_definition.name().clone(), name.clone());
                let loaded = self.drivers.snapshot_definition.load(&key)?;
                if let Some(loaded) = &loaded {
                    resource_definition.add_snapshot_definition(ctx, Arc::clone(loaded))?;
                }
                loaded
            }
        };

        resolve(
            "snapshot definition",
            existing,
            create_if_not_exists,
            fail_if_exists,
            || {
                let snap_dfn = SnapshotDefinition::new(
                    Uuid::new_v4(),
                    ObjectProtection::new(ctx),
                    Arc::clone(resource_definition),
                    name.clone(),
                    mask_of(flags),
                    Arc::clone(&self.drivers.snapshot_definition),
                );
                self.drivers.snapshot_definition.create(&snap_dfn)?;
                resource_definition.add_snapshot_definition(ctx, Arc::clone(&snap_dfn))?;
                tracing::info!(
                    resource = %resource_definition.name(),
                    snapshot = %name,
                    "created snapshot definition"
                );
                Ok(snap_dfn)
            },
        )
    }
}

pub struct SnapshotFactory {
    drivers: DriverSet,
    create_lock: Mutex<()>,
}

impl SnapshotFactory {
    pub fn new(drivers: DriverSet) -> Self {
        Self {
            drivers,
            create_lock: Mutex::new(()),
        }
    }

    pub fn get(
        &self,
        ctx: &AccessContext,
        definition: &Arc<SnapshotDefinition>,
        node: &Arc<Node>,
        flags: &[SnapshotFlags],
        create_if_not_exists: bool,
        fail_if_exists: bool,
    ) -> ControllerResult<Option<Arc<Snapshot>>> {
        definition
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        let _serial = self.create_lock.lock().unwrap();

        let existing = match definition.snapshot(ctx, node.name())? {
            Some(found) => Some(found),
            None => {
                let (rsc_name, snap_name) = definition.key();
                let key = (node.name().clone(), rsc_name, snap_name);
                let loaded = self.drivers.snapshot.load(&key)?;
                if let Some(loaded) = &loaded {
                    definition.add_snapshot(ctx, Arc::clone(loaded))?;
                }
                loaded
            }
        };

        resolve(
            "snapshot",
            existing,
            create_if_not_exists,
            fail_if_exists,
            || {
                let snapshot = Snapshot::new(
                    Uuid::new_v4(),
                    Arc::clone(node),
                    Arc::clone(definition),
                    mask_of(flags),
                    Arc::clone(&self.drivers.snapshot),
                );
                self.drivers.snapshot.create(&snapshot)?;
                definition.add_snapshot(ctx, Arc::clone(&snapshot))?;
                tracing::info!(
                    node = %node.name(),
                    snapshot = %definition.snapshot_name(),
                    "created snapshot"
                );
                Ok(snapshot)
            },
        )
    }
}

pub struct SnapshotVolumeDefinitionFactory {
    drivers: DriverSet,
    create_lock: Mutex<()>,
}

impl SnapshotVolumeDefinitionFactory {
    pub fn new(drivers: DriverSet) -> Self {
        Self {
            drivers,
            create_lock: Mutex::new(()),
        }
    }

    pub fn get(
        &self,
        ctx: &AccessContext,
        snapshot_definition: &Arc<SnapshotDefinition>,
        volume_number: VolumeNumber,
        size_kib: u64,
        create_if_not_exists: bool,
        fail_if_exists: bool,
    ) -> ControllerResult<Option<Arc<SnapshotVolumeDefinition>>> {
        snapshot_definition
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        let _serial = self.create_lock.lock().unwrap();

        let existing = match snapshot_definition.snapshot_volume_definition(ctx, volume_number)? {
            Some(found) => Some(found),
            None => {
                let (rsc_name, snap_name) = snapshot_definition.key();
                let key = (rsc_name, snap_name, volume_number);
                let loaded = self.drivers.snapshot_volume_definition.load(&key)?;
                if let Some(loaded) = &loaded {
                    snapshot_definition
                        .add_snapshot_volume_definition(ctx, Arc::clone(loaded))?;
                }
                loaded
            }
        };

        resolve(
            "snapshot volume definition",
            existing,
            create_if_not_exists,
            fail_if_exists,
            || {
                let snap_vlm_dfn = SnapshotVolumeDefinition::new(
                    Uuid::new_v4(),
                    Arc::clone(snapshot_definition),
                    volume_number,
                    size_kib,
                    Arc::clone(&self.drivers.snapshot_volume_definition),
                )?;
                self.drivers
                    .snapshot_volume_definition
                    .create(&snap_vlm_dfn)?;
                snapshot_definition.add_snapshot_volume_definition(ctx, Arc::clone(&snap_vlm_dfn))?;
                tracing::info!(
                    snapshot = %snapshot_definition.snapshot_name(),
                    volume_number = volume_number.value(),
                    "created snapshot volume definition"
                );
                Ok(snap_vlm_dfn)
            },
        )
    }
}

pub struct SnapshotVolumeFactory {
    drivers: DriverSet,
    create_lock: Mutex<()>,
}

impl SnapshotVolumeFactory {
    pub fn new(drivers: DriverSet) -> Self {
        Self {
            drivers,
            create_lock: Mutex::new(()),
        }
    }

    /// The snapshot volume definition must belong to the snapshot's
    /// definition; the storage pool must live on the snapshot's node.
    #[allow(clippy::too_many_arguments)]
    pub fn get(
        &self,
        ctx: &AccessContext,
        snapshot: &Arc<Snapshot>,
        definition: &Arc<SnapshotVolumeDefinition>,
        stor_pool: &Arc<StorPool>,
        create_if_not_exists: bool,
        fail_if_exists: bool,
    ) -> ControllerResult<Option<Arc<SnapshotVolume>>> {
        if !Arc::ptr_eq(definition.snapshot_definition(), snapshot.definition()) {
            return Err(QuarryError::implementation_error(
                "snapshot volume definition does not belong to the snapshot's definition",
            )
            .into());
        }
        if !Arc::ptr_eq(stor_pool.node(), snapshot.node()) {
            return Err(QuarryError::implementation_error(
                "storage pool does not live on the snapshot's node",
            )
            .into());
        }
        snapshot
            .definition()
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        let _serial = self.create_lock.lock().unwrap();

        let existing = match snapshot.snapshot_volume(ctx, definition.volume_number())? {
            Some(found) => Some(found),
            None => {
                let (node_name, rsc_name, snap_name) = snapshot.key();
                let key = (node_name, rsc_name, snap_name, definition.volume_number());
                let loaded = self.drivers.snapshot_volume.load(&key)?;
                if let Some(loaded) = &loaded {
                    snapshot.add_snapshot_volume(ctx, Arc::clone(loaded))?;
                }
                loaded
            }
        };

        resolve(
            "snapshot volume",
            existing,
            create_if_not_exists,
            fail_if_exists,
            || {
                let snap_vlm = SnapshotVolume::new(
                    Uuid::new_v4(),
                    Arc::clone(snapshot),
                    Arc::clone(definition),
                    Arc::clone(stor_pool),
                    Arc::clone(&self.drivers.snapshot_volume),
                );
                self.drivers.snapshot_volume.create(&snap_vlm)?;
                snapshot.add_snapshot_volume(ctx, Arc::clone(&snap_vlm))?;
                tracing::info!(
                    node = %snapshot.node().name(),
                    snapshot = %snapshot.definition().snapshot_name(),
                    volume_number = definition.volume_number().value(),
                    "created snapshot volume"
                );
                Ok(snap_vlm)
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry::access::Role;
    use quarry::identifier::{NodeName, ResourceName, TcpPortNumber};
    use quarry::objects::{NodeType, TransportType};
    use quarry::testing::in_memory_drivers;
    use std::str::FromStr;

    fn rsc_dfn(ctx: &AccessContext, drivers: &DriverSet) -> Arc<ResourceDefinition> {
        ResourceDefinition::new(
            Uuid::new_v4(),
            ObjectProtection::new(ctx),
            ResourceName::from_str("res1").unwrap(),
            TcpPortNumber::new(7000).unwrap(),
            "secret".to_owned(),
            TransportType::Ip,
            0,
            Arc::clone(&drivers.resource_definition),
        )
    }

    #[test]
    fn test_snapshot_tree_construction() {
        let ctx = AccessContext::for_role(Role::new("admin"));
        let drivers = in_memory_drivers();
        let dfn = rsc_dfn(&ctx, &drivers);
        let node = Node::new(
            Uuid::new_v4(),
            ObjectProtection::new(&ctx),
            NodeName::from_str("alpha").unwrap(),
            NodeType::Satellite,
            0,
            Arc::clone(&drivers.node),
        );

        let snap_dfn = SnapshotDefinitionFactory::new(drivers.clone())
            .get(
                &ctx,
                &dfn,
                SnapshotName::from_str("before-upgrade").unwrap(),
                &[],
                true,
                false,
            )
            .unwrap()
            .unwrap();
        let snap_vlm_dfn = SnapshotVolumeDefinitionFactory::new(drivers.clone())
            .get(
                &ctx,
                &snap_dfn,
                VolumeNumber::new(0).unwrap(),
                4096,
                true,
                false,
            )
            .unwrap()
            .unwrap();
        let snapshot = SnapshotFactory::new(drivers.clone())
            .get(&ctx, &snap_dfn, &node, &[], true, false)
            .unwrap()
            .unwrap();

        assert!(Arc::ptr_eq(
            &snapshot,
            &snap_dfn.snapshot(&ctx, node.name()).unwrap().unwrap()
        ));
        assert_eq!(4096, snap_vlm_dfn.size_kib(&ctx).unwrap());
        // second take of the same snapshot returns the existing instance
        let again = SnapshotFactory::new(drivers)
            .get(&ctx, &snap_dfn, &node, &[], true, false)
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&snapshot, &again));
    }

    #[test]
    fn test_snapshot_volume_rejects_foreign_definition() {
        let ctx = AccessContext::for_role(Role::new("admin"));
        let drivers = in_memory_drivers();
        let dfn = rsc_dfn(&ctx, &drivers);
        let node = Node::new(
            Uuid::new_v4(),
            ObjectProtection::new(&ctx),
            NodeName::from_str("alpha").unwrap(),
            NodeType::Satellite,
            0,
            Arc::clone(&drivers.node),
        );
        let pool_dfn = quarry::objects::StorPoolDefinition::new(
            Uuid::new_v4(),
            ObjectProtection::new(&ctx),
            quarry::identifier::StorPoolName::from_str("thinpool").unwrap(),
            Arc::clone(&drivers.stor_pool_definition),
        );
        let stor_pool = StorPool::new(
            Uuid::new_v4(),
            Arc::clone(&node),
            pool_dfn,
            "lvm".to_owned(),
            Arc::clone(&drivers.stor_pool),
        );

        let snap_dfn_factory = SnapshotDefinitionFactory::new(drivers.clone());
        let snap_a = snap_dfn_factory
            .get(
                &ctx,
                &dfn,
                SnapshotName::from_str("snap-a").unwrap(),
                &[],
                true,
                false,
            )
            .unwrap()
            .unwrap();
        let snap_b = snap_dfn_factory
            .get(
                &ctx,
                &dfn,
                SnapshotName::from_str("snap-b").unwrap(),
                &[],
                true,
                false,
            )
            .unwrap()
            .unwrap();
        let vlm_dfn_of_b = SnapshotVolumeDefinitionFactory::new(drivers.clone())
            .get(&ctx, &snap_b, VolumeNumber::new(0).unwrap(), 4096, true, false)
            .unwrap()
            .unwrap();
        let snapshot_of_a = SnapshotFactory::new(drivers.clone())
            .get(&ctx, &snap_a, &node, &[], true, false)
            .unwrap()
            .unwrap();

        // mixing the two snapshot definitions is a programming error
        SnapshotVolumeFactory::new(drivers)
            .get(&ctx, &snapshot_of_a, &vlm_dfn_of_b, &stor_pool, true, false)
            .unwrap_err();
    }
}
