//! Snapshot family mirrors.

use std::sync::Arc;

use uuid::Uuid;

use quarry::access::{AccessContext, ObjectProtection};
use quarry::db::DriverSet;
use quarry::error::QuarryResult;
use quarry::identifier::{SnapshotName, VolumeNumber};
use quarry::objects::{
    Node, ResourceDefinition, Snapshot, SnapshotDefinition, SnapshotVolume,
    SnapshotVolumeDefinition, StorPool,
};

use super::check_uuid;

pub struct SnapshotDefinitionMirror {
    drivers: DriverSet,
}

impl SnapshotDefinitionMirror {
    pub fn new(drivers: DriverSet) -> Self {
        Self { drivers }
    }

    pub fn get_instance(
        &self,
        ctx: &AccessContext,
        uuid: Uuid,
        resource_definition: &Arc<ResourceDefinition>,
        name: SnapshotName,
        initial_flags: u64,
    ) -> QuarryResult<Arc<SnapshotDefinition>> {
        if let Some(found) = resource_definition.snapshot_definition(ctx, &name)? {
            check_uuid("snapshot definition", uuid, found.uuid())?;
            return Ok(found);
        }
        let snap_dfn = SnapshotDefinition::new(
            uuid,
            ObjectProtection::new(ctx),
            Arc::clone(resource_definition),
            name,
            initial_flags,
            Arc::clone(&self.drivers.snapshot_definition),
        );
        resource_definition.add_snapshot_definition(ctx, Arc::clone(&snap_dfn))?;
        Ok(snap_dfn)
    }
}

pub struct SnapshotMirror {
    drivers: DriverSet,
}

impl SnapshotMirror {
    pub fn new(drivers: DriverSet) -> Self {
        Self { drivers }
    }

    pub fn get_instance(
        &self,
        ctx: &AccessContext,
        uuid: Uuid,
        definition: &Arc<SnapshotDefinition>,
        node: &Arc<Node>,
        initial_flags: u64,
    ) -> QuarryResult<Arc<Snapshot>> {
        if let Some(found) = definition.snapshot(ctx, node.name())? {
            check_uuid("snapshot", uuid, found.uuid())?;
            return Ok(found);
        }
        let snapshot = Snapshot::new(
            uuid,
            Arc::clone(node),
            Arc::clone(definition),
            initial_flags,
            Arc::clone(&self.drivers.snapshot),
        );
        definition.add_snapshot(ctx, Arc::clone(&snapshot))?;
        Ok(snapshot)
    }
}

pub struct SnapshotVolumeDefinitionMirror {
    drivers: DriverSet,
}

impl SnapshotVolumeDefinitionMirror {
    pub fn new(drivers: DriverSet) -> Self {
        Self { drivers }
    }

    pub fn get_instance(
        &self,
        ctx: &AccessContext,
        uuid: Uuid,
        snapshot_definition: &Arc<SnapshotDefinition>,
        volume_number: VolumeNumber,
        size_kib: u64,
    ) -> QuarryResult<Arc<SnapshotVolumeDefinition>> {
        if let Some(found) =
            snapshot_definition.snapshot_volume_definition(ctx, volume_number)?
        {
            check_uuid("snapshot volume definition", uuid, found.uuid())?;
            return Ok(found);
        }
        let snap_vlm_dfn = SnapshotVolumeDefinition::new(
            uuid,
            Arc::clone(snapshot_definition),
            volume_number,
            size_kib,
            Arc::clone(&self.drivers.snapshot_volume_definition),
        )?;
        snapshot_definition.add_snapshot_volume_definition(ctx, Arc::clone(&snap_vlm_dfn))?;
        Ok(snap_vlm_dfn)
    }
}

pub struct SnapshotVolumeMirror {
    drivers: DriverSet,
}

impl SnapshotVolumeMirror {
    pub fn new(drivers: DriverSet) -> Self {
        Self { drivers }
    }

    pub fn get_instance(
        &self,
        ctx: &AccessContext,
        uuid: Uuid,
        snapshot: &Arc<Snapshot>,
        definition: &Arc<SnapshotVolumeDefinition>,
        stor_pool: &Arc<StorPool>,
    ) -> QuarryResult<Arc<SnapshotVolume>> {
        if let Some(found) = snapshot.snapshot_volume(ctx, definition.volume_number())? {
            check_uuid("snapshot volume", uuid, found.uuid())?;
            return Ok(found);
        }
        let snap_vlm = SnapshotVolume::new(
            uuid,
            Arc::clone(snapshot),
            Arc::clone(definition),
            Arc::clone(stor_pool),
            Arc::clone(&self.drivers.snapshot_volume),
        );
        snapshot.add_snapshot_volume(ctx, Arc::clone(&snap_vlm))?;
        Ok(snap_vlm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::{NodeMirror, ResourceDefinitionMirror};
    use crate::repos::SatelliteRepos;
    use quarry::identifier::{NodeName, ResourceName, TcpPortNumber};
    use quarry::objects::{NodeType, TransportType};
    use std::str::FromStr;

    #[test]
    fn test_snapshot_mirror_idempotent() {
        let ctx = AccessContext::system();
        let repos = Arc::new(SatelliteRepos::new(&ctx));
        let drivers = DriverSet::no_op();
        let node = NodeMirror::new(Arc::clone(&repos), drivers.clone())
            .get_instance(
                &ctx,
                Uuid::new_v4(),
                NodeName::from_str("alpha").unwrap(),
                NodeType::Satellite,
                0,
            )
            .unwrap();
        let rsc_dfn = ResourceDefinitionMirror::new(Arc::clone(&repos), drivers.clone())
            .get_instance(
                &ctx,
                Uuid::new_v4(),
                ResourceName::from_str("res1").unwrap(),
                TcpPortNumber::new(7000).unwrap(),
                "secret".to_owned(),
                TransportType::Ip,
                0,
            )
            .unwrap();
        let snap_dfn = SnapshotDefinitionMirror::new(drivers.clone())
            .get_instance(
                &ctx,
                Uuid::new_v4(),
                &rsc_dfn,
                SnapshotName::from_str("nightly").unwrap(),
                0,
            )
            .unwrap();

        let mirror = SnapshotMirror::new(drivers);
        let uuid = Uuid::new_v4();
        let first = mirror
            .get_instance(&ctx, uuid, &snap_dfn, &node, 0)
            .unwrap();
        let second = mirror
            .get_instance(&ctx, uuid, &snap_dfn, &node, 0)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(1, snap_dfn.snapshots(&ctx).unwrap().len());

        // a diverged uuid is fatal
        mirror
            .get_instance(&ctx, Uuid::new_v4(), &snap_dfn, &node, 0)
            .unwrap_err();
    }
}
