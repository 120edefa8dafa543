//! Point-in-time snapshots.
//!
//! The snapshot family mirrors the resource family one level down:
//! `SnapshotDefinition` parallels `ResourceDefinition`, `Snapshot`
//! parallels `Resource`, and the volume pair is mirrored by
//! `SnapshotVolumeDefinition` / `SnapshotVolume`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::access::{AccessContext, AccessType, ObjectProtection};
use crate::db::DriverRef;
use crate::error::{QuarryError, QuarryResult};
use crate::flags::{self, SnapshotDfnFlags, SnapshotFlags, StateFlags};
use crate::identifier::{NodeName, ResourceName, SnapshotName, VolumeNumber};
use crate::props::{secure_props, PropsContainer};
use crate::transaction::{cell, txmap, TransactionCell, TransactionMap, TransactionObject};

use super::api::{SnapshotApi, SnapshotDefinitionApi, SnapshotVolumeDefinitionApi};
use super::{Node, ResourceDefinition, StorPool};

/// A named snapshot of a resource definition.
pub struct SnapshotDefinition {
    uuid: Uuid,
    dbg_instance_id: Uuid,
    obj_prot: Arc<ObjectProtection>,
    resource_definition: Arc<ResourceDefinition>,
    name: SnapshotName,
    flags: Arc<StateFlags<SnapshotDfnFlags>>,
    props: Arc<PropsContainer>,
    snapshots: Arc<TransactionMap<NodeName, Arc<Snapshot>>>,
    snapshot_volume_definitions:
        Arc<TransactionMap<VolumeNumber, Arc<SnapshotVolumeDefinition>>>,
    driver: DriverRef<(ResourceName, SnapshotName), SnapshotDefinition>,
    deleted: AtomicBool,
}

impl SnapshotDefinition {
    pub fn new(
        uuid: Uuid,
        obj_prot: Arc<ObjectProtection>,
        resource_definition: Arc<ResourceDefinition>,
        name: SnapshotName,
        initial_flags: u64,
        driver: DriverRef<(ResourceName, SnapshotName), SnapshotDefinition>,
    ) -> Arc<Self> {
        Arc::new(Self {
            uuid,
            dbg_instance_id: Uuid::new_v4(),
            flags: StateFlags::new(Arc::clone(&obj_prot), initial_flags),
            obj_prot,
            resource_definition,
            name,
            props: PropsContainer::new(),
            snapshots: txmap(),
            snapshot_volume_definitions: txmap(),
            driver,
            deleted: AtomicBool::new(false),
        })
    }

    fn check_deleted(&self) {
        if self.deleted.load(Ordering::Acquire) {
            panic!("access to a deleted snapshot definition");
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.check_deleted();
        self.uuid
    }

    pub fn dbg_instance_id(&self) -> Uuid {
        self.dbg_instance_id
    }

    pub fn obj_prot(&self) -> &Arc<ObjectProtection> {
        &self.obj_prot
    }

    pub fn resource_definition(&self) -> &Arc<ResourceDefinition> {
        self.check_deleted();
        &self.resource_definition
    }

    pub fn snapshot_name(&self) -> &SnapshotName {
        self.check_deleted();
        &self.name
    }

    pub fn key(&self) -> (ResourceName, SnapshotName) {
        (self.resource_definition.name().clone(), self.name.clone())
    }

    pub fn flags(&self) -> &Arc<StateFlags<SnapshotDfnFlags>> {
        self.check_deleted();
        &self.flags
    }

    pub fn props(&self, ctx: &AccessContext) -> QuarryResult<&Arc<PropsContainer>> {
        self.check_deleted();
        secure_props(ctx, &self.obj_prot, &self.props)
    }

    pub fn snapshot(
        &self,
        ctx: &AccessContext,
        node_name: &NodeName,
    ) -> QuarryResult<Option<Arc<Snapshot>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.snapshots.get(node_name))
    }

    pub fn snapshots(&self, ctx: &AccessContext) -> QuarryResult<Vec<Arc<Snapshot>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.snapshots.values())
    }

    pub fn add_snapshot(&self, ctx: &AccessContext, snapshot: Arc<Snapshot>) -> QuarryResult<()> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Change)?;
        self.snapshots
            .insert(snapshot.node().name().clone(), snapshot);
        Ok(())
    }

    pub fn remove_snapshot(
        &self,
        ctx: &AccessContext,
        node_name: &NodeName,
    ) -> QuarryResult<Option<Arc<Snapshot>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Change)?;
        Ok(self.snapshots.remove(node_name))
    }

    pub fn snapshot_volume_definition(
        &self,
        ctx: &AccessContext,
        vlm_nr: VolumeNumber,
    ) -> QuarryResult<Option<Arc<SnapshotVolumeDefinition>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.snapshot_volume_definitions.get(&vlm_nr))
    }

    pub fn snapshot_volume_definitions(
        &self,
        ctx: &AccessContext,
    ) -> QuarryResult<Vec<Arc<SnapshotVolumeDefinition>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.snapshot_volume_definitions.values())
    }

    pub fn add_snapshot_volume_definition(
        &self,
        ctx: &AccessContext,
        snap_vlm_dfn: Arc<SnapshotVolumeDefinition>,
    ) -> QuarryResult<()> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Change)?;
        self.snapshot_volume_definitions
            .insert(snap_vlm_dfn.volume_number(), snap_vlm_dfn);
        Ok(())
    }

    pub fn mark_deleted(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.flags.enable_flags(ctx, SnapshotDfnFlags::DELETE)
    }

    pub fn delete(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Control)?;
        self.resource_definition
            .remove_snapshot_definition(ctx, &self.name)?;
        self.driver.delete(self)?;
        self.deleted.store(true, Ordering::Release);
        Ok(())
    }

    pub fn api_data(&self, ctx: &AccessContext) -> QuarryResult<SnapshotDefinitionApi> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        let snapshot_volume_definitions = self
            .snapshot_volume_definitions
            .values()
            .into_iter()
            .map(|snap_vlm_dfn| snap_vlm_dfn.api_data(ctx))
            .collect::<QuarryResult<Vec<_>>>()?;
        Ok(SnapshotDefinitionApi {
            uuid: self.uuid.to_string(),
            resource_name: self.resource_definition.name().as_str().to_owned(),
            snapshot_name: self.name.as_str().to_owned(),
            flags: flags::to_string_list::<SnapshotDfnFlags>(self.flags.mask(ctx)?),
            snapshot_volume_definitions,
        })
    }
}

impl TransactionObject for SnapshotDefinition {
    fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
        let mut children: Vec<Arc<dyn TransactionObject>> = vec![
            Arc::clone(&self.obj_prot) as Arc<dyn TransactionObject>,
            Arc::clone(&self.resource_definition) as Arc<dyn TransactionObject>,
            Arc::clone(&self.flags) as Arc<dyn TransactionObject>,
            Arc::clone(&self.props) as Arc<dyn TransactionObject>,
            Arc::clone(&self.snapshots) as Arc<dyn TransactionObject>,
            Arc::clone(&self.snapshot_volume_definitions) as Arc<dyn TransactionObject>,
        ];
        children.extend(
            self.snapshots
                .values()
                .into_iter()
                .map(|snapshot| snapshot as Arc<dyn TransactionObject>),
        );
        children.extend(
            self.snapshot_volume_definitions
                .values()
                .into_iter()
                .map(|snap_vlm_dfn| snap_vlm_dfn as Arc<dyn TransactionObject>),
        );
        children
    }

    fn has_local_changes(&self) -> bool {
        false
    }

    fn commit_local(&self) {}

    fn rollback_local(&self) {}

    fn bind(&self) {}

    fn unbind(&self) {}
}

/// The instantiation of a snapshot definition on one node.
///
/// `(node, snapshot definition)` is unique. Access is governed by the
/// snapshot definition's protection.
pub struct Snapshot {
    uuid: Uuid,
    dbg_instance_id: Uuid,
    node: Arc<Node>,
    definition: Arc<SnapshotDefinition>,
    flags: Arc<StateFlags<SnapshotFlags>>,
    snapshot_volumes: Arc<TransactionMap<VolumeNumber, Arc<SnapshotVolume>>>,
    driver: DriverRef<(NodeName, ResourceName, SnapshotName), Snapshot>,
    deleted: AtomicBool,
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("uuid", &self.uuid)
            .finish_non_exhaustive()
    }
}

impl Snapshot {
    pub fn new(
        uuid: Uuid,
        node: Arc<Node>,
        definition: Arc<SnapshotDefinition>,
        initial_flags: u64,
        driver: DriverRef<(NodeName, ResourceName, SnapshotName), Snapshot>,
    ) -> Arc<Self> {
        Arc::new(Self {
            uuid,
            dbg_instance_id: Uuid::new_v4(),
            flags: StateFlags::new(Arc::clone(definition.obj_prot()), initial_flags),
            node,
            definition,
            snapshot_volumes: txmap(),
            driver,
            deleted: AtomicBool::new(false),
        })
    }

    fn check_deleted(&self) {
        if self.deleted.load(Ordering::Acquire) {
            panic!("access to a deleted snapshot");
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.check_deleted();
        self.uuid
    }

    pub fn dbg_instance_id(&self) -> Uuid {
        self.dbg_instance_id
    }

    pub fn node(&self) -> &Arc<Node> {
        self.check_deleted();
        &self.node
    }

    pub fn definition(&self) -> &Arc<SnapshotDefinition> {
        self.check_deleted();
        &self.definition
    }

    pub fn key(&self) -> (NodeName, ResourceName, SnapshotName) {
        let (rsc_name, snap_name) = self.definition.key();
        (self.node.name().clone(), rsc_name, snap_name)
    }

    pub fn flags(&self) -> &Arc<StateFlags<SnapshotFlags>> {
        self.check_deleted();
        &self.flags
    }

    pub fn snapshot_volume(
        &self,
        ctx: &AccessContext,
        vlm_nr: VolumeNumber,
    ) -> QuarryResult<Option<Arc<SnapshotVolume>>> {
        self.check_deleted();
        self.definition
            .obj_prot()
            .require_access(ctx, AccessType::View)?;
        Ok(self.snapshot_volumes.get(&vlm_nr))
    }

    pub fn snapshot_volumes(&self, ctx: &AccessContext) -> QuarryResult<Vec<Arc<SnapshotVolume>>> {
        self.check_deleted();
        self.definition
            .obj_prot()
            .require_access(ctx, AccessType::View)?;
        Ok(self.snapshot_volumes.values())
    }

    pub fn add_snapshot_volume(
        &self,
        ctx: &AccessContext,
        snap_vlm: Arc<SnapshotVolume>,
    ) -> QuarryResult<()> {
        self.check_deleted();
        self.definition
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        self.snapshot_volumes
            .insert(snap_vlm.volume_number(), snap_vlm);
        Ok(())
    }

    pub fn mark_deleted(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.flags.enable_flags(ctx, SnapshotFlags::DELETE)
    }

    pub fn delete(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.definition
            .obj_prot()
            .require_access(ctx, AccessType::Control)?;
        self.definition.remove_snapshot(ctx, self.node.name())?;
        self.driver.delete(self)?;
        self.deleted.store(true, Ordering::Release);
        Ok(())
    }

    pub fn api_data(&self, ctx: &AccessContext) -> QuarryResult<SnapshotApi> {
        self.check_deleted();
        self.definition
            .obj_prot()
            .require_access(ctx, AccessType::View)?;
        let (rsc_name, snap_name) = self.definition.key();
        Ok(SnapshotApi {
            uuid: self.uuid.to_string(),
            node_name: self.node.name().as_str().to_owned(),
            resource_name: rsc_name.as_str().to_owned(),
            snapshot_name: snap_name.as_str().to_owned(),
            flags: flags::to_string_list::<SnapshotFlags>(self.flags.mask(ctx)?),
        })
    }
}

impl TransactionObject for Snapshot {
    fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
        let mut children: Vec<Arc<dyn TransactionObject>> = vec![
            Arc::clone(&self.node) as Arc<dyn TransactionObject>,
            Arc::clone(&self.definition) as Arc<dyn TransactionObject>,
            Arc::clone(&self.flags) as Arc<dyn TransactionObject>,
            Arc::clone(&self.snapshot_volumes) as Arc<dyn TransactionObject>,
        ];
        children.extend(
            self.snapshot_volumes
                .values()
                .into_iter()
                .map(|snap_vlm| snap_vlm as Arc<dyn TransactionObject>),
        );
        children
    }

    fn has_local_changes(&self) -> bool {
        false
    }

    fn commit_local(&self) {}

    fn rollback_local(&self) {}

    fn bind(&self) {}

    fn unbind(&self) {}
}

/// The per-volume slot of a snapshot definition, mirroring the volume
/// definition it was taken from.
pub struct SnapshotVolumeDefinition {
    uuid: Uuid,
    dbg_instance_id: Uuid,
    snapshot_definition: Arc<SnapshotDefinition>,
    volume_number: VolumeNumber,
    size_kib: Arc<TransactionCell<u64>>,
    driver: DriverRef<(ResourceName, SnapshotName, VolumeNumber), SnapshotVolumeDefinition>,
    deleted: AtomicBool,
}

impl SnapshotVolumeDefinition {
    pub fn new(
        uuid: Uuid,
        snapshot_definition: Arc<SnapshotDefinition>,
        volume_number: VolumeNumber,
        size_kib: u64,
        driver: DriverRef<(ResourceName, SnapshotName, VolumeNumber), SnapshotVolumeDefinition>,
    ) -> QuarryResult<Arc<Self>> {
        if size_kib == 0 {
            return Err(QuarryError::ValueOutOfRange {
                kind: "snapshot volume size (KiB)",
                value: 0,
                min: 1,
                max: u64::MAX,
            });
        }
        Ok(Arc::new(Self {
            uuid,
            dbg_instance_id: Uuid::new_v4(),
            snapshot_definition,
            volume_number,
            size_kib: cell(size_kib),
            driver,
            deleted: AtomicBool::new(false),
        }))
    }

    fn check_deleted(&self) {
        if self.deleted.load(Ordering::Acquire) {
            panic!("access to a deleted snapshot volume definition");
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.check_deleted();
        self.uuid
    }

    pub fn dbg_instance_id(&self) -> Uuid {
        self.dbg_instance_id
    }

    pub fn snapshot_definition(&self) -> &Arc<SnapshotDefinition> {
        self.check_deleted();
        &self.snapshot_definition
    }

    pub fn volume_number(&self) -> VolumeNumber {
        self.check_deleted();
        self.volume_number
    }

    pub fn key(&self) -> (ResourceName, SnapshotName, VolumeNumber) {
        let (rsc_name, snap_name) = self.snapshot_definition.key();
        (rsc_name, snap_name, self.volume_number)
    }

    pub fn size_kib(&self, ctx: &AccessContext) -> QuarryResult<u64> {
        self.check_deleted();
        self.snapshot_definition
            .obj_prot()
            .require_access(ctx, AccessType::View)?;
        Ok(self.size_kib.get())
    }

    pub fn delete(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.snapshot_definition
            .obj_prot()
            .require_access(ctx, AccessType::Control)?;
        self.driver.delete(self)?;
        self.deleted.store(true, Ordering::Release);
        Ok(())
    }

    pub fn api_data(&self, ctx: &AccessContext) -> QuarryResult<SnapshotVolumeDefinitionApi> {
        self.check_deleted();
        Ok(SnapshotVolumeDefinitionApi {
            uuid: self.uuid.to_string(),
            volume_number: self.volume_number.value(),
            size_kib: self.size_kib(ctx)?,
        })
    }
}

impl TransactionObject for SnapshotVolumeDefinition {
    fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
        vec![
            Arc::clone(&self.snapshot_definition) as Arc<dyn TransactionObject>,
            Arc::clone(&self.size_kib) as Arc<dyn TransactionObject>,
        ]
    }

    fn has_local_changes(&self) -> bool {
        false
    }

    fn commit_local(&self) {}

    fn rollback_local(&self) {}

    fn bind(&self) {}

    fn unbind(&self) {}
}

/// The on-node materialization of one snapshot volume.
pub struct SnapshotVolume {
    uuid: Uuid,
    dbg_instance_id: Uuid,
    snapshot: Arc<Snapshot>,
    definition: Arc<SnapshotVolumeDefinition>,
    stor_pool: Arc<StorPool>,
    driver: DriverRef<(NodeName, ResourceName, SnapshotName, VolumeNumber), SnapshotVolume>,
    deleted: AtomicBool,
}

impl std::fmt::Debug for SnapshotVolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotVolume")
            .field("uuid", &self.uuid)
            .finish_non_exhaustive()
    }
}

impl SnapshotVolume {
    pub fn new(
        uuid: Uuid,
        snapshot: Arc<Snapshot>,
        definition: Arc<SnapshotVolumeDefinition>,
        stor_pool: Arc<StorPool>,
        driver: DriverRef<(NodeName, ResourceName, SnapshotName, VolumeNumber), SnapshotVolume>,
    ) -> Arc<Self> {
        Arc::new(Self {
            uuid,
            dbg_instance_id: Uuid::new_v4(),
            snapshot,
            definition,
            stor_pool,
            driver,
            deleted: AtomicBool::new(false),
        })
    }

    fn check_deleted(&self) {
        if self.deleted.load(Ordering::Acquire) {
            panic!("access to a deleted snapshot volume");
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.check_deleted();
        self.uuid
    }

    pub fn dbg_instance_id(&self) -> Uuid {
        self.dbg_instance_id
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        self.check_deleted();
        &self.snapshot
    }

    pub fn definition(&self) -> &Arc<SnapshotVolumeDefinition> {
        self.check_deleted();
        &self.definition
    }

    pub fn stor_pool(&self) -> &Arc<StorPool> {
        self.check_deleted();
        &self.stor_pool
    }

    pub fn volume_number(&self) -> VolumeNumber {
        self.check_deleted();
        self.definition.volume_number()
    }

    pub fn key(&self) -> (NodeName, ResourceName, SnapshotName, VolumeNumber) {
        let (node_name, rsc_name, snap_name) = self.snapshot.key();
        (node_name, rsc_name, snap_name, self.definition.volume_number())
    }

    pub fn delete(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.snapshot
            .definition()
            .obj_prot()
            .require_access(ctx, AccessType::Control)?;
        self.driver.delete(self)?;
        self.deleted.store(true, Ordering::Release);
        Ok(())
    }
}

impl TransactionObject for SnapshotVolume {
    fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
        vec![
            Arc::clone(&self.snapshot) as Arc<dyn TransactionObject>,
            Arc::clone(&self.definition) as Arc<dyn TransactionObject>,
            Arc::clone(&self.stor_pool) as Arc<dyn TransactionObject>,
        ]
    }

    fn has_local_changes(&self) -> bool {
        false
    }

    fn commit_local(&self) {}

    fn rollback_local(&self) {}

    fn bind(&self) {}

    fn unbind(&self) {}
}
