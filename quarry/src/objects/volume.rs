//! Per-node volume instances.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::access::{AccessContext, AccessType};
use crate::db::DriverRef;
use crate::error::QuarryResult;
use crate::flags::{self, StateFlags, VlmFlags};
use crate::identifier::{NodeName, ResourceName, VolumeNumber};
use crate::props::{secure_props, PropsContainer};
use crate::transaction::{cell, txmap, TransactionCell, TransactionMap, TransactionObject};

use super::api::VolumeApi;
use super::{Resource, StorPool, VolumeConnection, VolumeDefinition};

/// The backing volume of a resource on one node.
///
/// Exactly one volume exists per (resource, volume definition) pair.
/// The `CLEAN` flag tracks whether the satellite has confirmed the
/// volume's state. Access is governed by the owning resource's
/// protection.
pub struct Volume {
    uuid: Uuid,
    dbg_instance_id: Uuid,
    resource: Arc<Resource>,
    volume_definition: Arc<VolumeDefinition>,
    stor_pool: Arc<StorPool>,
    block_device_path: Arc<TransactionCell<Option<String>>>,
    meta_disk_path: Arc<TransactionCell<Option<String>>>,
    flags: Arc<StateFlags<VlmFlags>>,
    props: Arc<PropsContainer>,
    // keyed by the peer volume's node name
    connections: Arc<TransactionMap<NodeName, Arc<VolumeConnection>>>,
    driver: DriverRef<(NodeName, ResourceName, VolumeNumber), Volume>,
    deleted: AtomicBool,
}

impl std::fmt::Debug for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume")
            .field("uuid", &self.uuid)
            .finish_non_exhaustive()
    }
}

impl Volume {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        uuid: Uuid,
        resource: Arc<Resource>,
        volume_definition: Arc<VolumeDefinition>,
        stor_pool: Arc<StorPool>,
        block_device_path: Option<String>,
        meta_disk_path: Option<String>,
        initial_flags: u64,
        driver: DriverRef<(NodeName, ResourceName, VolumeNumber), Volume>,
    ) -> Arc<Self> {
        Arc::new(Self {
            uuid,
            dbg_instance_id: Uuid::new_v4(),
            flags: StateFlags::new(Arc::clone(resource.obj_prot()), initial_flags),
            resource,
            volume_definition,
            stor_pool,
            block_device_path: cell(block_device_path),
            meta_disk_path: cell(meta_disk_path),
            props: PropsContainer::new(),
            connections: txmap(),
            driver,
            deleted: AtomicBool::new(false),
        })
    }

    fn check_deleted(&self) {
        if self.deleted.load(Ordering::Acquire) {
            panic!("access to a deleted volume");
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.check_deleted();
        self.uuid
    }

    pub fn dbg_instance_id(&self) -> Uuid {
        self.dbg_instance_id
    }

    pub fn resource(&self) -> &Arc<Resource> {
        self.check_deleted();
        &self.resource
    }

    pub fn volume_definition(&self) -> &Arc<VolumeDefinition> {
        self.check_deleted();
        &self.volume_definition
    }

    pub fn stor_pool(&self) -> &Arc<StorPool> {
        self.check_deleted();
        &self.stor_pool
    }

    pub fn volume_number(&self) -> VolumeNumber {
        self.check_deleted();
        self.volume_definition.volume_number()
    }

    pub fn key(&self) -> (NodeName, ResourceName, VolumeNumber) {
        let (node_name, rsc_name) = self.resource.key();
        (node_name, rsc_name, self.volume_definition.volume_number())
    }

    pub fn block_device_path(&self, ctx: &AccessContext) -> QuarryResult<Option<String>> {
        self.check_deleted();
        self.resource
            .obj_prot()
            .require_access(ctx, AccessType::View)?;
        Ok(self.block_device_path.get())
    }

    pub fn set_block_device_path(
        &self,
        ctx: &AccessContext,
        path: Option<String>,
    ) -> QuarryResult<()> {
        self.check_deleted();
        self.resource
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        self.block_device_path.set(path);
        Ok(())
    }

    pub fn meta_disk_path(&self, ctx: &AccessContext) -> QuarryResult<Option<String>> {
        self.check_deleted();
        self.resource
            .obj_prot()
            .require_access(ctx, AccessType::View)?;
        Ok(self.meta_disk_path.get())
    }

    pub fn set_meta_disk_path(
        &self,
        ctx: &AccessContext,
        path: Option<String>,
    ) -> QuarryResult<()> {
        self.check_deleted();
        self.resource
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        self.meta_disk_path.set(path);
        Ok(())
    }

    pub fn flags(&self) -> &Arc<StateFlags<VlmFlags>> {
        self.check_deleted();
        &self.flags
    }

    pub fn props(&self, ctx: &AccessContext) -> QuarryResult<&Arc<PropsContainer>> {
        self.check_deleted();
        secure_props(ctx, self.resource.obj_prot(), &self.props)
    }

    pub fn volume_connection(
        &self,
        ctx: &AccessContext,
        peer_node_name: &NodeName,
    ) -> QuarryResult<Option<Arc<VolumeConnection>>> {
        self.check_deleted();
        self.resource
            .obj_prot()
            .require_access(ctx, AccessType::View)?;
        Ok(self.connections.get(peer_node_name))
    }

    pub(super) fn set_volume_connection(
        &self,
        peer_node_name: NodeName,
        conn: Arc<VolumeConnection>,
    ) {
        self.check_deleted();
        self.connections.insert(peer_node_name, conn);
    }

    pub(super) fn clear_volume_connection(&self, peer_node_name: &NodeName) {
        self.connections.remove(peer_node_name);
    }

    pub fn mark_deleted(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.flags.enable_flags(ctx, VlmFlags::DELETE)
    }

    /// Detaches the volume from its resource and storage pool, removes
    /// the persisted record, poisons the instance.
    pub fn delete(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.resource
            .obj_prot()
            .require_access(ctx, AccessType::Control)?;
        let vlm_nr = self.volume_definition.volume_number();
        self.resource.remove_volume(ctx, vlm_nr)?;
        self.stor_pool.remove_volume(ctx, self)?;
        self.driver.delete(self)?;
        self.deleted.store(true, Ordering::Release);
        Ok(())
    }

    pub fn api_data(&self, ctx: &AccessContext) -> QuarryResult<VolumeApi> {
        self.check_deleted();
        self.resource
            .obj_prot()
            .require_access(ctx, AccessType::View)?;
        Ok(VolumeApi {
            uuid: self.uuid.to_string(),
            volume_number: self.volume_definition.volume_number().value(),
            stor_pool_name: self.stor_pool.definition().name().as_str().to_owned(),
            block_device_path: self.block_device_path.get(),
            meta_disk_path: self.meta_disk_path.get(),
            flags: flags::to_string_list::<VlmFlags>(self.flags.mask(ctx)?),
        })
    }
}

impl TransactionObject for Volume {
    fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
        let mut children: Vec<Arc<dyn TransactionObject>> = vec![
            Arc::clone(&self.resource) as Arc<dyn TransactionObject>,
            Arc::clone(&self.volume_definition) as Arc<dyn TransactionObject>,
            Arc::clone(&self.stor_pool) as Arc<dyn TransactionObject>,
            Arc::clone(&self.block_device_path) as Arc<dyn TransactionObject>,
            Arc::clone(&self.meta_disk_path) as Arc<dyn TransactionObject>,
            Arc::clone(&self.flags) as Arc<dyn TransactionObject>,
            Arc::clone(&self.props) as Arc<dyn TransactionObject>,
            Arc::clone(&self.connections) as Arc<dyn TransactionObject>,
        ];
        children.extend(
            self.connections
                .values()
                .into_iter()
                .map(|conn| conn as Arc<dyn TransactionObject>),
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
