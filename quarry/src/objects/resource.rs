//! Per-node resource instances.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::access::{AccessContext, AccessType, ObjectProtection};
use crate::db::DriverRef;
use crate::error::QuarryResult;
use crate::flags::{self, RscFlags, StateFlags};
use crate::identifier::{NodeName, ResourceName, VolumeNumber};
use crate::props::{secure_props, PropsContainer};
use crate::transaction::{txmap, TransactionMap, TransactionObject};

use super::api::ResourceApi;
use super::{Node, ResourceConnection, ResourceDefinition, Volume};

/// The deployment of a resource definition on one node.
///
/// Exactly one resource exists per (node, definition) pair. Holds strong
/// backlinks to both; the unit-of-work registration guard makes the
/// resulting cycle traversable.
pub struct Resource {
    uuid: Uuid,
    dbg_instance_id: Uuid,
    obj_prot: Arc<ObjectProtection>,
    node: Arc<Node>,
    definition: Arc<ResourceDefinition>,
    flags: Arc<StateFlags<RscFlags>>,
    props: Arc<PropsContainer>,
    volumes: Arc<TransactionMap<VolumeNumber, Arc<Volume>>>,
    // keyed by the peer resource's node name
    connections: Arc<TransactionMap<NodeName, Arc<ResourceConnection>>>,
    driver: DriverRef<(NodeName, ResourceName), Resource>,
    deleted: AtomicBool,
}

impl Resource {
    pub fn new(
        uuid: Uuid,
        obj_prot: Arc<ObjectProtection>,
        node: Arc<Node>,
        definition: Arc<ResourceDefinition>,
        initial_flags: u64,
        driver: DriverRef<(NodeName, ResourceName), Resource>,
    ) -> Arc<Self> {
        Arc::new(Self {
            uuid,
            dbg_instance_id: Uuid::new_v4(),
            flags: StateFlags::new(Arc::clone(&obj_prot), initial_flags),
            obj_prot,
            node,
            definition,
            props: PropsContainer::new(),
            volumes: txmap(),
            connections: txmap(),
            driver,
            deleted: AtomicBool::new(false),
        })
    }

    fn check_deleted(&self) {
        if self.deleted.load(Ordering::Acquire) {
            panic!("access to a deleted resource");
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

    pub fn node(&self) -> &Arc<Node> {
        self.check_deleted();
        &self.node
    }

    pub fn definition(&self) -> &Arc<ResourceDefinition> {
        self.check_deleted();
        &self.definition
    }

    pub fn key(&self) -> (NodeName, ResourceName) {
        (self.node.name().clone(), self.definition.name().clone())
    }

    pub fn flags(&self) -> &Arc<StateFlags<RscFlags>> {
        self.check_deleted();
        &self.flags
    }

    pub fn props(&self, ctx: &AccessContext) -> QuarryResult<&Arc<PropsContainer>> {
        self.check_deleted();
        secure_props(ctx, &self.obj_prot, &self.props)
    }

    pub fn is_diskless(&self, ctx: &AccessContext) -> QuarryResult<bool> {
        self.check_deleted();
        self.flags.is_set(ctx, RscFlags::DISKLESS)
    }

    pub fn volume(
        &self,
        ctx: &AccessContext,
        vlm_nr: VolumeNumber,
    ) -> QuarryResult<Option<Arc<Volume>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.volumes.get(&vlm_nr))
    }

    pub fn volumes(&self, ctx: &AccessContext) -> QuarryResult<Vec<Arc<Volume>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.volumes.values())
    }

    pub fn volume_count(&self) -> usize {
        self.check_deleted();
        self.volumes.len()
    }

    pub fn add_volume(&self, ctx: &AccessContext, vlm: Arc<Volume>) -> QuarryResult<()> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Use)?;
        self.volumes.insert(vlm.volume_number(), vlm);
        Ok(())
    }

    pub fn remove_volume(
        &self,
        ctx: &AccessContext,
        vlm_nr: VolumeNumber,
    ) -> QuarryResult<Option<Arc<Volume>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Use)?;
        Ok(self.volumes.remove(&vlm_nr))
    }

    pub fn resource_connection(
        &self,
        ctx: &AccessContext,
        peer_node_name: &NodeName,
    ) -> QuarryResult<Option<Arc<ResourceConnection>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.connections.get(peer_node_name))
    }

    pub(super) fn set_resource_connection(
        &self,
        peer_node_name: NodeName,
        conn: Arc<ResourceConnection>,
    ) {
        self.check_deleted();
        self.connections.insert(peer_node_name, conn);
    }

    pub(super) fn clear_resource_connection(&self, peer_node_name: &NodeName) {
        self.connections.remove(peer_node_name);
    }

    pub fn mark_deleted(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.flags.enable_flags(ctx, RscFlags::DELETE)
    }

    /// Detaches the resource from its node and definition, removes the
    /// persisted record, poisons the instance.
    pub fn delete(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Control)?;
        self.node
            .remove_resource(ctx, self.definition.name())?;
        self.definition
            .remove_resource(ctx, self.node.name())?;
        self.driver.delete(self)?;
        self.deleted.store(true, Ordering::Release);
        Ok(())
    }

    pub fn api_data(&self, ctx: &AccessContext) -> QuarryResult<ResourceApi> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        let volumes = self
            .volumes
            .values()
            .into_iter()
            .map(|vlm| vlm.api_data(ctx))
            .collect::<QuarryResult<Vec<_>>>()?;
        Ok(ResourceApi {
            uuid: self.uuid.to_string(),
            node_name: self.node.name().as_str().to_owned(),
            resource_name: self.definition.name().as_str().to_owned(),
            flags: flags::to_string_list::<RscFlags>(self.flags.mask(ctx)?),
            volumes,
            props: self.props.entries(),
        })
    }
}

impl TransactionObject for Resource {
    fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
        let mut children: Vec<Arc<dyn TransactionObject>> = vec![
            Arc::clone(&self.obj_prot) as Arc<dyn TransactionObject>,
            Arc::clone(&self.node) as Arc<dyn TransactionObject>,
            Arc::clone(&self.definition) as Arc<dyn TransactionObject>,
            Arc::clone(&self.flags) as Arc<dyn TransactionObject>,
            Arc::clone(&self.props) as Arc<dyn TransactionObject>,
            Arc::clone(&self.volumes) as Arc<dyn TransactionObject>,
            Arc::clone(&self.connections) as Arc<dyn TransactionObject>,
        ];
        children.extend(
            self.volumes
                .values()
                .into_iter()
                .map(|vlm| vlm as Arc<dyn TransactionObject>),
        );
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
