//! Resource definitions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::access::{AccessContext, AccessType, ObjectProtection};
use crate::db::DriverRef;
use crate::error::{QuarryError, QuarryResult};
use crate::flags::{self, RscDfnFlags, StateFlags};
use crate::identifier::{NodeName, ResourceName, SnapshotName, TcpPortNumber, VolumeNumber};
use crate::props::{secure_props, PropsContainer};
use crate::transaction::{cell, txmap, TransactionCell, TransactionMap, TransactionObject};

use super::api::ResourceDefinitionApi;
use super::{Resource, SnapshotDefinition, VolumeDefinition};

/// Replication transport of a resource. Wire names are fixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportType {
    Ip,
    Rdma,
    Roce,
}

impl TransportType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ip => "IP",
            Self::Rdma => "RDMA",
            Self::Roce => "ROCE",
        }
    }

    pub fn from_name(name: &str) -> QuarryResult<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "IP" => Ok(Self::Ip),
            "RDMA" => Ok(Self::Rdma),
            "ROCE" => Ok(Self::Roce),
            other => Err(QuarryError::InvalidName {
                kind: "transport type",
                name: other.to_owned(),
                reason: "not a known transport type",
            }),
        }
    }
}

/// The cluster-wide definition of a replicated resource.
///
/// Carries the replication port (drawn from an external pool on the
/// controller), the shared secret and the transport, and owns the volume
/// definitions, the per-node resources and the snapshot definitions
/// created from it.
pub struct ResourceDefinition {
    uuid: Uuid,
    dbg_instance_id: Uuid,
    obj_prot: Arc<ObjectProtection>,
    name: ResourceName,
    port: Arc<TransactionCell<TcpPortNumber>>,
    secret: Arc<TransactionCell<String>>,
    transport_type: Arc<TransactionCell<TransportType>>,
    flags: Arc<StateFlags<RscDfnFlags>>,
    props: Arc<PropsContainer>,
    volume_definitions: Arc<TransactionMap<VolumeNumber, Arc<VolumeDefinition>>>,
    resources: Arc<TransactionMap<NodeName, Arc<Resource>>>,
    snapshot_definitions: Arc<TransactionMap<SnapshotName, Arc<SnapshotDefinition>>>,
    driver: DriverRef<ResourceName, ResourceDefinition>,
    deleted: AtomicBool,
}

impl std::fmt::Debug for ResourceDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceDefinition")
            .field("uuid", &self.uuid)
            .finish_non_exhaustive()
    }
}

impl ResourceDefinition {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        uuid: Uuid,
        obj_prot: Arc<ObjectProtection>,
        name: ResourceName,
        port: TcpPortNumber,
        secret: String,
        transport_type: TransportType,
        initial_flags: u64,
        driver: DriverRef<ResourceName, ResourceDefinition>,
    ) -> Arc<Self> {
        Arc::new(Self {
            uuid,
            dbg_instance_id: Uuid::new_v4(),
            flags: StateFlags::new(Arc::clone(&obj_prot), initial_flags),
            obj_prot,
            name,
            port: cell(port),
            secret: cell(secret),
            transport_type: cell(transport_type),
            props: PropsContainer::new(),
            volume_definitions: txmap(),
            resources: txmap(),
            snapshot_definitions: txmap(),
            driver,
            deleted: AtomicBool::new(false),
        })
    }

    fn check_deleted(&self) {
        if self.deleted.load(Ordering::Acquire) {
            panic!("access to a deleted resource definition");
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.check_deleted();
        self.uuid
    }

    pub fn dbg_instance_id(&self) -> Uuid {
        self.dbg_instance_id
    }

    pub fn name(&self) -> &ResourceName {
        self.check_deleted();
        &self.name
    }

    pub fn obj_prot(&self) -> &Arc<ObjectProtection> {
        &self.obj_prot
    }

    pub fn port(&self, ctx: &AccessContext) -> QuarryResult<TcpPortNumber> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.port.get())
    }

    pub fn set_port(&self, ctx: &AccessContext, port: TcpPortNumber) -> QuarryResult<()> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Change)?;
        self.port.set(port);
        Ok(())
    }

    pub fn secret(&self, ctx: &AccessContext) -> QuarryResult<String> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.secret.get())
    }

    pub fn transport_type(&self, ctx: &AccessContext) -> QuarryResult<TransportType> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.transport_type.get())
    }

    pub fn set_transport_type(
        &self,
        ctx: &AccessContext,
        transport_type: TransportType,
    ) -> QuarryResult<()> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Change)?;
        self.transport_type.set(transport_type);
        Ok(())
    }

    pub fn flags(&self) -> &Arc<StateFlags<RscDfnFlags>> {
        self.check_deleted();
        &self.flags
    }

    pub fn props(&self, ctx: &AccessContext) -> QuarryResult<&Arc<PropsContainer>> {
        self.check_deleted();
        secure_props(ctx, &self.obj_prot, &self.props)
    }

    pub fn volume_definition(
        &self,
        ctx: &AccessContext,
        vlm_nr: VolumeNumber,
    ) -> QuarryResult<Option<Arc<VolumeDefinition>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.volume_definitions.get(&vlm_nr))
    }

    pub fn volume_definitions(
        &self,
        ctx: &AccessContext,
    ) -> QuarryResult<Vec<Arc<VolumeDefinition>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.volume_definitions.values())
    }

    /// Registering a volume definition is an act of using the definition.
    pub fn add_volume_definition(
        &self,
        ctx: &AccessContext,
        vlm_dfn: Arc<VolumeDefinition>,
    ) -> QuarryResult<()> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Use)?;
        self.volume_definitions
            .insert(vlm_dfn.volume_number(), vlm_dfn);
        Ok(())
    }

    pub fn remove_volume_definition(
        &self,
        ctx: &AccessContext,
        vlm_nr: VolumeNumber,
    ) -> QuarryResult<Option<Arc<VolumeDefinition>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Use)?;
        Ok(self.volume_definitions.remove(&vlm_nr))
    }

    pub fn resource(
        &self,
        ctx: &AccessContext,
        node_name: &NodeName,
    ) -> QuarryResult<Option<Arc<Resource>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.resources.get(node_name))
    }

    pub fn resources(&self, ctx: &AccessContext) -> QuarryResult<Vec<Arc<Resource>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.resources.values())
    }

    pub fn resource_count(&self) -> usize {
        self.check_deleted();
        self.resources.len()
    }

    pub fn add_resource(&self, ctx: &AccessContext, rsc: Arc<Resource>) -> QuarryResult<()> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Use)?;
        self.resources.insert(rsc.node().name().clone(), rsc);
        Ok(())
    }

    pub fn remove_resource(
        &self,
        ctx: &AccessContext,
        node_name: &NodeName,
    ) -> QuarryResult<Option<Arc<Resource>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Use)?;
        Ok(self.resources.remove(node_name))
    }

    pub fn snapshot_definition(
        &self,
        ctx: &AccessContext,
        name: &SnapshotName,
    ) -> QuarryResult<Option<Arc<SnapshotDefinition>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.snapshot_definitions.get(name))
    }

    pub fn snapshot_definitions(
        &self,
        ctx: &AccessContext,
    ) -> QuarryResult<Vec<Arc<SnapshotDefinition>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.snapshot_definitions.values())
    }

    pub fn add_snapshot_definition(
        &self,
        ctx: &AccessContext,
        snap_dfn: Arc<SnapshotDefinition>,
    ) -> QuarryResult<()> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Change)?;
        self.snapshot_definitions
            .insert(snap_dfn.snapshot_name().clone(), snap_dfn);
        Ok(())
    }

    pub fn remove_snapshot_definition(
        &self,
        ctx: &AccessContext,
        name: &SnapshotName,
    ) -> QuarryResult<Option<Arc<SnapshotDefinition>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Change)?;
        Ok(self.snapshot_definitions.remove(name))
    }

    pub fn mark_deleted(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.flags.enable_flags(ctx, RscDfnFlags::DELETE)
    }

    pub fn delete(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Control)?;
        self.driver.delete(self)?;
        self.deleted.store(true, Ordering::Release);
        Ok(())
    }

    pub fn api_data(&self, ctx: &AccessContext) -> QuarryResult<ResourceDefinitionApi> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        let volume_definitions = self
            .volume_definitions
            .values()
            .into_iter()
            .map(|vlm_dfn| vlm_dfn.api_data(ctx))
            .collect::<QuarryResult<Vec<_>>>()?;
        Ok(ResourceDefinitionApi {
            uuid: self.uuid.to_string(),
            name: self.name.as_str().to_owned(),
            port: self.port.get().value(),
            transport_type: self.transport_type.get().as_str(),
            flags: flags::to_string_list::<RscDfnFlags>(self.flags.mask(ctx)?),
            volume_definitions,
            props: self.props.entries(),
        })
    }
}

impl TransactionObject for ResourceDefinition {
    fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
        let mut children: Vec<Arc<dyn TransactionObject>> = vec![
            Arc::clone(&self.obj_prot) as Arc<dyn TransactionObject>,
            Arc::clone(&self.port) as Arc<dyn TransactionObject>,
            Arc::clone(&self.secret) as Arc<dyn TransactionObject>,
            Arc::clone(&self.transport_type) as Arc<dyn TransactionObject>,
            Arc::clone(&self.flags) as Arc<dyn TransactionObject>,
            Arc::clone(&self.props) as Arc<dyn TransactionObject>,
            Arc::clone(&self.volume_definitions) as Arc<dyn TransactionObject>,
            Arc::clone(&self.resources) as Arc<dyn TransactionObject>,
            Arc::clone(&self.snapshot_definitions) as Arc<dyn TransactionObject>,
        ];
        children.extend(
            self.volume_definitions
                .values()
                .into_iter()
                .map(|vlm_dfn| vlm_dfn as Arc<dyn TransactionObject>),
        );
        children.extend(
            self.resources
                .values()
                .into_iter()
                .map(|rsc| rsc as Arc<dyn TransactionObject>),
        );
        children.extend(
            self.snapshot_definitions
                .values()
                .into_iter()
                .map(|snap_dfn| snap_dfn as Arc<dyn TransactionObject>),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::db::NoOpDriver;
    use std::str::FromStr;

    #[test]
    fn test_transport_type_names() {
        for transport in [TransportType::Ip, TransportType::Rdma, TransportType::Roce] {
            assert_eq!(
                transport,
                TransportType::from_name(transport.as_str()).unwrap()
            );
        }
        assert_eq!(TransportType::Rdma, TransportType::from_name("rdma").unwrap());
        TransportType::from_name("tcp").unwrap_err();
    }

    #[test]
    fn test_secret_requires_view() {
        let admin = AccessContext::for_role(Role::new("admin"));
        let outsider = AccessContext::for_role(Role::new("outsider"));
        let rsc_dfn = ResourceDefinition::new(
            Uuid::new_v4(),
            ObjectProtection::new(&admin),
            ResourceName::from_str("res1").unwrap(),
            TcpPortNumber::new(7000).unwrap(),
            "secret".to_owned(),
            TransportType::Ip,
            0,
            Arc::new(NoOpDriver),
        );
        assert_eq!("secret", rsc_dfn.secret(&admin).unwrap());
        rsc_dfn.secret(&outsider).unwrap_err();
    }
}
