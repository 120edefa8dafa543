//! Cluster nodes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::access::{AccessContext, AccessType, ObjectProtection};
use crate::db::DriverRef;
use crate::error::{QuarryError, QuarryResult};
use crate::flags::{self, NodeFlags, StateFlags};
use crate::identifier::{NetInterfaceName, NodeName, ResourceName, StorPoolName};
use crate::props::{secure_props, PropsContainer};
use crate::transaction::{cell, txmap, TransactionCell, TransactionMap, TransactionObject};

use super::api::NodeApi;
use super::{NetInterface, NodeConnection, Resource, SatelliteConnection, StorPool};

/// The role a node plays in the cluster.
///
/// The numeric values are the wire and database representation and are
/// never renumbered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    Controller = 1,
    Satellite = 2,
    Combined = 3,
    Auxiliary = 4,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Controller => "CONTROLLER",
            Self::Satellite => "SATELLITE",
            Self::Combined => "COMBINED",
            Self::Auxiliary => "AUXILIARY",
        }
    }

    pub fn wire_value(self) -> u32 {
        self as u32
    }

    pub fn from_wire_value(value: u32) -> QuarryResult<Self> {
        match value {
            1 => Ok(Self::Controller),
            2 => Ok(Self::Satellite),
            3 => Ok(Self::Combined),
            4 => Ok(Self::Auxiliary),
            other => Err(QuarryError::implementation_error(format!(
                "unknown node type value {other}"
            ))),
        }
    }

    pub fn from_name(name: &str) -> QuarryResult<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "CONTROLLER" => Ok(Self::Controller),
            "SATELLITE" => Ok(Self::Satellite),
            "COMBINED" => Ok(Self::Combined),
            "AUXILIARY" => Ok(Self::Auxiliary),
            other => Err(QuarryError::InvalidName {
                kind: "node type",
                name: other.to_owned(),
                reason: "not a known node type",
            }),
        }
    }
}

/// A cluster node.
///
/// Owns its network interfaces and storage pools, and holds backlinks to
/// every resource assigned to it. The node name is unique cluster-wide
/// (case-insensitive).
pub struct Node {
    uuid: Uuid,
    dbg_instance_id: Uuid,
    obj_prot: Arc<ObjectProtection>,
    name: NodeName,
    node_type: Arc<TransactionCell<NodeType>>,
    flags: Arc<StateFlags<NodeFlags>>,
    props: Arc<PropsContainer>,
    net_interfaces: Arc<TransactionMap<NetInterfaceName, Arc<NetInterface>>>,
    resources: Arc<TransactionMap<ResourceName, Arc<Resource>>>,
    stor_pools: Arc<TransactionMap<StorPoolName, Arc<StorPool>>>,
    // keyed by the peer node's name
    node_connections: Arc<TransactionMap<NodeName, Arc<NodeConnection>>>,
    satellite_connection: Arc<TransactionCell<Option<Arc<SatelliteConnection>>>>,
    driver: DriverRef<NodeName, Node>,
    deleted: AtomicBool,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("uuid", &self.uuid)
            .finish_non_exhaustive()
    }
}

impl Node {
    pub fn new(
        uuid: Uuid,
        obj_prot: Arc<ObjectProtection>,
        name: NodeName,
        node_type: NodeType,
        initial_flags: u64,
        driver: DriverRef<NodeName, Node>,
    ) -> Arc<Self> {
        Arc::new(Self {
            uuid,
            dbg_instance_id: Uuid::new_v4(),
            flags: StateFlags::new(Arc::clone(&obj_prot), initial_flags),
            obj_prot,
            name,
            node_type: cell(node_type),
            props: PropsContainer::new(),
            net_interfaces: txmap(),
            resources: txmap(),
            stor_pools: txmap(),
            node_connections: txmap(),
            satellite_connection: cell(None),
            driver,
            deleted: AtomicBool::new(false),
        })
    }

    fn check_deleted(&self) {
        if self.deleted.load(Ordering::Acquire) {
            panic!("access to a deleted node");
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.check_deleted();
        self.uuid
    }

    /// Volatile per-instantiation identity, distinct across reloads even
    /// when the persistent UUID matches.
    pub fn dbg_instance_id(&self) -> Uuid {
        self.dbg_instance_id
    }

    pub fn name(&self) -> &NodeName {
        self.check_deleted();
        &self.name
    }

    pub fn obj_prot(&self) -> &Arc<ObjectProtection> {
        &self.obj_prot
    }

    pub fn node_type(&self, ctx: &AccessContext) -> QuarryResult<NodeType> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.node_type.get())
    }

    pub fn set_node_type(&self, ctx: &AccessContext, node_type: NodeType) -> QuarryResult<()> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Change)?;
        self.node_type.set(node_type);
        Ok(())
    }

    pub fn flags(&self) -> &Arc<StateFlags<NodeFlags>> {
        self.check_deleted();
        &self.flags
    }

    pub fn props(&self, ctx: &AccessContext) -> QuarryResult<&Arc<PropsContainer>> {
        self.check_deleted();
        secure_props(ctx, &self.obj_prot, &self.props)
    }

    pub fn net_interface(
        &self,
        ctx: &AccessContext,
        name: &NetInterfaceName,
    ) -> QuarryResult<Option<Arc<NetInterface>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.net_interfaces.get(name))
    }

    pub fn net_interfaces(&self, ctx: &AccessContext) -> QuarryResult<Vec<Arc<NetInterface>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.net_interfaces.values())
    }

    pub fn add_net_interface(
        &self,
        ctx: &AccessContext,
        nif: Arc<NetInterface>,
    ) -> QuarryResult<()> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Change)?;
        self.net_interfaces.insert(nif.name().clone(), nif);
        Ok(())
    }

    pub fn remove_net_interface(
        &self,
        ctx: &AccessContext,
        name: &NetInterfaceName,
    ) -> QuarryResult<Option<Arc<NetInterface>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Change)?;
        Ok(self.net_interfaces.remove(name))
    }

    pub fn resource(
        &self,
        ctx: &AccessContext,
        name: &ResourceName,
    ) -> QuarryResult<Option<Arc<Resource>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.resources.get(name))
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

    /// Registering a resource on a node requires `Use`, not `Change`:
    /// deploying onto a node is an act of using it.
    pub fn add_resource(&self, ctx: &AccessContext, rsc: Arc<Resource>) -> QuarryResult<()> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Use)?;
        self.resources.insert(rsc.definition().name().clone(), rsc);
        Ok(())
    }

    pub fn remove_resource(
        &self,
        ctx: &AccessContext,
        name: &ResourceName,
    ) -> QuarryResult<Option<Arc<Resource>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Use)?;
        Ok(self.resources.remove(name))
    }

    pub fn stor_pool(
        &self,
        ctx: &AccessContext,
        name: &StorPoolName,
    ) -> QuarryResult<Option<Arc<StorPool>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.stor_pools.get(name))
    }

    pub fn stor_pools(&self, ctx: &AccessContext) -> QuarryResult<Vec<Arc<StorPool>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.stor_pools.values())
    }

    pub fn add_stor_pool(&self, ctx: &AccessContext, pool: Arc<StorPool>) -> QuarryResult<()> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Change)?;
        self.stor_pools.insert(pool.definition().name().clone(), pool);
        Ok(())
    }

    pub fn remove_stor_pool(
        &self,
        ctx: &AccessContext,
        name: &StorPoolName,
    ) -> QuarryResult<Option<Arc<StorPool>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Change)?;
        Ok(self.stor_pools.remove(name))
    }

    pub fn node_connection(
        &self,
        ctx: &AccessContext,
        peer_name: &NodeName,
    ) -> QuarryResult<Option<Arc<NodeConnection>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.node_connections.get(peer_name))
    }

    pub(super) fn set_node_connection(&self, peer_name: NodeName, conn: Arc<NodeConnection>) {
        self.check_deleted();
        self.node_connections.insert(peer_name, conn);
    }

    pub(super) fn clear_node_connection(&self, peer_name: &NodeName) {
        self.node_connections.remove(peer_name);
    }

    pub fn satellite_connection(
        &self,
        ctx: &AccessContext,
    ) -> QuarryResult<Option<Arc<SatelliteConnection>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.satellite_connection.get())
    }

    /// At most one satellite connection per node; setting replaces.
    pub fn set_satellite_connection(
        &self,
        ctx: &AccessContext,
        conn: Arc<SatelliteConnection>,
    ) -> QuarryResult<()> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Change)?;
        self.satellite_connection.set(Some(conn));
        Ok(())
    }

    /// Begins the soft-delete phase by raising the `DELETE` flag.
    pub fn mark_deleted(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.flags.enable_flags(ctx, NodeFlags::DELETE)
    }

    /// Removes the node from the backing store and poisons the instance.
    /// Any later data access is a programming error.
    pub fn delete(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Control)?;
        self.driver.delete(self)?;
        self.deleted.store(true, Ordering::Release);
        Ok(())
    }

    pub fn api_data(&self, ctx: &AccessContext) -> QuarryResult<NodeApi> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        let net_interfaces = self
            .net_interfaces
            .values()
            .into_iter()
            .map(|nif| nif.api_data(ctx))
            .collect::<QuarryResult<Vec<_>>>()?;
        Ok(NodeApi {
            uuid: self.uuid.to_string(),
            name: self.name.as_str().to_owned(),
            node_type: self.node_type.get().as_str(),
            flags: flags::to_string_list::<NodeFlags>(self.flags.mask(ctx)?),
            net_interfaces,
            props: self.props.entries(),
        })
    }
}

impl TransactionObject for Node {
    fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
        let mut children: Vec<Arc<dyn TransactionObject>> = vec![
            Arc::clone(&self.obj_prot) as Arc<dyn TransactionObject>,
            Arc::clone(&self.node_type) as Arc<dyn TransactionObject>,
            Arc::clone(&self.flags) as Arc<dyn TransactionObject>,
            Arc::clone(&self.props) as Arc<dyn TransactionObject>,
            Arc::clone(&self.net_interfaces) as Arc<dyn TransactionObject>,
            Arc::clone(&self.resources) as Arc<dyn TransactionObject>,
            Arc::clone(&self.stor_pools) as Arc<dyn TransactionObject>,
            Arc::clone(&self.node_connections) as Arc<dyn TransactionObject>,
            Arc::clone(&self.satellite_connection) as Arc<dyn TransactionObject>,
        ];
        children.extend(
            self.net_interfaces
                .values()
                .into_iter()
                .map(|nif| nif as Arc<dyn TransactionObject>),
        );
        children.extend(
            self.resources
                .values()
                .into_iter()
                .map(|rsc| rsc as Arc<dyn TransactionObject>),
        );
        children.extend(
            self.stor_pools
                .values()
                .into_iter()
                .map(|pool| pool as Arc<dyn TransactionObject>),
        );
        children.extend(
            self.node_connections
                .values()
                .into_iter()
                .map(|conn| conn as Arc<dyn TransactionObject>),
        );
        if let Some(conn) = self.satellite_connection.get() {
            children.push(conn as Arc<dyn TransactionObject>);
        }
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

    fn node(name: &str, ctx: &AccessContext) -> Arc<Node> {
        Node::new(
            Uuid::new_v4(),
            ObjectProtection::new(ctx),
            NodeName::from_str(name).unwrap(),
            NodeType::Satellite,
            0,
            Arc::new(NoOpDriver),
        )
    }

    #[test]
    fn test_node_type_wire_values() {
        for node_type in [
            NodeType::Controller,
            NodeType::Satellite,
            NodeType::Combined,
            NodeType::Auxiliary,
        ] {
            assert_eq!(
                node_type,
                NodeType::from_wire_value(node_type.wire_value()).unwrap()
            );
            assert_eq!(node_type, NodeType::from_name(node_type.as_str()).unwrap());
        }
        NodeType::from_wire_value(0).unwrap_err();
        NodeType::from_name("cluster").unwrap_err();
        assert_eq!(NodeType::Combined, NodeType::from_name("combined").unwrap());
    }

    #[test]
    fn test_type_change_requires_change_access() {
        let admin = AccessContext::for_role(Role::new("admin"));
        let viewer = AccessContext::for_role(Role::new("viewer"));
        let node = node("alpha", &admin);
        node.obj_prot()
            .grant(&admin, Role::new("viewer"), AccessType::View)
            .unwrap();

        node.set_node_type(&viewer, NodeType::Combined).unwrap_err();
        node.set_node_type(&admin, NodeType::Combined).unwrap();
        assert_eq!(NodeType::Combined, node.node_type(&viewer).unwrap());
    }

    #[test]
    #[should_panic(expected = "deleted node")]
    fn test_deleted_node_poisoned() {
        let admin = AccessContext::for_role(Role::new("admin"));
        let node = node("alpha", &admin);
        node.delete(&admin).unwrap();
        let _ = node.name();
    }
}
