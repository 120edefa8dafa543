//! Node network interfaces and satellite connectivity.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::access::{AccessContext, AccessType};
use crate::db::DriverRef;
use crate::error::{QuarryError, QuarryResult};
use crate::identifier::{NetInterfaceName, NodeName, TcpPortNumber};
use crate::transaction::{cell, TransactionCell, TransactionObject};

use super::api::{NetInterfaceApi, SatelliteConnectionApi};
use super::Node;

/// A named network interface of a node.
///
/// Access is governed by the owning node's protection.
pub struct NetInterface {
    uuid: Uuid,
    dbg_instance_id: Uuid,
    node: Arc<Node>,
    name: NetInterfaceName,
    address: Arc<TransactionCell<IpAddr>>,
    driver: DriverRef<(NodeName, NetInterfaceName), NetInterface>,
    deleted: AtomicBool,
}

impl NetInterface {
    pub fn new(
        uuid: Uuid,
        node: Arc<Node>,
        name: NetInterfaceName,
        address: IpAddr,
        driver: DriverRef<(NodeName, NetInterfaceName), NetInterface>,
    ) -> Arc<Self> {
        Arc::new(Self {
            uuid,
            dbg_instance_id: Uuid::new_v4(),
            node,
            name,
            address: cell(address),
            driver,
            deleted: AtomicBool::new(false),
        })
    }

    fn check_deleted(&self) {
        if self.deleted.load(Ordering::Acquire) {
            panic!("access to a deleted net interface");
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.check_deleted();
        self.uuid
    }

    pub fn dbg_instance_id(&self) -> Uuid {
        self.dbg_instance_id
    }

    pub fn name(&self) -> &NetInterfaceName {
        self.check_deleted();
        &self.name
    }

    pub fn node(&self) -> &Arc<Node> {
        self.check_deleted();
        &self.node
    }

    pub fn key(&self) -> (NodeName, NetInterfaceName) {
        (self.node.name().clone(), self.name.clone())
    }

    pub fn address(&self, ctx: &AccessContext) -> QuarryResult<IpAddr> {
        self.check_deleted();
        self.node.obj_prot().require_access(ctx, AccessType::View)?;
        Ok(self.address.get())
    }

    pub fn set_address(&self, ctx: &AccessContext, address: IpAddr) -> QuarryResult<()> {
        self.check_deleted();
        self.node
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        self.address.set(address);
        Ok(())
    }

    /// Detaches from the node, removes the persisted record, poisons.
    pub fn delete(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.node
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        self.node.remove_net_interface(ctx, &self.name)?;
        self.driver.delete(self)?;
        self.deleted.store(true, Ordering::Release);
        Ok(())
    }

    pub fn api_data(&self, ctx: &AccessContext) -> QuarryResult<NetInterfaceApi> {
        self.check_deleted();
        Ok(NetInterfaceApi {
            uuid: self.uuid.to_string(),
            name: self.name.as_str().to_owned(),
            address: self.address(ctx)?.to_string(),
        })
    }
}

impl TransactionObject for NetInterface {
    fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
        vec![
            Arc::clone(&self.node) as Arc<dyn TransactionObject>,
            Arc::clone(&self.address) as Arc<dyn TransactionObject>,
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

/// Transport security of the controller-to-satellite channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncryptionType {
    Plain,
    Ssl,
}

impl EncryptionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Ssl => "SSL",
        }
    }

    pub fn from_name(name: &str) -> QuarryResult<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "PLAIN" => Ok(Self::Plain),
            "SSL" => Ok(Self::Ssl),
            other => Err(QuarryError::InvalidName {
                kind: "encryption type",
                name: other.to_owned(),
                reason: "not a known encryption type",
            }),
        }
    }
}

/// How the controller reaches a satellite: one interface of the node
/// plus a TCP port and channel encryption. At most one per node.
pub struct SatelliteConnection {
    uuid: Uuid,
    dbg_instance_id: Uuid,
    node: Arc<Node>,
    net_interface: Arc<TransactionCell<Arc<NetInterface>>>,
    port: Arc<TransactionCell<TcpPortNumber>>,
    encryption_type: Arc<TransactionCell<EncryptionType>>,
    driver: DriverRef<NodeName, SatelliteConnection>,
    deleted: AtomicBool,
}

impl SatelliteConnection {
    pub fn new(
        uuid: Uuid,
        node: Arc<Node>,
        net_interface: Arc<NetInterface>,
        port: TcpPortNumber,
        encryption_type: EncryptionType,
        driver: DriverRef<NodeName, SatelliteConnection>,
    ) -> Arc<Self> {
        Arc::new(Self {
            uuid,
            dbg_instance_id: Uuid::new_v4(),
            node,
            net_interface: cell(net_interface),
            port: cell(port),
            encryption_type: cell(encryption_type),
            driver,
            deleted: AtomicBool::new(false),
        })
    }

    fn check_deleted(&self) {
        if self.deleted.load(Ordering::Acquire) {
            panic!("access to a deleted satellite connection");
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

    pub fn net_interface(&self, ctx: &AccessContext) -> QuarryResult<Arc<NetInterface>> {
        self.check_deleted();
        self.node.obj_prot().require_access(ctx, AccessType::View)?;
        Ok(self.net_interface.get())
    }

    pub fn port(&self, ctx: &AccessContext) -> QuarryResult<TcpPortNumber> {
        self.check_deleted();
        self.node.obj_prot().require_access(ctx, AccessType::View)?;
        Ok(self.port.get())
    }

    pub fn set_port(&self, ctx: &AccessContext, port: TcpPortNumber) -> QuarryResult<()> {
        self.check_deleted();
        self.node
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        self.port.set(port);
        Ok(())
    }

    pub fn encryption_type(&self, ctx: &AccessContext) -> QuarryResult<EncryptionType> {
        self.check_deleted();
        self.node.obj_prot().require_access(ctx, AccessType::View)?;
        Ok(self.encryption_type.get())
    }

    pub fn set_encryption_type(
        &self,
        ctx: &AccessContext,
        encryption_type: EncryptionType,
    ) -> QuarryResult<()> {
        self.check_deleted();
        self.node
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        self.encryption_type.set(encryption_type);
        Ok(())
    }

    pub fn delete(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.node
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        self.driver.delete(self)?;
        self.deleted.store(true, Ordering::Release);
        Ok(())
    }

    pub fn api_data(&self, ctx: &AccessContext) -> QuarryResult<SatelliteConnectionApi> {
        self.check_deleted();
        Ok(SatelliteConnectionApi {
            uuid: self.uuid.to_string(),
            net_interface: self.net_interface(ctx)?.name().as_str().to_owned(),
            port: self.port(ctx)?.value(),
            encryption_type: self.encryption_type(ctx)?.as_str(),
        })
    }
}

impl TransactionObject for SatelliteConnection {
    fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
        vec![
            Arc::clone(&self.node) as Arc<dyn TransactionObject>,
            Arc::clone(&self.net_interface) as Arc<dyn TransactionObject>,
            Arc::clone(&self.port) as Arc<dyn TransactionObject>,
            Arc::clone(&self.encryption_type) as Arc<dyn TransactionObject>,
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

/// A directed path between two nodes' interfaces.
///
/// Validated at construction, never persisted and never registered with
/// a unit of work.
pub struct NetworkPath {
    source: Arc<NetInterface>,
    target: Arc<NetInterface>,
}

impl std::fmt::Debug for NetworkPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkPath").finish_non_exhaustive()
    }
}

impl NetworkPath {
    /// Both endpoint nodes must be viewable by `ctx`; the endpoints must
    /// belong to two different nodes.
    pub fn new(
        ctx: &AccessContext,
        source: Arc<NetInterface>,
        target_node: &Arc<Node>,
        target: Arc<NetInterface>,
    ) -> QuarryResult<Self> {
        source
            .node()
            .obj_prot()
            .require_access(ctx, AccessType::View)?;
        target_node.obj_prot().require_access(ctx, AccessType::View)?;
        if !Arc::ptr_eq(target.node(), target_node) {
            return Err(QuarryError::implementation_error(
                "network path target interface does not belong to the target node",
            ));
        }
        if source.node().name() == target_node.name() {
            return Err(QuarryError::implementation_error(
                "network path endpoints must be on different nodes",
            ));
        }
        Ok(Self { source, target })
    }

    pub fn source(&self) -> &Arc<NetInterface> {
        &self.source
    }

    pub fn target(&self) -> &Arc<NetInterface> {
        &self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{ObjectProtection, Role};
    use crate::db::NoOpDriver;
    use crate::objects::NodeType;
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

    fn nif(node: &Arc<Node>, name: &str, addr: &str) -> Arc<NetInterface> {
        NetInterface::new(
            Uuid::new_v4(),
            Arc::clone(node),
            NetInterfaceName::from_str(name).unwrap(),
            addr.parse().unwrap(),
            Arc::new(NoOpDriver),
        )
    }

    #[test]
    fn test_network_path_validation() {
        let ctx = AccessContext::for_role(Role::new("admin"));
        let alpha = node("alpha", &ctx);
        let bravo = node("bravo", &ctx);
        let alpha_if = nif(&alpha, "eth0", "10.0.0.1");
        let bravo_if = nif(&bravo, "eth0", "10.0.0.2");

        NetworkPath::new(&ctx, Arc::clone(&alpha_if), &bravo, Arc::clone(&bravo_if)).unwrap();

        // target interface belonging to another node is a defect
        NetworkPath::new(&ctx, Arc::clone(&alpha_if), &bravo, Arc::clone(&alpha_if)).unwrap_err();
        // both endpoints on one node is a defect
        NetworkPath::new(&ctx, Arc::clone(&alpha_if), &alpha, alpha_if).unwrap_err();
    }

    #[test]
    fn test_encryption_type_names() {
        assert_eq!(
            EncryptionType::Ssl,
            EncryptionType::from_name("ssl").unwrap()
        );
        assert_eq!("PLAIN", EncryptionType::Plain.as_str());
        EncryptionType::from_name("tls").unwrap_err();
    }
}
