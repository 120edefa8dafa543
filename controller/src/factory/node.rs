//! Node, net interface and satellite connection factories.

use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use quarry::access::{AccessContext, AccessType, ObjectProtection};
use quarry::db::DriverSet;
use quarry::flags::{mask_of, NodeFlags};
use quarry::identifier::{NetInterfaceName, NodeName, TcpPortNumber};
use quarry::objects::{EncryptionType, NetInterface, Node, NodeType, SatelliteConnection};

use crate::error::ControllerResult;
use crate::repos::CoreRepos;

use super::resolve;

pub struct NodeFactory {
    repos: Arc<CoreRepos>,
    drivers: DriverSet,
}

impl NodeFactory {
    pub fn new(repos: Arc<CoreRepos>, drivers: DriverSet) -> Self {
        Self { repos, drivers }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn get(
        &self,
        ctx: &AccessContext,
        name: NodeName,
        node_type: NodeType,
        flags: &[NodeFlags],
        create_if_not_exists: bool,
        fail_if_exists: bool,
    ) -> ControllerResult<Option<Arc<Node>>> {
        let mut nodes = self.repos.nodes.write(ctx)?;

        let existing = match nodes.get(&name) {
            Some(found) => Some(Arc::clone(found)),
            None => {
                let loaded = self.drivers.node.load(&name)?;
                if let Some(loaded) = &loaded {
                    nodes.insert(name.clone(), Arc::clone(loaded));
                }
                loaded
            }
        };

        resolve("node", existing, create_if_not_exists, fail_if_exists, || {
            let node = Node::new(
                Uuid::new_v4(),
                ObjectProtection::new(ctx),
                name.clone(),
                node_type,
                mask_of(flags),
                Arc::clone(&self.drivers.node),
            );
            self.drivers.node.create(&node)?;
            nodes.insert(name.clone(), Arc::clone(&node));
            tracing::info!(node = %name, node_type = node_type.as_str(), "created node");
            Ok(node)
        })
    }
}

pub struct NetInterfaceFactory {
    drivers: DriverSet,
    create_lock: Mutex<()>,
}

impl NetInterfaceFactory {
    pub fn new(drivers: DriverSet) -> Self {
        Self {
            drivers,
            create_lock: Mutex::new(()),
        }
    }

    pub fn get(
        &self,
        ctx: &AccessContext,
        node: &Arc<Node>,
        name: NetInterfaceName,
        address: IpAddr,
        create_if_not_exists: bool,
        fail_if_exists: bool,
    ) -> ControllerResult<Option<Arc<NetInterface>>> {
        node.obj_prot().require_access(ctx, AccessType::Change)?;
        let _serial = self.create_lock.lock().unwrap();

        let existing = match node.net_interface(ctx, &name)? {
            Some(found) => Some(found),
            None => {
                let key = (node.name().clone(), name.clone());
                let loaded = self.drivers.net_interface.load(&key)?;
                if let Some(loaded) = &loaded {
                    node.add_net_interface(ctx, Arc::clone(loaded))?;
                }
                loaded
            }
        };

        resolve(
            "net interface",
            existing,
            create_if_not_exists,
            fail_if_exists,
            || {
                let nif = NetInterface::new(
                    Uuid::new_v4(),
                    Arc::clone(node),
                    name.clone(),
                    address,
                    Arc::clone(&self.drivers.net_interface),
                );
                self.drivers.net_interface.create(&nif)?;
                node.add_net_interface(ctx, Arc::clone(&nif))?;
                tracing::info!(node = %node.name(), net_interface = %name, "created net interface");
                Ok(nif)
            },
        )
    }
}

pub struct SatelliteConnectionFactory {
    drivers: DriverSet,
    create_lock: Mutex<()>,
}

impl SatelliteConnectionFactory {
    pub fn new(drivers: DriverSet) -> Self {
        Self {
            drivers,
            create_lock: Mutex::new(()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn get(
        &self,
        ctx: &AccessContext,
        node: &Arc<Node>,
        net_interface: &Arc<NetInterface>,
        port: TcpPortNumber,
        encryption_type: EncryptionType,
        create_if_not_exists: bool,
        fail_if_exists: bool,
    ) -> ControllerResult<Option<Arc<SatelliteConnection>>> {
        node.obj_prot().require_access(ctx, AccessType::Change)?;
        let _serial = self.create_lock.lock().unwrap();

        let existing = match node.satellite_connection(ctx)? {
            Some(found) => Some(found),
            None => {
                let loaded = self.drivers.satellite_connection.load(node.name())?;
                if let Some(loaded) = &loaded {
                    node.set_satellite_connection(ctx, Arc::clone(loaded))?;
                }
                loaded
            }
        };

        resolve(
            "satellite connection",
            existing,
            create_if_not_exists,
            fail_if_exists,
            || {
                let conn = SatelliteConnection::new(
                    Uuid::new_v4(),
                    Arc::clone(node),
                    Arc::clone(net_interface),
                    port,
                    encryption_type,
                    Arc::clone(&self.drivers.satellite_connection),
                );
                self.drivers.satellite_connection.create(&conn)?;
                node.set_satellite_connection(ctx, Arc::clone(&conn))?;
                tracing::info!(node = %node.name(), port = port.value(), "created satellite connection");
                Ok(conn)
            },
        )
    }
}
