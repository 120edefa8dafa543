//! Node and net interface mirrors.

use std::net::IpAddr;
use std::sync::Arc;

use uuid::Uuid;

use quarry::access::{AccessContext, ObjectProtection};
use quarry::db::DriverSet;
use quarry::error::QuarryResult;
use quarry::identifier::{NetInterfaceName, NodeName};
use quarry::objects::{NetInterface, Node, NodeType};

use crate::repos::SatelliteRepos;

use super::check_uuid;

pub struct NodeMirror {
    repos: Arc<SatelliteRepos>,
    drivers: DriverSet,
}

impl NodeMirror {
    pub fn new(repos: Arc<SatelliteRepos>, drivers: DriverSet) -> Self {
        Self { repos, drivers }
    }

    pub fn get_instance(
        &self,
        ctx: &AccessContext,
        uuid: Uuid,
        name: NodeName,
        node_type: NodeType,
        initial_flags: u64,
    ) -> QuarryResult<Arc<Node>> {
        let mut nodes = self.repos.nodes.write(ctx)?;
        if let Some(found) = nodes.get(&name) {
            check_uuid("node", uuid, found.uuid())?;
            return Ok(Arc::clone(found));
        }
        let node = Node::new(
            uuid,
            ObjectProtection::new(ctx),
            name.clone(),
            node_type,
            initial_flags,
            Arc::clone(&self.drivers.node),
        );
        nodes.insert(name.clone(), Arc::clone(&node));
        tracing::debug!(node = %name, "mirrored node");
        Ok(node)
    }
}

pub struct NetInterfaceMirror {
    drivers: DriverSet,
}

impl NetInterfaceMirror {
    pub fn new(drivers: DriverSet) -> Self {
        Self { drivers }
    }

    pub fn get_instance(
        &self,
        ctx: &AccessContext,
        uuid: Uuid,
        node: &Arc<Node>,
        name: NetInterfaceName,
        address: IpAddr,
    ) -> QuarryResult<Arc<NetInterface>> {
        if let Some(found) = node.net_interface(ctx, &name)? {
            check_uuid("net interface", uuid, found.uuid())?;
            return Ok(found);
        }
        let nif = NetInterface::new(
            uuid,
            Arc::clone(node),
            name,
            address,
            Arc::clone(&self.drivers.net_interface),
        );
        node.add_net_interface(ctx, Arc::clone(&nif))?;
        Ok(nif)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_node_mirror_idempotent() {
        let ctx = AccessContext::system();
        let repos = Arc::new(SatelliteRepos::new(&ctx));
        let mirror = NodeMirror::new(Arc::clone(&repos), DriverSet::no_op());
        let uuid = Uuid::new_v4();
        let name = NodeName::from_str("alpha").unwrap();

        let first = mirror
            .get_instance(&ctx, uuid, name.clone(), NodeType::Satellite, 0)
            .unwrap();
        let second = mirror
            .get_instance(&ctx, uuid, name.clone(), NodeType::Satellite, 0)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(1, repos.nodes.len());
    }

    #[test]
    fn test_node_mirror_uuid_divergence() {
        let ctx = AccessContext::system();
        let repos = Arc::new(SatelliteRepos::new(&ctx));
        let mirror = NodeMirror::new(repos, DriverSet::no_op());
        let name = NodeName::from_str("alpha").unwrap();

        mirror
            .get_instance(&ctx, Uuid::new_v4(), name.clone(), NodeType::Satellite, 0)
            .unwrap();
        mirror
            .get_instance(&ctx, Uuid::new_v4(), name, NodeType::Satellite, 0)
            .unwrap_err();
    }
}
