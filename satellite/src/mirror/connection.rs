//! Connection mirrors.
//!
//! The registering constructors already apply the canonical endpoint
//! ordering, so the mirror only adds the lookup and the UUID check.

use std::sync::Arc;

use uuid::Uuid;

use quarry::access::AccessContext;
use quarry::db::DriverSet;
use quarry::error::QuarryResult;
use quarry::objects::{
    Node, NodeConnection, Resource, ResourceConnection, Volume, VolumeConnection,
};

use super::check_uuid;

pub struct NodeConnectionMirror {
    drivers: DriverSet,
}

impl NodeConnectionMirror {
    pub fn new(drivers: DriverSet) -> Self {
        Self { drivers }
    }

    pub fn get_instance(
        &self,
        ctx: &AccessContext,
        uuid: Uuid,
        node_a: &Arc<Node>,
        node_b: &Arc<Node>,
    ) -> QuarryResult<Arc<NodeConnection>> {
        if let Some(found) = node_a.node_connection(ctx, node_b.name())? {
            check_uuid("node connection", uuid, found.uuid())?;
            return Ok(found);
        }
        NodeConnection::new(
            ctx,
            uuid,
            Arc::clone(node_a),
            Arc::clone(node_b),
            Arc::clone(&self.drivers.node_connection),
        )
    }
}

pub struct ResourceConnectionMirror {
    drivers: DriverSet,
}

impl ResourceConnectionMirror {
    pub fn new(drivers: DriverSet) -> Self {
        Self { drivers }
    }

    pub fn get_instance(
        &self,
        ctx: &AccessContext,
        uuid: Uuid,
        rsc_a: &Arc<Resource>,
        rsc_b: &Arc<Resource>,
    ) -> QuarryResult<Arc<ResourceConnection>> {
        if let Some(found) = rsc_a.resource_connection(ctx, rsc_b.node().name())? {
            check_uuid("resource connection", uuid, found.uuid())?;
            return Ok(found);
        }
        ResourceConnection::new(
            ctx,
            uuid,
            Arc::clone(rsc_a),
            Arc::clone(rsc_b),
            Arc::clone(&self.drivers.resource_connection),
        )
    }
}

pub struct VolumeConnectionMirror {
    drivers: DriverSet,
}

impl VolumeConnectionMirror {
    pub fn new(drivers: DriverSet) -> Self {
        Self { drivers }
    }

    pub fn get_instance(
        &self,
        ctx: &AccessContext,
        uuid: Uuid,
        vlm_a: &Arc<Volume>,
        vlm_b: &Arc<Volume>,
    ) -> QuarryResult<Arc<VolumeConnection>> {
        if let Some(found) = vlm_a.volume_connection(ctx, vlm_b.resource().node().name())? {
            check_uuid("volume connection", uuid, found.uuid())?;
            return Ok(found);
        }
        VolumeConnection::new(
            ctx,
            uuid,
            Arc::clone(vlm_a),
            Arc::clone(vlm_b),
            Arc::clone(&self.drivers.volume_connection),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::NodeMirror;
    use crate::repos::SatelliteRepos;
    use quarry::identifier::NodeName;
    use quarry::objects::NodeType;
    use std::str::FromStr;

    #[test]
    fn test_node_connection_mirror_replay() {
        let ctx = AccessContext::system();
        let repos = Arc::new(SatelliteRepos::new(&ctx));
        let drivers = DriverSet::no_op();
        let nodes = NodeMirror::new(Arc::clone(&repos), drivers.clone());
        let alpha = nodes
            .get_instance(
                &ctx,
                Uuid::new_v4(),
                NodeName::from_str("alpha").unwrap(),
                NodeType::Satellite,
                0,
            )
            .unwrap();
        let bravo = nodes
            .get_instance(
                &ctx,
                Uuid::new_v4(),
                NodeName::from_str("bravo").unwrap(),
                NodeType::Satellite,
                0,
            )
            .unwrap();

        let mirror = NodeConnectionMirror::new(drivers);
        let uuid = Uuid::new_v4();
        let conn = mirror.get_instance(&ctx, uuid, &alpha, &bravo).unwrap();
        // the replay may arrive with the endpoints swapped
        let replay = mirror.get_instance(&ctx, uuid, &bravo, &alpha).unwrap();
        assert!(Arc::ptr_eq(&conn, &replay));
        assert_eq!("alpha", conn.source().name().as_str());
    }
}
