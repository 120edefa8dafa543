//! Connection factories.
//!
//! A connection registers itself with both endpoints during
//! construction, so a lookup through either endpoint finds the same
//! stored object regardless of argument order.

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use quarry::access::AccessContext;
use quarry::db::DriverSet;
use quarry::objects::{
    ordered_node_names, Node, NodeConnection, Resource, ResourceConnection, Volume,
    VolumeConnection,
};

use crate::error::ControllerResult;

use super::resolve;

pub struct NodeConnectionFactory {
    drivers: DriverSet,
    create_lock: Mutex<()>,
}

impl NodeConnectionFactory {
    pub fn new(drivers: DriverSet) -> Self {
        Self {
            drivers,
            create_lock: Mutex::new(()),
        }
    }

    pub fn get(
        &self,
        ctx: &AccessContext,
        node_a: &Arc<Node>,
        node_b: &Arc<Node>,
        create_if_not_exists: bool,
        fail_if_exists: bool,
    ) -> ControllerResult<Option<Arc<NodeConnection>>> {
        // also rejects a pair of handles to one node
        let key = ordered_node_names(node_a.name().clone(), node_b.name().clone())?;
        let _serial = self.create_lock.lock().unwrap();

        let existing = match node_a.node_connection(ctx, node_b.name())? {
            Some(found) => Some(found),
            // a driver reconstructs connections through the registering
            // constructor, so a loaded instance is already linked
            None => self.drivers.node_connection.load(&key)?,
        };

        resolve(
            "node connection",
            existing,
            create_if_not_exists,
            fail_if_exists,
            || {
                let conn = NodeConnection::new(
                    ctx,
                    Uuid::new_v4(),
                    Arc::clone(node_a),
                    Arc::clone(node_b),
                    Arc::clone(&self.drivers.node_connection),
                )?;
                self.drivers.node_connection.create(&conn)?;
                tracing::info!(
                    source = %conn.source().name(),
                    target = %conn.target().name(),
                    "created node connection"
                );
                Ok(conn)
            },
        )
    }
}

pub struct ResourceConnectionFactory {
    drivers: DriverSet,
    create_lock: Mutex<()>,
}

impl ResourceConnectionFactory {
    pub fn new(drivers: DriverSet) -> Self {
        Self {
            drivers,
            create_lock: Mutex::new(()),
        }
    }

    pub fn get(
        &self,
        ctx: &AccessContext,
        rsc_a: &Arc<Resource>,
        rsc_b: &Arc<Resource>,
        create_if_not_exists: bool,
        fail_if_exists: bool,
    ) -> ControllerResult<Option<Arc<ResourceConnection>>> {
        let (source_name, target_name) = ordered_node_names(
            rsc_a.node().name().clone(),
            rsc_b.node().name().clone(),
        )?;
        let _serial = self.create_lock.lock().unwrap();

        let existing = match rsc_a.resource_connection(ctx, rsc_b.node().name())? {
            Some(found) => Some(found),
            None => {
                let key = (source_name, target_name, rsc_a.definition().name().clone());
                self.drivers.resource_connection.load(&key)?
            }
        };

        resolve(
            "resource connection",
            existing,
            create_if_not_exists,
            fail_if_exists,
            || {
                let conn = ResourceConnection::new(
                    ctx,
                    Uuid::new_v4(),
                    Arc::clone(rsc_a),
                    Arc::clone(rsc_b),
                    Arc::clone(&self.drivers.resource_connection),
                )?;
                self.drivers.resource_connection.create(&conn)?;
                tracing::info!(
                    source = %conn.source().node().name(),
                    target = %conn.target().node().name(),
                    resource = %rsc_a.definition().name(),
                    "created resource connection"
                );
                Ok(conn)
            },
        )
    }
}

pub struct VolumeConnectionFactory {
    drivers: DriverSet,
    create_lock: Mutex<()>,
}

impl VolumeConnectionFactory {
    pub fn new(drivers: DriverSet) -> Self {
        Self {
            drivers,
            create_lock: Mutex::new(()),
        }
    }

    pub fn get(
        &self,
        ctx: &AccessContext,
        vlm_a: &Arc<Volume>,
        vlm_b: &Arc<Volume>,
        create_if_not_exists: bool,
        fail_if_exists: bool,
    ) -> ControllerResult<Option<Arc<VolumeConnection>>> {
        let (source_name, target_name) = ordered_node_names(
            vlm_a.resource().node().name().clone(),
            vlm_b.resource().node().name().clone(),
        )?;
        let _serial = self.create_lock.lock().unwrap();

        let existing = match vlm_a.volume_connection(ctx, vlm_b.resource().node().name())? {
            Some(found) => Some(found),
            None => {
                let key = (
                    source_name,
                    target_name,
                    vlm_a.resource().definition().name().clone(),
                    vlm_a.volume_number(),
                );
                self.drivers.volume_connection.load(&key)?
            }
        };

        resolve(
            "volume connection",
            existing,
            create_if_not_exists,
            fail_if_exists,
            || {
                let conn = VolumeConnection::new(
                    ctx,
                    Uuid::new_v4(),
                    Arc::clone(vlm_a),
                    Arc::clone(vlm_b),
                    Arc::clone(&self.drivers.volume_connection),
                )?;
                self.drivers.volume_connection.create(&conn)?;
                tracing::info!(
                    source = %conn.source().resource().node().name(),
                    target = %conn.target().resource().node().name(),
                    resource = %vlm_a.resource().definition().name(),
                    volume_number = vlm_a.volume_number().value(),
                    "created volume connection"
                );
                Ok(conn)
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry::access::{ObjectProtection, Role};
    use quarry::identifier::NodeName;
    use quarry::objects::NodeType;
    use quarry::testing::in_memory_drivers;
    use std::str::FromStr;

    fn node(name: &str, ctx: &AccessContext, drivers: &DriverSet) -> Arc<Node> {
        Node::new(
            Uuid::new_v4(),
            ObjectProtection::new(ctx),
            NodeName::from_str(name).unwrap(),
            NodeType::Satellite,
            0,
            Arc::clone(&drivers.node),
        )
    }

    #[test]
    fn test_node_connection_orientation_independent() {
        let ctx = AccessContext::for_role(Role::new("admin"));
        let drivers = in_memory_drivers();
        let factory = NodeConnectionFactory::new(drivers.clone());
        let alpha = node("alpha", &ctx, &drivers);
        let bravo = node("bravo", &ctx, &drivers);

        let conn = factory
            .get(&ctx, &bravo, &alpha, true, false)
            .unwrap()
            .unwrap();
        // stored with the smaller node name as source
        assert_eq!("alpha", conn.source().name().as_str());

        // the reversed argument order resolves to the same object
        let again = factory
            .get(&ctx, &alpha, &bravo, true, false)
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&conn, &again));
    }

    #[test]
    fn test_self_connection_rejected() {
        let ctx = AccessContext::for_role(Role::new("admin"));
        let drivers = in_memory_drivers();
        let factory = NodeConnectionFactory::new(drivers.clone());
        let alpha = node("alpha", &ctx, &drivers);

        factory.get(&ctx, &alpha, &alpha, true, false).unwrap_err();
    }
}
