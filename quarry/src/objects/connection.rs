//! Symmetric pairwise relations.
//!
//! A connection between two like entities is undirected in meaning but
//! stored in exactly one orientation: the endpoint whose owning node
//! name is lexicographically smaller (display form, case-sensitive)
//! becomes the source. Both construction paths and both lookup
//! directions apply the same rule, so one pair always resolves to one
//! stored object. A connection is jointly referenced from both
//! endpoints and owned by neither; deletion detaches both sides.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::access::{AccessContext, AccessType};
use crate::db::DriverRef;
use crate::error::{QuarryError, QuarryResult};
use crate::identifier::{NodeName, ResourceName, VolumeNumber};
use crate::props::{secure_props, PropsContainer};
use crate::transaction::TransactionObject;

use super::{Node, Resource, Volume};

/// Canonically orders a pair of node names. Equal names (two handles to
/// one node) are a programming error.
pub fn ordered_node_names(a: NodeName, b: NodeName) -> QuarryResult<(NodeName, NodeName)> {
    if a == b {
        return Err(QuarryError::implementation_error(
            "connection endpoints must be two different nodes",
        ));
    }
    match a.as_str().cmp(b.as_str()) {
        CmpOrdering::Greater => Ok((b, a)),
        _ => Ok((a, b)),
    }
}

fn order_by<T>(a: T, b: T, node_name: impl Fn(&T) -> NodeName) -> QuarryResult<(T, T)> {
    let name_a = node_name(&a);
    let name_b = node_name(&b);
    let (first, _) = ordered_node_names(name_a.clone(), name_b)?;
    if first == name_a {
        Ok((a, b))
    } else {
        Ok((b, a))
    }
}

/// A relation between two nodes.
pub struct NodeConnection {
    uuid: Uuid,
    dbg_instance_id: Uuid,
    source: Arc<Node>,
    target: Arc<Node>,
    props: Arc<PropsContainer>,
    driver: DriverRef<(NodeName, NodeName), NodeConnection>,
    deleted: AtomicBool,
}

impl std::fmt::Debug for NodeConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConnection")
            .field("uuid", &self.uuid)
            .finish_non_exhaustive()
    }
}

impl NodeConnection {
    /// Requires `Change` on both nodes. The new connection is registered
    /// with both endpoints.
    pub fn new(
        ctx: &AccessContext,
        uuid: Uuid,
        node_a: Arc<Node>,
        node_b: Arc<Node>,
        driver: DriverRef<(NodeName, NodeName), NodeConnection>,
    ) -> QuarryResult<Arc<Self>> {
        node_a.obj_prot().require_access(ctx, AccessType::Change)?;
        node_b.obj_prot().require_access(ctx, AccessType::Change)?;
        let (source, target) = order_by(node_a, node_b, |node| node.name().clone())?;
        let conn = Arc::new(Self {
            uuid,
            dbg_instance_id: Uuid::new_v4(),
            source: Arc::clone(&source),
            target: Arc::clone(&target),
            props: PropsContainer::new(),
            driver,
            deleted: AtomicBool::new(false),
        });
        source.set_node_connection(target.name().clone(), Arc::clone(&conn));
        target.set_node_connection(source.name().clone(), Arc::clone(&conn));
        Ok(conn)
    }

    fn check_deleted(&self) {
        if self.deleted.load(Ordering::Acquire) {
            panic!("access to a deleted node connection");
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.check_deleted();
        self.uuid
    }

    pub fn dbg_instance_id(&self) -> Uuid {
        self.dbg_instance_id
    }

    pub fn source(&self) -> &Arc<Node> {
        self.check_deleted();
        &self.source
    }

    pub fn target(&self) -> &Arc<Node> {
        self.check_deleted();
        &self.target
    }

    pub fn key(&self) -> (NodeName, NodeName) {
        (self.source.name().clone(), self.target.name().clone())
    }

    pub fn props(&self, ctx: &AccessContext) -> QuarryResult<&Arc<PropsContainer>> {
        self.check_deleted();
        self.source.obj_prot().require_access(ctx, AccessType::View)?;
        secure_props(ctx, self.target.obj_prot(), &self.props)
    }

    /// Detaches from both endpoints, removes the persisted record,
    /// poisons the instance.
    pub fn delete(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.source
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        self.target
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        self.source.clear_node_connection(self.target.name());
        self.target.clear_node_connection(self.source.name());
        self.driver.delete(self)?;
        self.deleted.store(true, Ordering::Release);
        Ok(())
    }
}

impl TransactionObject for NodeConnection {
    fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
        vec![
            Arc::clone(&self.source) as Arc<dyn TransactionObject>,
            Arc::clone(&self.target) as Arc<dyn TransactionObject>,
            Arc::clone(&self.props) as Arc<dyn TransactionObject>,
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

/// A relation between the two deployments of one resource definition.
pub struct ResourceConnection {
    uuid: Uuid,
    dbg_instance_id: Uuid,
    source: Arc<Resource>,
    target: Arc<Resource>,
    props: Arc<PropsContainer>,
    driver: DriverRef<(NodeName, NodeName, ResourceName), ResourceConnection>,
    deleted: AtomicBool,
}

impl ResourceConnection {
    /// Requires `Change` on both resources; both must belong to the same
    /// resource definition.
    pub fn new(
        ctx: &AccessContext,
        uuid: Uuid,
        rsc_a: Arc<Resource>,
        rsc_b: Arc<Resource>,
        driver: DriverRef<(NodeName, NodeName, ResourceName), ResourceConnection>,
    ) -> QuarryResult<Arc<Self>> {
        if !Arc::ptr_eq(rsc_a.definition(), rsc_b.definition()) {
            return Err(QuarryError::implementation_error(
                "resource connection endpoints belong to different resource definitions",
            ));
        }
        rsc_a.obj_prot().require_access(ctx, AccessType::Change)?;
        rsc_b.obj_prot().require_access(ctx, AccessType::Change)?;
        let (source, target) = order_by(rsc_a, rsc_b, |rsc| rsc.node().name().clone())?;
        let conn = Arc::new(Self {
            uuid,
            dbg_instance_id: Uuid::new_v4(),
            source: Arc::clone(&source),
            target: Arc::clone(&target),
            props: PropsContainer::new(),
            driver,
            deleted: AtomicBool::new(false),
        });
        source.set_resource_connection(target.node().name().clone(), Arc::clone(&conn));
        target.set_resource_connection(source.node().name().clone(), Arc::clone(&conn));
        Ok(conn)
    }

    fn check_deleted(&self) {
        if self.deleted.load(Ordering::Acquire) {
            panic!("access to a deleted resource connection");
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.check_deleted();
        self.uuid
    }

    pub fn dbg_instance_id(&self) -> Uuid {
        self.dbg_instance_id
    }

    pub fn source(&self) -> &Arc<Resource> {
        self.check_deleted();
        &self.source
    }

    pub fn target(&self) -> &Arc<Resource> {
        self.check_deleted();
        &self.target
    }

    pub fn key(&self) -> (NodeName, NodeName, ResourceName) {
        (
            self.source.node().name().clone(),
            self.target.node().name().clone(),
            self.source.definition().name().clone(),
        )
    }

    pub fn props(&self, ctx: &AccessContext) -> QuarryResult<&Arc<PropsContainer>> {
        self.check_deleted();
        self.source
            .obj_prot()
            .require_access(ctx, AccessType::View)?;
        secure_props(ctx, self.target.obj_prot(), &self.props)
    }

    pub fn delete(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.source
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        self.target
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        self.source
            .clear_resource_connection(self.target.node().name());
        self.target
            .clear_resource_connection(self.source.node().name());
        self.driver.delete(self)?;
        self.deleted.store(true, Ordering::Release);
        Ok(())
    }
}

impl TransactionObject for ResourceConnection {
    fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
        vec![
            Arc::clone(&self.source) as Arc<dyn TransactionObject>,
            Arc::clone(&self.target) as Arc<dyn TransactionObject>,
            Arc::clone(&self.props) as Arc<dyn TransactionObject>,
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

/// A relation between the two replicas of one volume.
///
/// Orientation tie-breaks on the node name of each volume's resource
/// assignment, not on the volume's own identity.
pub struct VolumeConnection {
    uuid: Uuid,
    dbg_instance_id: Uuid,
    source: Arc<Volume>,
    target: Arc<Volume>,
    props: Arc<PropsContainer>,
    driver: DriverRef<(NodeName, NodeName, ResourceName, VolumeNumber), VolumeConnection>,
    deleted: AtomicBool,
}

impl VolumeConnection {
    /// Requires `Change` on both owning resources; both volumes must
    /// belong to the same volume definition.
    pub fn new(
        ctx: &AccessContext,
        uuid: Uuid,
        vlm_a: Arc<Volume>,
        vlm_b: Arc<Volume>,
        driver: DriverRef<(NodeName, NodeName, ResourceName, VolumeNumber), VolumeConnection>,
    ) -> QuarryResult<Arc<Self>> {
        if !Arc::ptr_eq(vlm_a.volume_definition(), vlm_b.volume_definition()) {
            return Err(QuarryError::implementation_error(
                "volume connection endpoints belong to different volume definitions",
            ));
        }
        vlm_a
            .resource()
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        vlm_b
            .resource()
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        let (source, target) =
            order_by(vlm_a, vlm_b, |vlm| vlm.resource().node().name().clone())?;
        let conn = Arc::new(Self {
            uuid,
            dbg_instance_id: Uuid::new_v4(),
            source: Arc::clone(&source),
            target: Arc::clone(&target),
            props: PropsContainer::new(),
            driver,
            deleted: AtomicBool::new(false),
        });
        source.set_volume_connection(target.resource().node().name().clone(), Arc::clone(&conn));
        target.set_volume_connection(source.resource().node().name().clone(), Arc::clone(&conn));
        Ok(conn)
    }

    fn check_deleted(&self) {
        if self.deleted.load(Ordering::Acquire) {
            panic!("access to a deleted volume connection");
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.check_deleted();
        self.uuid
    }

    pub fn dbg_instance_id(&self) -> Uuid {
        self.dbg_instance_id
    }

    pub fn source(&self) -> &Arc<Volume> {
        self.check_deleted();
        &self.source
    }

    pub fn target(&self) -> &Arc<Volume> {
        self.check_deleted();
        &self.target
    }

    pub fn key(&self) -> (NodeName, NodeName, ResourceName, VolumeNumber) {
        (
            self.source.resource().node().name().clone(),
            self.target.resource().node().name().clone(),
            self.source.resource().definition().name().clone(),
            self.source.volume_number(),
        )
    }

    pub fn props(&self, ctx: &AccessContext) -> QuarryResult<&Arc<PropsContainer>> {
        self.check_deleted();
        self.source
            .resource()
            .obj_prot()
            .require_access(ctx, AccessType::View)?;
        secure_props(ctx, self.target.resource().obj_prot(), &self.props)
    }

    pub fn delete(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.source
            .resource()
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        self.target
            .resource()
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        self.source
            .clear_volume_connection(self.target.resource().node().name());
        self.target
            .clear_volume_connection(self.source.resource().node().name());
        self.driver.delete(self)?;
        self.deleted.store(true, Ordering::Release);
        Ok(())
    }
}

impl TransactionObject for VolumeConnection {
    fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
        vec![
            Arc::clone(&self.source) as Arc<dyn TransactionObject>,
            Arc::clone(&self.target) as Arc<dyn TransactionObject>,
            Arc::clone(&self.props) as Arc<dyn TransactionObject>,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{ObjectProtection, Role};
    use crate::db::NoOpDriver;
    use crate::objects::NodeType;
    use crate::transaction::{TransactionMgr, TransactionObject};
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
    fn test_ordered_node_names() {
        let alpha = NodeName::from_str("alpha").unwrap();
        let bravo = NodeName::from_str("bravo").unwrap();

        let (src, tgt) = ordered_node_names(bravo.clone(), alpha.clone()).unwrap();
        assert_eq!("alpha", src.as_str());
        assert_eq!("bravo", tgt.as_str());

        let (src, tgt) = ordered_node_names(alpha.clone(), bravo).unwrap();
        assert_eq!("alpha", src.as_str());
        assert_eq!("bravo", tgt.as_str());

        // two handles to one node, spelled differently
        let upper = NodeName::from_str("ALPHA").unwrap();
        ordered_node_names(alpha, upper).unwrap_err();
    }

    #[test]
    fn test_node_connection_orientation() {
        let ctx = AccessContext::for_role(Role::new("admin"));
        let alpha = node("alpha", &ctx);
        let bravo = node("bravo", &ctx);

        // constructed in reverse order, stored canonically
        let conn = NodeConnection::new(
            &ctx,
            Uuid::new_v4(),
            Arc::clone(&bravo),
            Arc::clone(&alpha),
            Arc::new(NoOpDriver),
        )
        .unwrap();

        assert_eq!("alpha", conn.source().name().as_str());
        assert_eq!("bravo", conn.target().name().as_str());

        // both endpoints resolve the same stored object
        let from_alpha = alpha.node_connection(&ctx, bravo.name()).unwrap().unwrap();
        let from_bravo = bravo.node_connection(&ctx, alpha.name()).unwrap().unwrap();
        assert!(Arc::ptr_eq(&from_alpha, &from_bravo));
        assert!(Arc::ptr_eq(&from_alpha, &conn));
    }

    #[test]
    fn test_self_connection_rejected() {
        let ctx = AccessContext::for_role(Role::new("admin"));
        let alpha = node("alpha", &ctx);
        NodeConnection::new(
            &ctx,
            Uuid::new_v4(),
            Arc::clone(&alpha),
            Arc::clone(&alpha),
            Arc::new(NoOpDriver),
        )
        .unwrap_err();
    }

    #[test]
    fn test_delete_detaches_both_sides() {
        let ctx = AccessContext::for_role(Role::new("admin"));
        let alpha = node("alpha", &ctx);
        let bravo = node("bravo", &ctx);
        let conn = NodeConnection::new(
            &ctx,
            Uuid::new_v4(),
            Arc::clone(&alpha),
            Arc::clone(&bravo),
            Arc::new(NoOpDriver),
        )
        .unwrap();

        conn.delete(&ctx).unwrap();
        assert!(alpha.node_connection(&ctx, bravo.name()).unwrap().is_none());
        assert!(bravo.node_connection(&ctx, alpha.name()).unwrap().is_none());
    }

    #[test]
    fn test_registration_through_cyclic_graph_terminates() {
        let ctx = AccessContext::for_role(Role::new("admin"));
        let alpha = node("alpha", &ctx);
        let bravo = node("bravo", &ctx);
        NodeConnection::new(
            &ctx,
            Uuid::new_v4(),
            Arc::clone(&alpha),
            Arc::clone(&bravo),
            Arc::new(NoOpDriver),
        )
        .unwrap();

        // node -> connection -> peer node -> connection -> ... must end
        let mgr = TransactionMgr::new();
        mgr.register(alpha as Arc<dyn TransactionObject>);
        assert!(mgr.registered_count() > 0);
    }
}
