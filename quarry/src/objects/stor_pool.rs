//! Storage pool definitions and per-node storage pools.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::access::{AccessContext, AccessType, ObjectProtection};
use crate::db::{DriverRef, NoOpDriver};
use crate::error::{QuarryError, QuarryResult};
use crate::identifier::{NodeName, ResourceName, StorPoolName, VolumeNumber};
use crate::props::{secure_props, PropsContainer};
use crate::transaction::{txmap, TransactionMap, TransactionObject};

use super::api::{StorPoolApi, StorPoolDefinitionApi};
use super::{Node, Volume};

/// The reserved diskless storage pool definition. Always present,
/// never deletable.
pub const DISKLESS_STOR_POOL_NAME: &str = "DfltDisklessStorPool";

/// The cluster-wide definition of a storage pool.
pub struct StorPoolDefinition {
    uuid: Uuid,
    dbg_instance_id: Uuid,
    obj_prot: Arc<ObjectProtection>,
    name: StorPoolName,
    props: Arc<PropsContainer>,
    stor_pools: Arc<TransactionMap<NodeName, Arc<StorPool>>>,
    driver: DriverRef<StorPoolName, StorPoolDefinition>,
    deleted: AtomicBool,
}

impl StorPoolDefinition {
    pub fn new(
        uuid: Uuid,
        obj_prot: Arc<ObjectProtection>,
        name: StorPoolName,
        driver: DriverRef<StorPoolName, StorPoolDefinition>,
    ) -> Arc<Self> {
        Arc::new(Self {
            uuid,
            dbg_instance_id: Uuid::new_v4(),
            obj_prot,
            name,
            props: PropsContainer::new(),
            stor_pools: txmap(),
            driver,
            deleted: AtomicBool::new(false),
        })
    }

    fn check_deleted(&self) {
        if self.deleted.load(Ordering::Acquire) {
            panic!("access to a deleted storage pool definition");
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.check_deleted();
        self.uuid
    }

    pub fn dbg_instance_id(&self) -> Uuid {
        self.dbg_instance_id
    }

    pub fn name(&self) -> &StorPoolName {
        self.check_deleted();
        &self.name
    }

    pub fn obj_prot(&self) -> &Arc<ObjectProtection> {
        &self.obj_prot
    }

    pub fn is_diskless_default(&self) -> bool {
        self.check_deleted();
        self.name.as_str().eq_ignore_ascii_case(DISKLESS_STOR_POOL_NAME)
    }

    pub fn props(&self, ctx: &AccessContext) -> QuarryResult<&Arc<PropsContainer>> {
        self.check_deleted();
        secure_props(ctx, &self.obj_prot, &self.props)
    }

    pub fn stor_pool(
        &self,
        ctx: &AccessContext,
        node_name: &NodeName,
    ) -> QuarryResult<Option<Arc<StorPool>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.stor_pools.get(node_name))
    }

    pub fn stor_pools(&self, ctx: &AccessContext) -> QuarryResult<Vec<Arc<StorPool>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.stor_pools.values())
    }

    pub fn add_stor_pool(&self, ctx: &AccessContext, pool: Arc<StorPool>) -> QuarryResult<()> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Change)?;
        self.stor_pools.insert(pool.node().name().clone(), pool);
        Ok(())
    }

    pub fn remove_stor_pool(
        &self,
        ctx: &AccessContext,
        node_name: &NodeName,
    ) -> QuarryResult<Option<Arc<StorPool>>> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::Change)?;
        Ok(self.stor_pools.remove(node_name))
    }

    pub fn delete(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        if self.is_diskless_default() {
            return Err(QuarryError::implementation_error(
                "the default diskless storage pool definition cannot be deleted",
            ));
        }
        self.obj_prot.require_access(ctx, AccessType::Control)?;
        self.driver.delete(self)?;
        self.deleted.store(true, Ordering::Release);
        Ok(())
    }

    pub fn api_data(&self, ctx: &AccessContext) -> QuarryResult<StorPoolDefinitionApi> {
        self.check_deleted();
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(StorPoolDefinitionApi {
            uuid: self.uuid.to_string(),
            name: self.name.as_str().to_owned(),
            props: self.props.entries(),
        })
    }
}

impl TransactionObject for StorPoolDefinition {
    fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
        let mut children: Vec<Arc<dyn TransactionObject>> = vec![
            Arc::clone(&self.obj_prot) as Arc<dyn TransactionObject>,
            Arc::clone(&self.props) as Arc<dyn TransactionObject>,
            Arc::clone(&self.stor_pools) as Arc<dyn TransactionObject>,
        ];
        children.extend(
            self.stor_pools
                .values()
                .into_iter()
                .map(|pool| pool as Arc<dyn TransactionObject>),
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

/// A storage pool of one node.
///
/// Exactly one pool exists per (node, definition). A *dummy* pool is the
/// satellite-side placeholder for a remote node's diskless pool: only
/// identity and property reads are legitimate before the real remote
/// data arrives, every data-bearing call is a programming error.
pub struct StorPool {
    uuid: Uuid,
    dbg_instance_id: Uuid,
    node: Arc<Node>,
    definition: Arc<StorPoolDefinition>,
    driver_name: String,
    props: Arc<PropsContainer>,
    volumes: Arc<TransactionMap<(ResourceName, VolumeNumber), Arc<Volume>>>,
    dummy: bool,
    driver: DriverRef<(NodeName, StorPoolName), StorPool>,
    deleted: AtomicBool,
}

impl StorPool {
    pub fn new(
        uuid: Uuid,
        node: Arc<Node>,
        definition: Arc<StorPoolDefinition>,
        driver_name: String,
        driver: DriverRef<(NodeName, StorPoolName), StorPool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            uuid,
            dbg_instance_id: Uuid::new_v4(),
            node,
            definition,
            driver_name,
            props: PropsContainer::new(),
            volumes: txmap(),
            dummy: false,
            driver,
            deleted: AtomicBool::new(false),
        })
    }

    /// The satellite-side placeholder for a peer's diskless pool.
    pub fn new_dummy(node: Arc<Node>, definition: Arc<StorPoolDefinition>) -> Arc<Self> {
        Arc::new(Self {
            uuid: Uuid::nil(),
            dbg_instance_id: Uuid::new_v4(),
            node,
            definition,
            driver_name: String::new(),
            props: PropsContainer::new(),
            volumes: txmap(),
            dummy: true,
            driver: Arc::new(NoOpDriver),
            deleted: AtomicBool::new(false),
        })
    }

    fn check_deleted(&self) {
        if self.deleted.load(Ordering::Acquire) {
            panic!("access to a deleted storage pool");
        }
    }

    fn ensure_real(&self) -> QuarryResult<()> {
        if self.dummy {
            return Err(QuarryError::implementation_error(
                "data access on a dummy storage pool placeholder",
            ));
        }
        Ok(())
    }

    pub fn uuid(&self) -> Uuid {
        self.check_deleted();
        self.uuid
    }

    pub fn dbg_instance_id(&self) -> Uuid {
        self.dbg_instance_id
    }

    pub fn is_dummy(&self) -> bool {
        self.dummy
    }

    pub fn node(&self) -> &Arc<Node> {
        self.check_deleted();
        &self.node
    }

    pub fn definition(&self) -> &Arc<StorPoolDefinition> {
        self.check_deleted();
        &self.definition
    }

    pub fn key(&self) -> (NodeName, StorPoolName) {
        (self.node.name().clone(), self.definition.name().clone())
    }

    pub fn driver_name(&self, ctx: &AccessContext) -> QuarryResult<String> {
        self.check_deleted();
        self.ensure_real()?;
        self.definition
            .obj_prot()
            .require_access(ctx, AccessType::View)?;
        Ok(self.driver_name.clone())
    }

    /// Property reads stay legitimate on a dummy pool.
    pub fn props(&self, ctx: &AccessContext) -> QuarryResult<&Arc<PropsContainer>> {
        self.check_deleted();
        secure_props(ctx, self.definition.obj_prot(), &self.props)
    }

    pub fn volumes(&self, ctx: &AccessContext) -> QuarryResult<Vec<Arc<Volume>>> {
        self.check_deleted();
        self.ensure_real()?;
        self.definition
            .obj_prot()
            .require_access(ctx, AccessType::View)?;
        Ok(self.volumes.values())
    }

    pub fn add_volume(&self, ctx: &AccessContext, vlm: Arc<Volume>) -> QuarryResult<()> {
        self.check_deleted();
        self.ensure_real()?;
        self.definition
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        self.volumes.insert(vlm.volume_definition().key(), vlm);
        Ok(())
    }

    pub fn remove_volume(&self, ctx: &AccessContext, vlm: &Volume) -> QuarryResult<()> {
        self.check_deleted();
        self.ensure_real()?;
        self.definition
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        self.volumes.remove(&vlm.volume_definition().key());
        Ok(())
    }

    /// Detaches the pool from its node and definition, removes the
    /// persisted record, poisons the instance.
    pub fn delete(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.ensure_real()?;
        self.definition
            .obj_prot()
            .require_access(ctx, AccessType::Control)?;
        self.node.remove_stor_pool(ctx, self.definition.name())?;
        self.definition.remove_stor_pool(ctx, self.node.name())?;
        self.driver.delete(self)?;
        self.deleted.store(true, Ordering::Release);
        Ok(())
    }

    pub fn api_data(&self, ctx: &AccessContext) -> QuarryResult<StorPoolApi> {
        self.check_deleted();
        self.ensure_real()?;
        self.definition
            .obj_prot()
            .require_access(ctx, AccessType::View)?;
        Ok(StorPoolApi {
            uuid: self.uuid.to_string(),
            node_name: self.node.name().as_str().to_owned(),
            stor_pool_name: self.definition.name().as_str().to_owned(),
            driver_name: self.driver_name.clone(),
            props: self.props.entries(),
        })
    }
}

impl TransactionObject for StorPool {
    fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
        let mut children: Vec<Arc<dyn TransactionObject>> = vec![
            Arc::clone(&self.node) as Arc<dyn TransactionObject>,
            Arc::clone(&self.definition) as Arc<dyn TransactionObject>,
            Arc::clone(&self.props) as Arc<dyn TransactionObject>,
            Arc::clone(&self.volumes) as Arc<dyn TransactionObject>,
        ];
        children.extend(
            self.volumes
                .values()
                .into_iter()
                .map(|vlm| vlm as Arc<dyn TransactionObject>),
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
    use crate::objects::NodeType;
    use std::str::FromStr;

    fn dummy_pool(ctx: &AccessContext) -> Arc<StorPool> {
        let node = Node::new(
            Uuid::new_v4(),
            ObjectProtection::new(ctx),
            NodeName::from_str("alpha").unwrap(),
            NodeType::Satellite,
            0,
            Arc::new(NoOpDriver),
        );
        let dfn = StorPoolDefinition::new(
            Uuid::new_v4(),
            ObjectProtection::new(ctx),
            StorPoolName::from_str(DISKLESS_STOR_POOL_NAME).unwrap(),
            Arc::new(NoOpDriver),
        );
        StorPool::new_dummy(node, dfn)
    }

    #[test]
    fn test_dummy_pool_rejects_data_access() {
        let ctx = AccessContext::for_role(Role::new("admin"));
        let pool = dummy_pool(&ctx);

        assert!(pool.is_dummy());
        pool.driver_name(&ctx).unwrap_err();
        pool.volumes(&ctx).unwrap_err();
        pool.api_data(&ctx).unwrap_err();
        pool.delete(&ctx).unwrap_err();

        // property reads stay available
        pool.props(&ctx).unwrap().set("note", "placeholder").unwrap();
        assert_eq!(
            Some("placeholder".to_owned()),
            pool.props(&ctx).unwrap().get("note")
        );
    }

    #[test]
    fn test_diskless_definition_not_deletable() {
        let ctx = AccessContext::for_role(Role::new("admin"));
        let dfn = StorPoolDefinition::new(
            Uuid::new_v4(),
            ObjectProtection::new(&ctx),
            StorPoolName::from_str(DISKLESS_STOR_POOL_NAME).unwrap(),
            Arc::new(NoOpDriver),
        );
        assert!(dfn.is_diskless_default());
        dfn.delete(&ctx).unwrap_err();
    }
}
