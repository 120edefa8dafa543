//! Storage pool definition and storage pool factories.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use quarry::access::{AccessContext, AccessType, ObjectProtection};
use quarry::db::DriverSet;
use quarry::identifier::StorPoolName;
use quarry::objects::{Node, StorPool, StorPoolDefinition, DISKLESS_STOR_POOL_NAME};

use crate::error::ControllerResult;
use crate::repos::CoreRepos;

use super::resolve;

pub struct StorPoolDefinitionFactory {
    repos: Arc<CoreRepos>,
    drivers: DriverSet,
}

impl StorPoolDefinitionFactory {
    pub fn new(repos: Arc<CoreRepos>, drivers: DriverSet) -> Self {
        Self { repos, drivers }
    }

    pub fn get(
        &self,
        ctx: &AccessContext,
        name: StorPoolName,
        create_if_not_exists: bool,
        fail_if_exists: bool,
    ) -> ControllerResult<Option<Arc<StorPoolDefinition>>> {
        let mut definitions = self.repos.stor_pool_definitions.write(ctx)?;

        let existing = match definitions.get(&name) {
            Some(found) => Some(Arc::clone(found)),
            None => {
                let loaded = self.drivers.stor_pool_definition.load(&name)?;
                if let Some(loaded) = &loaded {
                    definitions.insert(name.clone(), Arc::clone(loaded));
                }
                loaded
            }
        };

        resolve(
            "storage pool definition",
            existing,
            create_if_not_exists,
            fail_if_exists,
            || {
                let dfn = StorPoolDefinition::new(
                    Uuid::new_v4(),
                    ObjectProtection::new(ctx),
                    name.clone(),
                    Arc::clone(&self.drivers.stor_pool_definition),
                );
                self.drivers.stor_pool_definition.create(&dfn)?;
                definitions.insert(name.clone(), Arc::clone(&dfn));
                tracing::info!(stor_pool = %name, "created storage pool definition");
                Ok(dfn)
            },
        )
    }

    /// Bootstraps the reserved diskless definition. Idempotent; called
    /// once on controller startup.
    pub fn ensure_diskless_default(&self, ctx: &AccessContext) -> ControllerResult<()> {
        let name = StorPoolName::from_str(DISKLESS_STOR_POOL_NAME)?;
        self.get(ctx, name, true, false)?;
        Ok(())
    }
}

pub struct StorPoolFactory {
    drivers: DriverSet,
    create_lock: Mutex<()>,
}

impl StorPoolFactory {
    pub fn new(drivers: DriverSet) -> Self {
        Self {
            drivers,
            create_lock: Mutex::new(()),
        }
    }

    /// A new pool is registered with both its definition and its node.
    pub fn get(
        &self,
        ctx: &AccessContext,
        node: &Arc<Node>,
        definition: &Arc<StorPoolDefinition>,
        driver_name: String,
        create_if_not_exists: bool,
        fail_if_exists: bool,
    ) -> ControllerResult<Option<Arc<StorPool>>> {
        node.obj_prot().require_access(ctx, AccessType::Change)?;
        definition
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        let _serial = self.create_lock.lock().unwrap();

        let existing = match definition.stor_pool(ctx, node.name())? {
            Some(found) => Some(found),
            None => {
                let key = (node.name().clone(), definition.name().clone());
                let loaded = self.drivers.stor_pool.load(&key)?;
                if let Some(loaded) = &loaded {
                    definition.add_stor_pool(ctx, Arc::clone(loaded))?;
                    node.add_stor_pool(ctx, Arc::clone(loaded))?;
                }
                loaded
            }
        };

        resolve(
            "storage pool",
            existing,
            create_if_not_exists,
            fail_if_exists,
            || {
                let pool = StorPool::new(
                    Uuid::new_v4(),
                    Arc::clone(node),
                    Arc::clone(definition),
                    driver_name,
                    Arc::clone(&self.drivers.stor_pool),
                );
                self.drivers.stor_pool.create(&pool)?;
                definition.add_stor_pool(ctx, Arc::clone(&pool))?;
                node.add_stor_pool(ctx, Arc::clone(&pool))?;
                tracing::info!(
                    node = %node.name(),
                    stor_pool = %definition.name(),
                    "created storage pool"
                );
                Ok(pool)
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry::access::Role;
    use quarry::identifier::NodeName;
    use quarry::objects::NodeType;
    use quarry::testing::in_memory_drivers;

    #[test]
    fn test_diskless_default_bootstrap_is_idempotent() {
        let ctx = AccessContext::for_role(Role::new("admin"));
        let repos = Arc::new(CoreRepos::new(&ctx));
        let factory = StorPoolDefinitionFactory::new(Arc::clone(&repos), in_memory_drivers());

        factory.ensure_diskless_default(&ctx).unwrap();
        factory.ensure_diskless_default(&ctx).unwrap();

        assert_eq!(1, repos.stor_pool_definitions.len());
        let dfn = repos
            .stor_pool_definitions
            .get(&ctx, &StorPoolName::from_str(DISKLESS_STOR_POOL_NAME).unwrap())
            .unwrap()
            .unwrap();
        assert!(dfn.is_diskless_default());
    }

    #[test]
    fn test_pool_registered_on_both_sides() {
        let ctx = AccessContext::for_role(Role::new("admin"));
        let repos = Arc::new(CoreRepos::new(&ctx));
        let drivers = in_memory_drivers();
        let dfn_factory = StorPoolDefinitionFactory::new(Arc::clone(&repos), drivers.clone());
        let factory = StorPoolFactory::new(drivers.clone());

        let dfn = dfn_factory
            .get(&ctx, StorPoolName::from_str("thinpool").unwrap(), true, false)
            .unwrap()
            .unwrap();
        let node = Node::new(
            Uuid::new_v4(),
            ObjectProtection::new(&ctx),
            NodeName::from_str("alpha").unwrap(),
            NodeType::Satellite,
            0,
            Arc::clone(&drivers.node),
        );

        let pool = factory
            .get(&ctx, &node, &dfn, "zfs".to_owned(), true, false)
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(
            &pool,
            &node.stor_pool(&ctx, dfn.name()).unwrap().unwrap()
        ));
        assert!(Arc::ptr_eq(
            &pool,
            &dfn.stor_pool(&ctx, node.name()).unwrap().unwrap()
        ));

        // one pool per (node, definition)
        let again = factory
            .get(&ctx, &node, &dfn, "zfs".to_owned(), true, false)
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&pool, &again));
    }
}
