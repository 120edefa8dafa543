//! Storage pool mirrors, including the dummy placeholder path.

use std::str::FromStr;
use std::sync::Arc;

use uuid::Uuid;

use quarry::access::{AccessContext, ObjectProtection};
use quarry::db::DriverSet;
use quarry::error::QuarryResult;
use quarry::identifier::StorPoolName;
use quarry::objects::{Node, StorPool, StorPoolDefinition, DISKLESS_STOR_POOL_NAME};

use crate::repos::SatelliteRepos;

use super::check_uuid;

pub struct StorPoolDefinitionMirror {
    repos: Arc<SatelliteRepos>,
    drivers: DriverSet,
}

impl StorPoolDefinitionMirror {
    pub fn new(repos: Arc<SatelliteRepos>, drivers: DriverSet) -> Self {
        Self { repos, drivers }
    }

    pub fn get_instance(
        &self,
        ctx: &AccessContext,
        uuid: Uuid,
        name: StorPoolName,
    ) -> QuarryResult<Arc<StorPoolDefinition>> {
        let mut definitions = self.repos.stor_pool_definitions.write(ctx)?;
        if let Some(found) = definitions.get(&name) {
            check_uuid("storage pool definition", uuid, found.uuid())?;
            return Ok(Arc::clone(found));
        }
        let dfn = StorPoolDefinition::new(
            uuid,
            ObjectProtection::new(ctx),
            name.clone(),
            Arc::clone(&self.drivers.stor_pool_definition),
        );
        definitions.insert(name.clone(), Arc::clone(&dfn));
        tracing::debug!(stor_pool = %name, "mirrored storage pool definition");
        Ok(dfn)
    }

    /// The diskless definition a dummy pool hangs off before the
    /// controller's full sync has arrived.
    pub fn ensure_diskless_default(
        &self,
        ctx: &AccessContext,
        uuid: Uuid,
    ) -> QuarryResult<Arc<StorPoolDefinition>> {
        let name = StorPoolName::from_str(DISKLESS_STOR_POOL_NAME)?;
        self.get_instance(ctx, uuid, name)
    }
}

pub struct StorPoolMirror {
    drivers: DriverSet,
}

impl StorPoolMirror {
    pub fn new(drivers: DriverSet) -> Self {
        Self { drivers }
    }

    pub fn get_instance(
        &self,
        ctx: &AccessContext,
        uuid: Uuid,
        node: &Arc<Node>,
        definition: &Arc<StorPoolDefinition>,
        driver_name: String,
    ) -> QuarryResult<Arc<StorPool>> {
        if let Some(found) = definition.stor_pool(ctx, node.name())? {
            check_uuid("storage pool", uuid, found.uuid())?;
            return Ok(found);
        }
        let pool = StorPool::new(
            uuid,
            Arc::clone(node),
            Arc::clone(definition),
            driver_name,
            Arc::clone(&self.drivers.stor_pool),
        );
        definition.add_stor_pool(ctx, Arc::clone(&pool))?;
        node.add_stor_pool(ctx, Arc::clone(&pool))?;
        Ok(pool)
    }

    /// Stands in for a peer node's pool whose backing data this
    /// satellite never receives. Registered like a real pool so lookups
    /// resolve, but any data-bearing call on it fails.
    pub fn get_dummy_instance(
        &self,
        ctx: &AccessContext,
        node: &Arc<Node>,
        definition: &Arc<StorPoolDefinition>,
    ) -> QuarryResult<Arc<StorPool>> {
        if let Some(found) = definition.stor_pool(ctx, node.name())? {
            return Ok(found);
        }
        let pool = StorPool::new_dummy(Arc::clone(node), Arc::clone(definition));
        definition.add_stor_pool(ctx, Arc::clone(&pool))?;
        node.add_stor_pool(ctx, Arc::clone(&pool))?;
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::NodeMirror;
    use quarry::identifier::NodeName;
    use quarry::objects::NodeType;

    #[test]
    fn test_dummy_pool_resolves_but_rejects_data() {
        let ctx = AccessContext::system();
        let repos = Arc::new(SatelliteRepos::new(&ctx));
        let drivers = DriverSet::no_op();
        let node = NodeMirror::new(Arc::clone(&repos), drivers.clone())
            .get_instance(
                &ctx,
                Uuid::new_v4(),
                NodeName::from_str("peer").unwrap(),
                NodeType::Satellite,
                0,
            )
            .unwrap();
        let dfn = StorPoolDefinitionMirror::new(Arc::clone(&repos), drivers.clone())
            .ensure_diskless_default(&ctx, Uuid::new_v4())
            .unwrap();

        let mirror = StorPoolMirror::new(drivers);
        let dummy = mirror.get_dummy_instance(&ctx, &node, &dfn).unwrap();
        assert!(dummy.is_dummy());
        assert!(Arc::ptr_eq(
            &dummy,
            &node.stor_pool(&ctx, dfn.name()).unwrap().unwrap()
        ));
        // idempotent
        let again = mirror.get_dummy_instance(&ctx, &node, &dfn).unwrap();
        assert!(Arc::ptr_eq(&dummy, &again));

        dummy.volumes(&ctx).unwrap_err();
        // property access stays usable before the real data arrives
        dummy.props(&ctx).unwrap();
    }
}
