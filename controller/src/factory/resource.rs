//! Resource definition, resource, volume definition and volume factories.
//!
//! The definition factories also own the pooled numeric allocations:
//! replication TCP ports on the resource definition, device minor
//! numbers on the volume definition. A number is drawn only after the
//! existence check succeeded and is returned to the pool when a later
//! step of the same creation fails.

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use quarry::access::{AccessContext, AccessType, ObjectProtection};
use quarry::db::DriverSet;
use quarry::error::QuarryError;
use quarry::flags::{mask_of, RscDfnFlags, RscFlags, VlmDfnFlags, VlmFlags};
use quarry::identifier::{MinorNumber, ResourceName, TcpPortNumber, VolumeNumber};
use quarry::objects::{
    Node, Resource, ResourceDefinition, StorPool, TransportType, Volume, VolumeDefinition,
};
use quarry::pool::NumberPool;

use crate::error::ControllerResult;
use crate::repos::CoreRepos;

use super::resolve;

pub struct ResourceDefinitionFactory {
    repos: Arc<CoreRepos>,
    drivers: DriverSet,
    tcp_port_pool: Arc<dyn NumberPool>,
}

impl ResourceDefinitionFactory {
    pub fn new(
        repos: Arc<CoreRepos>,
        drivers: DriverSet,
        tcp_port_pool: Arc<dyn NumberPool>,
    ) -> Self {
        Self {
            repos,
            drivers,
            tcp_port_pool,
        }
    }

    /// `port: None` draws the next free replication port from the pool;
    /// an explicit port that is already taken fails with `ValueInUse`.
    #[allow(clippy::too_many_arguments)]
    pub fn get(
        &self,
        ctx: &AccessContext,
        name: ResourceName,
        port: Option<TcpPortNumber>,
        secret: String,
        transport_type: TransportType,
        flags: &[RscDfnFlags],
        create_if_not_exists: bool,
        fail_if_exists: bool,
    ) -> ControllerResult<Option<Arc<ResourceDefinition>>> {
        let mut definitions = self.repos.resource_definitions.write(ctx)?;

        let existing = match definitions.get(&name) {
            Some(found) => Some(Arc::clone(found)),
            None => {
                let loaded = self.drivers.resource_definition.load(&name)?;
                if let Some(loaded) = &loaded {
                    definitions.insert(name.clone(), Arc::clone(loaded));
                }
                loaded
            }
        };

        resolve(
            "resource definition",
            existing,
            create_if_not_exists,
            fail_if_exists,
            || {
                let port = match port {
                    Some(port) => {
                        self.tcp_port_pool.allocate(u32::from(port.value()))?;
                        port
                    }
                    None => {
                        let nr = self.tcp_port_pool.auto_allocate()?;
                        match TcpPortNumber::new(nr as u16) {
                            Ok(port) => port,
                            Err(err) => {
                                self.tcp_port_pool.deallocate(nr);
                                return Err(err.into());
                            }
                        }
                    }
                };
                let dfn = ResourceDefinition::new(
                    Uuid::new_v4(),
                    ObjectProtection::new(ctx),
                    name.clone(),
                    port,
                    secret,
                    transport_type,
                    mask_of(flags),
                    Arc::clone(&self.drivers.resource_definition),
                );
                if let Err(err) = self.drivers.resource_definition.create(&dfn) {
                    self.tcp_port_pool.deallocate(u32::from(port.value()));
                    return Err(err.into());
                }
                definitions.insert(name.clone(), Arc::clone(&dfn));
                tracing::info!(resource = %name, port = port.value(), "created resource definition");
                Ok(dfn)
            },
        )
    }
}

pub struct ResourceFactory {
    drivers: DriverSet,
    create_lock: Mutex<()>,
}

impl ResourceFactory {
    pub fn new(drivers: DriverSet) -> Self {
        Self {
            drivers,
            create_lock: Mutex::new(()),
        }
    }

    /// A new resource is registered with both its definition and its
    /// node; both registrations require `Use`.
    #[allow(clippy::too_many_arguments)]
    pub fn get(
        &self,
        ctx: &AccessContext,
        node: &Arc<Node>,
        definition: &Arc<ResourceDefinition>,
        flags: &[RscFlags],
        create_if_not_exists: bool,
        fail_if_exists: bool,
    ) -> ControllerResult<Option<Arc<Resource>>> {
        let _serial = self.create_lock.lock().unwrap();

        let existing = match definition.resource(ctx, node.name())? {
            Some(found) => Some(found),
            None => {
                let key = (node.name().clone(), definition.name().clone());
                let loaded = self.drivers.resource.load(&key)?;
                if let Some(loaded) = &loaded {
                    definition.add_resource(ctx, Arc::clone(loaded))?;
                    node.add_resource(ctx, Arc::clone(loaded))?;
                }
                loaded
            }
        };

        resolve(
            "resource",
            existing,
            create_if_not_exists,
            fail_if_exists,
            || {
                let rsc = Resource::new(
                    Uuid::new_v4(),
                    ObjectProtection::new(ctx),
                    Arc::clone(node),
                    Arc::clone(definition),
                    mask_of(flags),
                    Arc::clone(&self.drivers.resource),
                );
                self.drivers.resource.create(&rsc)?;
                definition.add_resource(ctx, Arc::clone(&rsc))?;
                node.add_resource(ctx, Arc::clone(&rsc))?;
                tracing::info!(
                    node = %node.name(),
                    resource = %definition.name(),
                    "created resource"
                );
                Ok(rsc)
            },
        )
    }
}

pub struct VolumeDefinitionFactory {
    drivers: DriverSet,
    minor_nr_pool: Arc<dyn NumberPool>,
    create_lock: Mutex<()>,
}

impl VolumeDefinitionFactory {
    pub fn new(drivers: DriverSet, minor_nr_pool: Arc<dyn NumberPool>) -> Self {
        Self {
            drivers,
            minor_nr_pool,
            create_lock: Mutex::new(()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn get(
        &self,
        ctx: &AccessContext,
        resource_definition: &Arc<ResourceDefinition>,
        volume_number: VolumeNumber,
        minor_number: Option<MinorNumber>,
        size_kib: u64,
        flags: &[VlmDfnFlags],
        create_if_not_exists: bool,
        fail_if_exists: bool,
    ) -> ControllerResult<Option<Arc<VolumeDefinition>>> {
        resource_definition
            .obj_prot()
            .require_access(ctx, AccessType::Use)?;
        let _serial = self.create_lock.lock().unwrap();

        let existing = match resource_definition.volume_definition(ctx, volume_number)? {
            Some(found) => Some(found),
            None => {
                let key = (resource_definition.name().clone(), volume_number);
                let loaded = self.drivers.volume_definition.load(&key)?;
                if let Some(loaded) = &loaded {
                    resource_definition.add_volume_definition(ctx, Arc::clone(loaded))?;
                }
                loaded
            }
        };

        resolve(
            "volume definition",
            existing,
            create_if_not_exists,
            fail_if_exists,
            || {
                let minor = match minor_number {
                    Some(minor) => {
                        self.minor_nr_pool.allocate(minor.value())?;
                        minor
                    }
                    None => {
                        let nr = self.minor_nr_pool.auto_allocate()?;
                        match MinorNumber::new(nr) {
                            Ok(minor) => minor,
                            Err(err) => {
                                self.minor_nr_pool.deallocate(nr);
                                return Err(err.into());
                            }
                        }
                    }
                };
                let vlm_dfn = match VolumeDefinition::new(
                    Uuid::new_v4(),
                    Arc::clone(resource_definition),
                    volume_number,
                    minor,
                    size_kib,
                    mask_of(flags),
                    Arc::clone(&self.drivers.volume_definition),
                ) {
                    Ok(vlm_dfn) => vlm_dfn,
                    Err(err) => {
                        self.minor_nr_pool.deallocate(minor.value());
                        return Err(err.into());
                    }
                };
                if let Err(err) = self.drivers.volume_definition.create(&vlm_dfn) {
                    self.minor_nr_pool.deallocate(minor.value());
                    return Err(err.into());
                }
                resource_definition.add_volume_definition(ctx, Arc::clone(&vlm_dfn))?;
                tracing::info!(
                    resource = %resource_definition.name(),
                    volume_number = volume_number.value(),
                    minor = minor.value(),
                    "created volume definition"
                );
                Ok(vlm_dfn)
            },
        )
    }
}

pub struct VolumeFactory {
    drivers: DriverSet,
    create_lock: Mutex<()>,
}

impl VolumeFactory {
    pub fn new(drivers: DriverSet) -> Self {
        Self {
            drivers,
            create_lock: Mutex::new(()),
        }
    }

    /// The volume definition must belong to the resource's definition and
    /// the storage pool must live on the resource's node; violating either
    /// is a programming error, not a user fault.
    #[allow(clippy::too_many_arguments)]
    pub fn get(
        &self,
        ctx: &AccessContext,
        resource: &Arc<Resource>,
        volume_definition: &Arc<VolumeDefinition>,
        stor_pool: &Arc<StorPool>,
        block_device_path: Option<String>,
        meta_disk_path: Option<String>,
        flags: &[VlmFlags],
        create_if_not_exists: bool,
        fail_if_exists: bool,
    ) -> ControllerResult<Option<Arc<Volume>>> {
        if !Arc::ptr_eq(volume_definition.resource_definition(), resource.definition()) {
            return Err(QuarryError::implementation_error(
                "volume definition does not belong to the resource's definition",
            )
            .into());
        }
        if !Arc::ptr_eq(stor_pool.node(), resource.node()) {
            return Err(QuarryError::implementation_error(
                "storage pool does not live on the resource's node",
            )
            .into());
        }
        resource.obj_prot().require_access(ctx, AccessType::Use)?;
        let _serial = self.create_lock.lock().unwrap();

        let existing = match resource.volume(ctx, volume_definition.volume_number())? {
            Some(found) => Some(found),
            None => {
                let (node_name, rsc_name) = resource.key();
                let key = (node_name, rsc_name, volume_definition.volume_number());
                let loaded = self.drivers.volume.load(&key)?;
                if let Some(loaded) = &loaded {
                    resource.add_volume(ctx, Arc::clone(loaded))?;
                    stor_pool.add_volume(ctx, Arc::clone(loaded))?;
                }
                loaded
            }
        };

        resolve(
            "volume",
            existing,
            create_if_not_exists,
            fail_if_exists,
            || {
                let vlm = Volume::new(
                    Uuid::new_v4(),
                    Arc::clone(resource),
                    Arc::clone(volume_definition),
                    Arc::clone(stor_pool),
                    block_device_path,
                    meta_disk_path,
                    mask_of(flags),
                    Arc::clone(&self.drivers.volume),
                );
                self.drivers.volume.create(&vlm)?;
                resource.add_volume(ctx, Arc::clone(&vlm))?;
                stor_pool.add_volume(ctx, Arc::clone(&vlm))?;
                tracing::info!(
                    node = %resource.node().name(),
                    resource = %resource.definition().name(),
                    volume_number = volume_definition.volume_number().value(),
                    "created volume"
                );
                Ok(vlm)
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControllerError;
    use quarry::access::Role;
    use quarry::flags::NodeFlags;
    use quarry::objects::NodeType;
    use quarry::pool::BitmapPool;
    use quarry::testing::in_memory_drivers;
    use std::str::FromStr;

    fn rsc_dfn_factory(
        ctx: &AccessContext,
    ) -> (Arc<CoreRepos>, Arc<BitmapPool>, ResourceDefinitionFactory) {
        let repos = Arc::new(CoreRepos::new(ctx));
        let pool = Arc::new(BitmapPool::new(7000, 7009));
        let factory = ResourceDefinitionFactory::new(
            Arc::clone(&repos),
            in_memory_drivers(),
            Arc::clone(&pool) as Arc<dyn NumberPool>,
        );
        (repos, pool, factory)
    }

    fn create_dfn(
        ctx: &AccessContext,
        factory: &ResourceDefinitionFactory,
        name: &str,
        port: Option<u16>,
    ) -> ControllerResult<Option<Arc<ResourceDefinition>>> {
        factory.get(
            ctx,
            ResourceName::from_str(name).unwrap(),
            port.map(|nr| TcpPortNumber::new(nr).unwrap()),
            "shared-secret".to_owned(),
            TransportType::Ip,
            &[],
            true,
            false,
        )
    }

    #[test]
    fn test_auto_port_allocation() {
        let ctx = AccessContext::for_role(Role::new("admin"));
        let (repos, pool, factory) = rsc_dfn_factory(&ctx);

        let dfn = create_dfn(&ctx, &factory, "res1", None).unwrap().unwrap();
        assert_eq!(7000, dfn.port(&ctx).unwrap().value());
        assert_eq!(1, pool.allocated_count());
        assert!(repos
            .resource_definitions
            .contains_key(&ctx, &ResourceName::from_str("res1").unwrap())
            .unwrap());
    }

    #[test]
    fn test_fail_if_exists_leaks_no_port() {
        let ctx = AccessContext::for_role(Role::new("admin"));
        let (_repos, pool, factory) = rsc_dfn_factory(&ctx);

        create_dfn(&ctx, &factory, "res1", None).unwrap();
        let err = factory
            .get(
                &ctx,
                ResourceName::from_str("res1").unwrap(),
                None,
                "other-secret".to_owned(),
                TransportType::Ip,
                &[],
                true,
                true,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ControllerError::CoreError(QuarryError::AlreadyExists { .. })
        ));
        // the rejected call must not have drawn a port
        assert_eq!(1, pool.allocated_count());
    }

    #[test]
    fn test_get_returns_same_instance() {
        let ctx = AccessContext::for_role(Role::new("admin"));
        let (_repos, pool, factory) = rsc_dfn_factory(&ctx);

        let first = create_dfn(&ctx, &factory, "res1", None).unwrap().unwrap();
        let second = create_dfn(&ctx, &factory, "res1", None).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(1, pool.allocated_count());
    }

    #[test]
    fn test_explicit_port_in_use() {
        let ctx = AccessContext::for_role(Role::new("admin"));
        let (repos, pool, factory) = rsc_dfn_factory(&ctx);

        create_dfn(&ctx, &factory, "res1", Some(7005)).unwrap();
        let err = create_dfn(&ctx, &factory, "res2", Some(7005)).unwrap_err();
        assert!(matches!(
            err,
            ControllerError::CoreError(QuarryError::ValueInUse(7005))
        ));
        // the failed creation registered nothing
        assert!(!repos
            .resource_definitions
            .contains_key(&ctx, &ResourceName::from_str("res2").unwrap())
            .unwrap());
        assert_eq!(1, pool.allocated_count());
    }

    #[test]
    fn test_volume_definition_zero_size_returns_minor() {
        let ctx = AccessContext::for_role(Role::new("admin"));
        let (_repos, _pool, dfn_factory) = rsc_dfn_factory(&ctx);
        let dfn = create_dfn(&ctx, &dfn_factory, "res1", None).unwrap().unwrap();

        let minor_pool = Arc::new(BitmapPool::new(1000, 1009));
        let factory = VolumeDefinitionFactory::new(
            in_memory_drivers(),
            Arc::clone(&minor_pool) as Arc<dyn NumberPool>,
        );

        factory
            .get(
                &ctx,
                &dfn,
                VolumeNumber::new(0).unwrap(),
                None,
                0,
                &[],
                true,
                false,
            )
            .unwrap_err();
        // the rejected size check returned the drawn minor number
        assert_eq!(0, minor_pool.allocated_count());

        let vlm_dfn = factory
            .get(
                &ctx,
                &dfn,
                VolumeNumber::new(0).unwrap(),
                None,
                1024 * 1024,
                &[],
                true,
                false,
            )
            .unwrap()
            .unwrap();
        assert_eq!(1000, vlm_dfn.minor_number(&ctx).unwrap().value());
        assert_eq!(1, minor_pool.allocated_count());
    }

    #[test]
    fn test_volume_registration() {
        let ctx = AccessContext::for_role(Role::new("admin"));
        let (_repos, _pool, dfn_factory) = rsc_dfn_factory(&ctx);
        let drivers = in_memory_drivers();

        let dfn = create_dfn(&ctx, &dfn_factory, "res1", None).unwrap().unwrap();
        let node = quarry::objects::Node::new(
            Uuid::new_v4(),
            ObjectProtection::new(&ctx),
            quarry::identifier::NodeName::from_str("alpha").unwrap(),
            NodeType::Satellite,
            mask_of::<NodeFlags>(&[]),
            Arc::clone(&drivers.node),
        );
        let pool_dfn = quarry::objects::StorPoolDefinition::new(
            Uuid::new_v4(),
            ObjectProtection::new(&ctx),
            quarry::identifier::StorPoolName::from_str("thinpool").unwrap(),
            Arc::clone(&drivers.stor_pool_definition),
        );
        let stor_pool = StorPool::new(
            Uuid::new_v4(),
            Arc::clone(&node),
            Arc::clone(&pool_dfn),
            "lvm-thin".to_owned(),
            Arc::clone(&drivers.stor_pool),
        );

        let rsc = ResourceFactory::new(drivers.clone())
            .get(&ctx, &node, &dfn, &[], true, false)
            .unwrap()
            .unwrap();
        let minor_pool = Arc::new(BitmapPool::new(1000, 1009));
        let vlm_dfn = VolumeDefinitionFactory::new(
            drivers.clone(),
            Arc::clone(&minor_pool) as Arc<dyn NumberPool>,
        )
        .get(
            &ctx,
            &dfn,
            VolumeNumber::new(0).unwrap(),
            None,
            4096,
            &[],
            true,
            false,
        )
        .unwrap()
        .unwrap();

        let vlm = VolumeFactory::new(drivers)
            .get(
                &ctx, &rsc, &vlm_dfn, &stor_pool, None, None, &[], true, false,
            )
            .unwrap()
            .unwrap();

        // registered with the resource and the storage pool
        assert!(Arc::ptr_eq(
            &vlm,
            &rsc.volume(&ctx, VolumeNumber::new(0).unwrap())
                .unwrap()
                .unwrap()
        ));
        assert_eq!(1, stor_pool.volumes(&ctx).unwrap().len());
    }
}
