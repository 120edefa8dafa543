//! Resource family mirrors.
//!
//! Ports, minor numbers and sizes arrive as controller-decided values;
//! no pool is consulted on this side.

use std::sync::Arc;

use uuid::Uuid;

use quarry::access::{AccessContext, ObjectProtection};
use quarry::db::DriverSet;
use quarry::error::QuarryResult;
use quarry::identifier::{MinorNumber, ResourceName, TcpPortNumber, VolumeNumber};
use quarry::objects::{
    Node, Resource, ResourceDefinition, StorPool, TransportType, Volume, VolumeDefinition,
};

use crate::repos::SatelliteRepos;

use super::check_uuid;

pub struct ResourceDefinitionMirror {
    repos: Arc<SatelliteRepos>,
    drivers: DriverSet,
}

impl ResourceDefinitionMirror {
    pub fn new(repos: Arc<SatelliteRepos>, drivers: DriverSet) -> Self {
        Self { repos, drivers }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn get_instance(
        &self,
        ctx: &AccessContext,
        uuid: Uuid,
        name: ResourceName,
        port: TcpPortNumber,
        secret: String,
        transport_type: TransportType,
        initial_flags: u64,
    ) -> QuarryResult<Arc<ResourceDefinition>> {
        let mut definitions = self.repos.resource_definitions.write(ctx)?;
        if let Some(found) = definitions.get(&name) {
            check_uuid("resource definition", uuid, found.uuid())?;
            return Ok(Arc::clone(found));
        }
        let dfn = ResourceDefinition::new(
            uuid,
            ObjectProtection::new(ctx),
            name.clone(),
            port,
            secret,
            transport_type,
            initial_flags,
            Arc::clone(&self.drivers.resource_definition),
        );
        definitions.insert(name.clone(), Arc::clone(&dfn));
        tracing::debug!(resource = %name, "mirrored resource definition");
        Ok(dfn)
    }
}

pub struct ResourceMirror {
    drivers: DriverSet,
}

impl ResourceMirror {
    pub fn new(drivers: DriverSet) -> Self {
        Self { drivers }
    }

    pub fn get_instance(
        &self,
        ctx: &AccessContext,
        uuid: Uuid,
        node: &Arc<Node>,
        definition: &Arc<ResourceDefinition>,
        initial_flags: u64,
    ) -> QuarryResult<Arc<Resource>> {
        if let Some(found) = definition.resource(ctx, node.name())? {
            check_uuid("resource", uuid, found.uuid())?;
            return Ok(found);
        }
        let rsc = Resource::new(
            uuid,
            ObjectProtection::new(ctx),
            Arc::clone(node),
            Arc::clone(definition),
            initial_flags,
            Arc::clone(&self.drivers.resource),
        );
        definition.add_resource(ctx, Arc::clone(&rsc))?;
        node.add_resource(ctx, Arc::clone(&rsc))?;
        Ok(rsc)
    }
}

pub struct VolumeDefinitionMirror {
    drivers: DriverSet,
}

impl VolumeDefinitionMirror {
    pub fn new(drivers: DriverSet) -> Self {
        Self { drivers }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn get_instance(
        &self,
        ctx: &AccessContext,
        uuid: Uuid,
        resource_definition: &Arc<ResourceDefinition>,
        volume_number: VolumeNumber,
        minor_number: MinorNumber,
        size_kib: u64,
        initial_flags: u64,
    ) -> QuarryResult<Arc<VolumeDefinition>> {
        if let Some(found) = resource_definition.volume_definition(ctx, volume_number)? {
            check_uuid("volume definition", uuid, found.uuid())?;
            return Ok(found);
        }
        let vlm_dfn = VolumeDefinition::new(
            uuid,
            Arc::clone(resource_definition),
            volume_number,
            minor_number,
            size_kib,
            initial_flags,
            Arc::clone(&self.drivers.volume_definition),
        )?;
        resource_definition.add_volume_definition(ctx, Arc::clone(&vlm_dfn))?;
        Ok(vlm_dfn)
    }
}

pub struct VolumeMirror {
    drivers: DriverSet,
}

impl VolumeMirror {
    pub fn new(drivers: DriverSet) -> Self {
        Self { drivers }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn get_instance(
        &self,
        ctx: &AccessContext,
        uuid: Uuid,
        resource: &Arc<Resource>,
        volume_definition: &Arc<VolumeDefinition>,
        stor_pool: &Arc<StorPool>,
        block_device_path: Option<String>,
        meta_disk_path: Option<String>,
        initial_flags: u64,
    ) -> QuarryResult<Arc<Volume>> {
        if let Some(found) = resource.volume(ctx, volume_definition.volume_number())? {
            check_uuid("volume", uuid, found.uuid())?;
            return Ok(found);
        }
        let vlm = Volume::new(
            uuid,
            Arc::clone(resource),
            Arc::clone(volume_definition),
            Arc::clone(stor_pool),
            block_device_path,
            meta_disk_path,
            initial_flags,
            Arc::clone(&self.drivers.volume),
        );
        resource.add_volume(ctx, Arc::clone(&vlm))?;
        if !stor_pool.is_dummy() {
            stor_pool.add_volume(ctx, Arc::clone(&vlm))?;
        }
        Ok(vlm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry::identifier::NodeName;
    use quarry::objects::NodeType;
    use std::str::FromStr;

    struct Fixture {
        ctx: AccessContext,
        node: Arc<Node>,
        vlm_dfn: Arc<VolumeDefinition>,
        rsc: Arc<Resource>,
        stor_pool: Arc<StorPool>,
        volumes: VolumeMirror,
    }

    fn fixture() -> Fixture {
        let ctx = AccessContext::system();
        let repos = Arc::new(SatelliteRepos::new(&ctx));
        let drivers = DriverSet::no_op();

        let node = crate::mirror::NodeMirror::new(Arc::clone(&repos), drivers.clone())
            .get_instance(
                &ctx,
                Uuid::new_v4(),
                NodeName::from_str("alpha").unwrap(),
                NodeType::Satellite,
                0,
            )
            .unwrap();
        let dfn = ResourceDefinitionMirror::new(Arc::clone(&repos), drivers.clone())
            .get_instance(
                &ctx,
                Uuid::new_v4(),
                ResourceName::from_str("res1").unwrap(),
                TcpPortNumber::new(7000).unwrap(),
                "secret".to_owned(),
                TransportType::Ip,
                0,
            )
            .unwrap();
        let vlm_dfn = VolumeDefinitionMirror::new(drivers.clone())
            .get_instance(
                &ctx,
                Uuid::new_v4(),
                &dfn,
                VolumeNumber::new(0).unwrap(),
                MinorNumber::new(1000).unwrap(),
                4096,
                0,
            )
            .unwrap();
        let rsc = ResourceMirror::new(drivers.clone())
            .get_instance(&ctx, Uuid::new_v4(), &node, &dfn, 0)
            .unwrap();
        let pool_dfn = crate::mirror::StorPoolDefinitionMirror::new(
            Arc::clone(&repos),
            drivers.clone(),
        )
        .get_instance(
            &ctx,
            Uuid::new_v4(),
            quarry::identifier::StorPoolName::from_str("thinpool").unwrap(),
        )
        .unwrap();
        let stor_pool = crate::mirror::StorPoolMirror::new(drivers.clone())
            .get_instance(&ctx, Uuid::new_v4(), &node, &pool_dfn, "lvm".to_owned())
            .unwrap();

        Fixture {
            ctx,
            node,
            vlm_dfn,
            rsc,
            stor_pool,
            volumes: VolumeMirror::new(drivers),
        }
    }

    #[test]
    fn test_twice_mirrored_volume_registers_once() {
        let fix = fixture();
        let uuid = Uuid::new_v4();

        let first = fix
            .volumes
            .get_instance(
                &fix.ctx,
                uuid,
                &fix.rsc,
                &fix.vlm_dfn,
                &fix.stor_pool,
                None,
                None,
                0,
            )
            .unwrap();
        let second = fix
            .volumes
            .get_instance(
                &fix.ctx,
                uuid,
                &fix.rsc,
                &fix.vlm_dfn,
                &fix.stor_pool,
                None,
                None,
                0,
            )
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(1, fix.rsc.volumes(&fix.ctx).unwrap().len());
        assert_eq!(1, fix.stor_pool.volumes(&fix.ctx).unwrap().len());
        // still one resource on the node after the replay
        assert_eq!(1, fix.node.resource_count());
    }

    #[test]
    fn test_volume_uuid_divergence() {
        let fix = fixture();

        fix.volumes
            .get_instance(
                &fix.ctx,
                Uuid::new_v4(),
                &fix.rsc,
                &fix.vlm_dfn,
                &fix.stor_pool,
                None,
                None,
                0,
            )
            .unwrap();
        fix.volumes
            .get_instance(
                &fix.ctx,
                Uuid::new_v4(),
                &fix.rsc,
                &fix.vlm_dfn,
                &fix.stor_pool,
                None,
                None,
                0,
            )
            .unwrap_err();
    }
}
