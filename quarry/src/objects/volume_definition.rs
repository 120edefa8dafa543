//! Volume definitions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::access::{AccessContext, AccessType};
use crate::db::DriverRef;
use crate::error::{QuarryError, QuarryResult};
use crate::flags::{self, StateFlags, VlmDfnFlags};
use crate::identifier::{MinorNumber, ResourceName, VolumeNumber};
use crate::props::{secure_props, PropsContainer};
use crate::transaction::{cell, TransactionCell, TransactionObject};

use super::api::VolumeDefinitionApi;
use super::ResourceDefinition;

fn check_size(size_kib: u64) -> QuarryResult<()> {
    if size_kib == 0 {
        return Err(QuarryError::ValueOutOfRange {
            kind: "volume size (KiB)",
            value: 0,
            min: 1,
            max: u64::MAX,
        });
    }
    Ok(())
}

/// One volume slot of a resource definition.
///
/// Access is governed by the owning resource definition's protection.
/// The minor number is drawn from an external pool on the controller.
pub struct VolumeDefinition {
    uuid: Uuid,
    dbg_instance_id: Uuid,
    resource_definition: Arc<ResourceDefinition>,
    volume_number: VolumeNumber,
    minor_number: Arc<TransactionCell<MinorNumber>>,
    size_kib: Arc<TransactionCell<u64>>,
    flags: Arc<StateFlags<VlmDfnFlags>>,
    props: Arc<PropsContainer>,
    driver: DriverRef<(ResourceName, VolumeNumber), VolumeDefinition>,
    deleted: AtomicBool,
}

impl std::fmt::Debug for VolumeDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeDefinition")
            .field("uuid", &self.uuid)
            .finish_non_exhaustive()
    }
}

impl VolumeDefinition {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        uuid: Uuid,
        resource_definition: Arc<ResourceDefinition>,
        volume_number: VolumeNumber,
        minor_number: MinorNumber,
        size_kib: u64,
        initial_flags: u64,
        driver: DriverRef<(ResourceName, VolumeNumber), VolumeDefinition>,
    ) -> QuarryResult<Arc<Self>> {
        check_size(size_kib)?;
        Ok(Arc::new(Self {
            uuid,
            dbg_instance_id: Uuid::new_v4(),
            flags: StateFlags::new(Arc::clone(resource_definition.obj_prot()), initial_flags),
            resource_definition,
            volume_number,
            minor_number: cell(minor_number),
            size_kib: cell(size_kib),
            props: PropsContainer::new(),
            driver,
            deleted: AtomicBool::new(false),
        }))
    }

    fn check_deleted(&self) {
        if self.deleted.load(Ordering::Acquire) {
            panic!("access to a deleted volume definition");
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.check_deleted();
        self.uuid
    }

    pub fn dbg_instance_id(&self) -> Uuid {
        self.dbg_instance_id
    }

    pub fn resource_definition(&self) -> &Arc<ResourceDefinition> {
        self.check_deleted();
        &self.resource_definition
    }

    pub fn volume_number(&self) -> VolumeNumber {
        self.check_deleted();
        self.volume_number
    }

    pub fn key(&self) -> (ResourceName, VolumeNumber) {
        (
            self.resource_definition.name().clone(),
            self.volume_number,
        )
    }

    pub fn minor_number(&self, ctx: &AccessContext) -> QuarryResult<MinorNumber> {
        self.check_deleted();
        self.resource_definition
            .obj_prot()
            .require_access(ctx, AccessType::View)?;
        Ok(self.minor_number.get())
    }

    pub fn set_minor_number(&self, ctx: &AccessContext, minor: MinorNumber) -> QuarryResult<()> {
        self.check_deleted();
        self.resource_definition
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        self.minor_number.set(minor);
        Ok(())
    }

    pub fn size_kib(&self, ctx: &AccessContext) -> QuarryResult<u64> {
        self.check_deleted();
        self.resource_definition
            .obj_prot()
            .require_access(ctx, AccessType::View)?;
        Ok(self.size_kib.get())
    }

    pub fn set_size_kib(&self, ctx: &AccessContext, size_kib: u64) -> QuarryResult<()> {
        self.check_deleted();
        check_size(size_kib)?;
        self.resource_definition
            .obj_prot()
            .require_access(ctx, AccessType::Change)?;
        self.size_kib.set(size_kib);
        Ok(())
    }

    pub fn flags(&self) -> &Arc<StateFlags<VlmDfnFlags>> {
        self.check_deleted();
        &self.flags
    }

    pub fn props(&self, ctx: &AccessContext) -> QuarryResult<&Arc<PropsContainer>> {
        self.check_deleted();
        secure_props(ctx, self.resource_definition.obj_prot(), &self.props)
    }

    pub fn mark_deleted(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.flags.enable_flags(ctx, VlmDfnFlags::DELETE)
    }

    pub fn delete(&self, ctx: &AccessContext) -> QuarryResult<()> {
        self.check_deleted();
        self.resource_definition
            .obj_prot()
            .require_access(ctx, AccessType::Control)?;
        self.resource_definition
            .remove_volume_definition(ctx, self.volume_number)?;
        self.driver.delete(self)?;
        self.deleted.store(true, Ordering::Release);
        Ok(())
    }

    pub fn api_data(&self, ctx: &AccessContext) -> QuarryResult<VolumeDefinitionApi> {
        self.check_deleted();
        self.resource_definition
            .obj_prot()
            .require_access(ctx, AccessType::View)?;
        Ok(VolumeDefinitionApi {
            uuid: self.uuid.to_string(),
            volume_number: self.volume_number.value(),
            minor_number: self.minor_number.get().value(),
            size_kib: self.size_kib.get(),
            flags: flags::to_string_list::<VlmDfnFlags>(self.flags.mask(ctx)?),
        })
    }
}

impl TransactionObject for VolumeDefinition {
    fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
        vec![
            Arc::clone(&self.resource_definition) as Arc<dyn TransactionObject>,
            Arc::clone(&self.minor_number) as Arc<dyn TransactionObject>,
            Arc::clone(&self.size_kib) as Arc<dyn TransactionObject>,
            Arc::clone(&self.flags) as Arc<dyn TransactionObject>,
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
    use crate::access::{AccessContext, ObjectProtection, Role};
    use crate::db::NoOpDriver;
    use crate::identifier::TcpPortNumber;
    use crate::objects::TransportType;
    use std::str::FromStr;

    #[test]
    fn test_zero_size_rejected() {
        let admin = AccessContext::for_role(Role::new("admin"));
        let rsc_dfn = ResourceDefinition::new(
            Uuid::new_v4(),
            ObjectProtection::new(&admin),
            ResourceName::from_str("res1").unwrap(),
            TcpPortNumber::new(7000).unwrap(),
            "secret".to_owned(),
            TransportType::Ip,
            0,
            Arc::new(NoOpDriver),
        );

        VolumeDefinition::new(
            Uuid::new_v4(),
            Arc::clone(&rsc_dfn),
            VolumeNumber::new(0).unwrap(),
            MinorNumber::new(1000).unwrap(),
            0,
            0,
            Arc::new(NoOpDriver),
        )
        .unwrap_err();

        let vlm_dfn = VolumeDefinition::new(
            Uuid::new_v4(),
            rsc_dfn,
            VolumeNumber::new(0).unwrap(),
            MinorNumber::new(1000).unwrap(),
            1024,
            0,
            Arc::new(NoOpDriver),
        )
        .unwrap();
        assert_eq!(1024, vlm_dfn.size_kib(&admin).unwrap());
        vlm_dfn.set_size_kib(&admin, 0).unwrap_err();
    }
}
