//! State flags and the flag codec.
//!
//! Each flagged entity has a small closed set of named flags with fixed
//! power-of-two values. The values are wire and database format; they are
//! never renumbered. The codec converts between flag sets, raw 64-bit
//! masks and name lists (case-insensitive on input).

use std::marker::PhantomData;
use std::sync::Arc;

use bitflags::bitflags;
use bitflags::Flags;

use crate::access::{AccessContext, AccessType, ObjectProtection};
use crate::error::{QuarryError, QuarryResult};
use crate::transaction::{TransactionCell, TransactionObject};

bitflags! {
    /// Node state flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct NodeFlags: u64 {
        const DELETE = 1;
        const EVICTED = Self::DELETE.bits() | (1 << 1);
        const EVACUATE = 1 << 2;
        const QIGNORE = 0x10000;
    }
}

bitflags! {
    /// Resource definition state flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RscDfnFlags: u64 {
        const DELETE = 1;
    }
}

bitflags! {
    /// Resource state flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RscFlags: u64 {
        const CLEAN = 1;
        const DELETE = 2;
        const DISKLESS = 4;
    }
}

bitflags! {
    /// Volume definition state flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct VlmDfnFlags: u64 {
        const DELETE = 2;
    }
}

bitflags! {
    /// Volume state flags. `CLEAN` tracks satellite confirmation.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct VlmFlags: u64 {
        const CLEAN = 1;
        const DELETE = 2;
    }
}

bitflags! {
    /// Snapshot definition state flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SnapshotDfnFlags: u64 {
        const SUCCESSFUL = 1;
        const FAILED_DEPLOYMENT = 2;
        const FAILED_DISCONNECT = 4;
        const DELETE = 8;
    }
}

bitflags! {
    /// Snapshot state flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SnapshotFlags: u64 {
        const SUSPEND_RESOURCE = 1;
        const TAKE_SNAPSHOT = 2;
        const DELETE = 4;
    }
}

/// Combines flag members into a raw mask.
pub fn mask_of<F: Flags<Bits = u64> + Copy>(flags: &[F]) -> u64 {
    flags.iter().fold(0, |mask, flag| mask | flag.bits())
}

/// Decomposes a raw mask into the contained members, in declaration order.
///
/// A member whose value spans multiple bits (e.g. `NodeFlags::EVICTED`)
/// is reported when all of its bits are set, matching the persisted-mask
/// semantics of the wire format.
pub fn restore<F: Flags<Bits = u64> + Copy>(mask: u64) -> Vec<F> {
    F::FLAGS
        .iter()
        .filter(|flag| {
            let bits = flag.value().bits();
            bits != 0 && mask & bits == bits
        })
        .map(|flag| *flag.value())
        .collect()
}

/// Renders the set members of `mask` as names, in declaration order.
pub fn to_string_list<F: Flags<Bits = u64> + Copy>(mask: u64) -> Vec<String> {
    F::FLAGS
        .iter()
        .filter(|flag| {
            let bits = flag.value().bits();
            bits != 0 && mask & bits == bits
        })
        .map(|flag| flag.name().to_owned())
        .collect()
}

/// Parses a list of flag names into a mask. Case-insensitive; unknown
/// names are rejected. An empty list is the valid zero mask.
pub fn from_string_list<F, I, S>(names: I) -> QuarryResult<u64>
where
    F: Flags<Bits = u64> + Copy,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut mask = 0;
    for name in names {
        let name = name.as_ref().trim();
        let flag = F::FLAGS
            .iter()
            .find(|flag| flag.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| QuarryError::UnknownFlag {
                name: name.to_owned(),
            })?;
        mask |= flag.value().bits();
    }
    Ok(mask)
}

/// Access-checked, transaction-aware flag storage of an entity.
pub struct StateFlags<F: Flags<Bits = u64> + Copy + Send + Sync + 'static> {
    obj_prot: Arc<ObjectProtection>,
    mask: Arc<TransactionCell<u64>>,
    phantom: PhantomData<F>,
}

impl<F: Flags<Bits = u64> + Copy + Send + Sync + 'static> StateFlags<F> {
    pub fn new(obj_prot: Arc<ObjectProtection>, initial_mask: u64) -> Arc<Self> {
        Arc::new(Self {
            obj_prot,
            mask: Arc::new(TransactionCell::new(initial_mask & F::all().bits())),
            phantom: PhantomData,
        })
    }

    pub fn is_set(&self, ctx: &AccessContext, flags: F) -> QuarryResult<bool> {
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.mask.get() & flags.bits() == flags.bits())
    }

    pub fn mask(&self, ctx: &AccessContext) -> QuarryResult<u64> {
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.mask.get())
    }

    pub fn enable_flags(&self, ctx: &AccessContext, flags: F) -> QuarryResult<()> {
        self.obj_prot.require_access(ctx, AccessType::Change)?;
        self.mask.set(self.mask.get() | flags.bits());
        Ok(())
    }

    pub fn disable_flags(&self, ctx: &AccessContext, flags: F) -> QuarryResult<()> {
        self.obj_prot.require_access(ctx, AccessType::Change)?;
        self.mask.set(self.mask.get() & !flags.bits());
        Ok(())
    }
}

impl<F: Flags<Bits = u64> + Copy + Send + Sync + 'static> TransactionObject for StateFlags<F> {
    fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
        vec![Arc::clone(&self.mask) as Arc<dyn TransactionObject>]
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

    fn subsets<F: Flags<Bits = u64> + Copy>() -> Vec<Vec<F>> {
        let members: Vec<F> = F::FLAGS.iter().map(|flag| *flag.value()).collect();
        let mut result = Vec::new();
        for selector in 0..(1u32 << members.len()) {
            result.push(
                members
                    .iter()
                    .enumerate()
                    .filter(|(idx, _)| selector & (1 << idx) != 0)
                    .map(|(_, flag)| *flag)
                    .collect(),
            );
        }
        result
    }

    #[test]
    fn test_mask_restore_round_trip() {
        for subset in subsets::<RscFlags>() {
            let mask = mask_of(&subset);
            let restored = restore::<RscFlags>(mask);
            assert_eq!(mask, mask_of(&restored));
        }
        // the empty set is a valid zero mask
        assert_eq!(0, mask_of::<RscFlags>(&[]));
        assert!(restore::<RscFlags>(0).is_empty());
    }

    #[test]
    fn test_restore_declaration_order() {
        let mask = mask_of(&[SnapshotDfnFlags::DELETE, SnapshotDfnFlags::SUCCESSFUL]);
        let restored = restore::<SnapshotDfnFlags>(mask);
        assert_eq!(
            vec![SnapshotDfnFlags::SUCCESSFUL, SnapshotDfnFlags::DELETE],
            restored
        );
    }

    #[test]
    fn test_compound_member() {
        // EVICTED contains the DELETE bit; both are reported
        let mask = NodeFlags::EVICTED.bits();
        let names = to_string_list::<NodeFlags>(mask);
        assert_eq!(vec!["DELETE".to_owned(), "EVICTED".to_owned()], names);
    }

    #[test]
    fn test_string_list_round_trip() {
        let mask = mask_of(&[VlmFlags::CLEAN, VlmFlags::DELETE]);
        let names = to_string_list::<VlmFlags>(mask);
        assert_eq!(vec!["CLEAN".to_owned(), "DELETE".to_owned()], names);
        assert_eq!(mask, from_string_list::<VlmFlags, _, _>(&names).unwrap());

        // case-insensitive input
        assert_eq!(
            mask,
            from_string_list::<VlmFlags, _, _>(["clean", "Delete"]).unwrap()
        );
        // empty input is the zero mask
        let empty: [&str; 0] = [];
        assert_eq!(0, from_string_list::<VlmFlags, _, _>(empty).unwrap());

        from_string_list::<VlmFlags, _, _>(["NO_SUCH_FLAG"]).unwrap_err();
    }

    #[test]
    fn test_state_flags_access() {
        use crate::access::Role;

        let admin = AccessContext::for_role(Role::new("admin"));
        let viewer = AccessContext::for_role(Role::new("viewer"));
        let prot = ObjectProtection::new(&admin);
        prot.grant(&admin, Role::new("viewer"), AccessType::View)
            .unwrap();

        let flags = StateFlags::<RscFlags>::new(Arc::clone(&prot), 0);
        flags.enable_flags(&admin, RscFlags::DELETE).unwrap();
        assert!(flags.is_set(&viewer, RscFlags::DELETE).unwrap());
        flags.enable_flags(&viewer, RscFlags::CLEAN).unwrap_err();
        flags.disable_flags(&admin, RscFlags::DELETE).unwrap();
        assert_eq!(0, flags.mask(&admin).unwrap());
    }
}
