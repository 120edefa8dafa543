//! Access control.
//!
//! The decision engine itself is an external collaborator; this module
//! only carries its accept/deny contract. Every protected object holds
//! an [`ObjectProtection`] handle, and every operation is performed under
//! an [`AccessContext`]. `require_access` either returns `Ok(())` or a
//! denial that is always propagated to the caller, never swallowed.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{QuarryError, QuarryResult};
use crate::transaction::{TransactionCell, TransactionObject};

/// The role under which a subject acts.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Role(String);

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Requestable access levels, strictly ordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessType {
    View,
    Use,
    Change,
    Control,
}

impl AccessType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Use => "use",
            Self::Change => "change",
            Self::Control => "control",
        }
    }
}

/// The security context an operation runs under.
#[derive(Clone, Debug)]
pub struct AccessContext {
    subject: Role,
    privileged: bool,
}

impl AccessContext {
    /// The system context; bypasses all ACL checks.
    ///
    /// Used by trusted internal paths such as satellite mirror updates.
    pub fn system() -> Self {
        Self {
            subject: Role::new("SYSTEM"),
            privileged: true,
        }
    }

    pub fn for_role(subject: Role) -> Self {
        Self {
            subject,
            privileged: false,
        }
    }

    pub fn subject(&self) -> &Role {
        &self.subject
    }

    pub fn is_privileged(&self) -> bool {
        self.privileged
    }
}

/// Per-object access controls.
///
/// The creator role is granted `Control` implicitly; further grants are
/// themselves `Control`-gated. The ACL participates in the transaction
/// protocol, so a rolled-back unit of work also reverts ACL changes.
pub struct ObjectProtection {
    creator: Role,
    acl: Arc<TransactionCell<BTreeMap<Role, AccessType>>>,
}

impl ObjectProtection {
    pub fn new(creator_ctx: &AccessContext) -> Arc<Self> {
        let mut acl = BTreeMap::new();
        acl.insert(creator_ctx.subject().clone(), AccessType::Control);
        Arc::new(Self {
            creator: creator_ctx.subject().clone(),
            acl: Arc::new(TransactionCell::new(acl)),
        })
    }

    pub fn creator(&self) -> &Role {
        &self.creator
    }

    /// Checks that `ctx` holds at least `requested` access.
    pub fn require_access(&self, ctx: &AccessContext, requested: AccessType) -> QuarryResult<()> {
        if ctx.is_privileged() {
            return Ok(());
        }
        let granted = self.acl.get().get(ctx.subject()).copied();
        match granted {
            Some(access) if access >= requested => Ok(()),
            _ => {
                log::debug!(
                    "role '{}' denied {} access",
                    ctx.subject().as_str(),
                    requested.as_str()
                );
                Err(QuarryError::AccessDenied {
                    subject: ctx.subject().as_str().to_owned(),
                    requested: requested.as_str(),
                })
            }
        }
    }

    /// Grants `access` to `role`. Requires `Control`.
    pub fn grant(&self, ctx: &AccessContext, role: Role, access: AccessType) -> QuarryResult<()> {
        self.require_access(ctx, AccessType::Control)?;
        let mut acl = self.acl.get();
        acl.insert(role, access);
        self.acl.set(acl);
        Ok(())
    }

    /// Revokes all access of `role`. Requires `Control`.
    pub fn revoke(&self, ctx: &AccessContext, role: &Role) -> QuarryResult<()> {
        self.require_access(ctx, AccessType::Control)?;
        let mut acl = self.acl.get();
        acl.remove(role);
        self.acl.set(acl);
        Ok(())
    }
}

impl TransactionObject for ObjectProtection {
    fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
        vec![Arc::clone(&self.acl) as Arc<dyn TransactionObject>]
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

    #[test]
    fn test_creator_has_control() {
        let ctx = AccessContext::for_role(Role::new("admin"));
        let prot = ObjectProtection::new(&ctx);
        prot.require_access(&ctx, AccessType::Control).unwrap();
        prot.require_access(&ctx, AccessType::View).unwrap();
    }

    #[test]
    fn test_acl_ordering() {
        let admin = AccessContext::for_role(Role::new("admin"));
        let viewer = AccessContext::for_role(Role::new("viewer"));
        let prot = ObjectProtection::new(&admin);

        prot.require_access(&viewer, AccessType::View).unwrap_err();
        prot.grant(&admin, Role::new("viewer"), AccessType::Use)
            .unwrap();
        prot.require_access(&viewer, AccessType::View).unwrap();
        prot.require_access(&viewer, AccessType::Use).unwrap();
        prot.require_access(&viewer, AccessType::Change).unwrap_err();

        prot.revoke(&admin, &Role::new("viewer")).unwrap();
        prot.require_access(&viewer, AccessType::View).unwrap_err();
    }

    #[test]
    fn test_privileged_bypass() {
        let admin = AccessContext::for_role(Role::new("admin"));
        let prot = ObjectProtection::new(&admin);
        prot.require_access(&AccessContext::system(), AccessType::Control)
            .unwrap();
    }

    #[test]
    fn test_grants_require_control() {
        let admin = AccessContext::for_role(Role::new("admin"));
        let other = AccessContext::for_role(Role::new("other"));
        let prot = ObjectProtection::new(&admin);
        prot.grant(&other, Role::new("other"), AccessType::View)
            .unwrap_err();
    }
}
