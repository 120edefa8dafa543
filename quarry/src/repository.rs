//! Top-level entity repositories.
//!
//! The cluster-wide maps (nodes, resource definitions, storage pool
//! definitions) are injected shared state guarded by reader/writer
//! locks, never ambient singletons. Read-only lookups take the read
//! lock; structural mutation goes through the write guard, so
//! concurrent same-key creation is resolved by re-checking existence
//! under the write lock.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use crate::access::{AccessContext, AccessType, ObjectProtection};
use crate::error::QuarryResult;

pub struct Repository<K: Ord, V: Clone> {
    obj_prot: Arc<ObjectProtection>,
    map: RwLock<BTreeMap<K, V>>,
}

impl<K: Ord, V: Clone> Repository<K, V> {
    pub fn new(creator_ctx: &AccessContext) -> Self {
        Self {
            obj_prot: ObjectProtection::new(creator_ctx),
            map: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn obj_prot(&self) -> &Arc<ObjectProtection> {
        &self.obj_prot
    }

    pub fn get(&self, ctx: &AccessContext, key: &K) -> QuarryResult<Option<V>> {
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.map.read().unwrap().get(key).cloned())
    }

    pub fn contains_key(&self, ctx: &AccessContext, key: &K) -> QuarryResult<bool> {
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.map.read().unwrap().contains_key(key))
    }

    pub fn values(&self, ctx: &AccessContext) -> QuarryResult<Vec<V>> {
        self.obj_prot.require_access(ctx, AccessType::View)?;
        Ok(self.map.read().unwrap().values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.map.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().unwrap().is_empty()
    }

    /// Takes the write lock for a check-then-act sequence. Requires
    /// `Change`; the guard scope is the caller's critical section.
    pub fn write(
        &self,
        ctx: &AccessContext,
    ) -> QuarryResult<RwLockWriteGuard<'_, BTreeMap<K, V>>> {
        self.obj_prot.require_access(ctx, AccessType::Change)?;
        Ok(self.map.write().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;

    #[test]
    fn test_write_requires_change() {
        let admin = AccessContext::for_role(Role::new("admin"));
        let viewer = AccessContext::for_role(Role::new("viewer"));
        let repo: Repository<String, u32> = Repository::new(&admin);
        repo.obj_prot()
            .grant(&admin, Role::new("viewer"), AccessType::View)
            .unwrap();

        repo.write(&admin).unwrap().insert("key".to_owned(), 1);
        repo.write(&viewer).unwrap_err();
        assert_eq!(Some(1), repo.get(&viewer, &"key".to_owned()).unwrap());
    }

    #[test]
    fn test_check_then_act_under_one_guard() {
        let admin = AccessContext::for_role(Role::new("admin"));
        let repo: Repository<String, u32> = Repository::new(&admin);

        let mut guard = repo.write(&admin).unwrap();
        if !guard.contains_key("key") {
            guard.insert("key".to_owned(), 7);
        }
        drop(guard);
        assert_eq!(1, repo.len());
    }
}
