//! Hierarchical property storage.
//!
//! A flat map of `/`-separated string keys attached to most entities.
//! Keys are validated (no empty components, bounded path length); the
//! container participates in the transaction protocol so property edits
//! commit and roll back with the owning entity.

use std::sync::Arc;

use crate::access::{AccessContext, AccessType, ObjectProtection};
use crate::error::{QuarryError, QuarryResult};
use crate::transaction::{TransactionMap, TransactionObject};

/// The maximum allowable length of a property key path.
pub const PATH_MAX_LENGTH: usize = 256;

pub struct PropsContainer {
    map: Arc<TransactionMap<String, String>>,
}

fn validate_key(key: &str) -> QuarryResult<()> {
    if key.is_empty() {
        return Err(QuarryError::InvalidPropKey {
            key: key.to_owned(),
            reason: "empty key",
        });
    }
    if key.len() > PATH_MAX_LENGTH {
        return Err(QuarryError::InvalidPropKey {
            key: key.to_owned(),
            reason: "key path too long",
        });
    }
    if key.starts_with('/') || key.ends_with('/') {
        return Err(QuarryError::InvalidPropKey {
            key: key.to_owned(),
            reason: "leading or trailing path separator",
        });
    }
    if key.split('/').any(str::is_empty) {
        return Err(QuarryError::InvalidPropKey {
            key: key.to_owned(),
            reason: "empty path component",
        });
    }
    Ok(())
}

impl PropsContainer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            map: Arc::new(TransactionMap::new()),
        })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.map.get(&key.to_owned())
    }

    /// Sets a property, returning the previous value.
    pub fn set(&self, key: &str, value: impl Into<String>) -> QuarryResult<Option<String>> {
        validate_key(key)?;
        Ok(self.map.insert(key.to_owned(), value.into()))
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.map.remove(&key.to_owned())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        self.map.entries()
    }

    /// All properties below `namespace/`, with the namespace stripped.
    pub fn namespace(&self, namespace: &str) -> Vec<(String, String)> {
        let prefix = format!("{}/", namespace);
        self.map
            .entries()
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&prefix)
                    .map(|stripped| (stripped.to_owned(), value))
            })
            .collect()
    }
}

impl TransactionObject for PropsContainer {
    fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
        vec![Arc::clone(&self.map) as Arc<dyn TransactionObject>]
    }

    fn has_local_changes(&self) -> bool {
        false
    }

    fn commit_local(&self) {}

    fn rollback_local(&self) {}

    fn bind(&self) {}

    fn unbind(&self) {}
}

/// Gates property access behind the owning object's protection.
///
/// Reading requires `View`; the returned container is shared, so callers
/// that were granted access operate on the live properties.
pub fn secure_props<'a>(
    ctx: &AccessContext,
    obj_prot: &ObjectProtection,
    props: &'a Arc<PropsContainer>,
) -> QuarryResult<&'a Arc<PropsContainer>> {
    obj_prot.require_access(ctx, AccessType::View)?;
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionMgr;

    #[test]
    fn test_key_validation() {
        let props = PropsContainer::new();
        props.set("simple", "v").unwrap();
        props.set("net/if0/addr", "10.0.0.1").unwrap();

        props.set("", "v").unwrap_err();
        props.set("/lead", "v").unwrap_err();
        props.set("trail/", "v").unwrap_err();
        props.set("a//b", "v").unwrap_err();
        props.set(&"k".repeat(PATH_MAX_LENGTH + 1), "v").unwrap_err();
    }

    #[test]
    fn test_namespace_listing() {
        let props = PropsContainer::new();
        props.set("net/if0/addr", "10.0.0.1").unwrap();
        props.set("net/if1/addr", "10.0.0.2").unwrap();
        props.set("other", "x").unwrap();

        let net = props.namespace("net");
        assert_eq!(2, net.len());
        assert_eq!(("if0/addr".to_owned(), "10.0.0.1".to_owned()), net[0]);
    }

    #[test]
    fn test_props_roll_back_with_transaction() {
        let props = PropsContainer::new();
        props.set("keep", "original").unwrap();

        let mgr = TransactionMgr::new();
        mgr.register(Arc::clone(&props) as Arc<dyn TransactionObject>);
        props.set("keep", "changed").unwrap();
        props.set("new", "value").unwrap();
        mgr.rollback();

        assert_eq!(Some("original".to_owned()), props.get("keep"));
        assert_eq!(None, props.get("new"));
    }
}
