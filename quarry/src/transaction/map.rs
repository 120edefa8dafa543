//! Transactional ordered map.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::TransactionObject;

struct MapInner<K, V> {
    current: BTreeMap<K, V>,
    saved: Option<BTreeMap<K, V>>,
}

/// An ordered map participating in the transaction protocol.
///
/// Values are shared handles (`Arc`), so the pre-transaction snapshot
/// taken on the first in-transaction structural change is shallow.
pub struct TransactionMap<K: Ord + Clone + Send, V: Clone + Send> {
    inner: Mutex<MapInner<K, V>>,
    bound: AtomicBool,
}

impl<K: Ord + Clone + Send, V: Clone + Send> TransactionMap<K, V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MapInner {
                current: BTreeMap::new(),
                saved: None,
            }),
            bound: AtomicBool::new(false),
        }
    }

    fn save_if_needed(&self, inner: &mut MapInner<K, V>) {
        if self.bound.load(Ordering::Acquire) && inner.saved.is_none() {
            inner.saved = Some(inner.current.clone());
        }
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let mut inner = self.inner.lock().unwrap();
        self.save_if_needed(&mut inner);
        inner.current.insert(key, value)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().unwrap();
        self.save_if_needed(&mut inner);
        inner.current.remove(key)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().unwrap().current.get(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.lock().unwrap().current.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().current.is_empty()
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.lock().unwrap().current.keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<V> {
        self.inner
            .lock()
            .unwrap()
            .current
            .values()
            .cloned()
            .collect()
    }

    pub fn entries(&self) -> Vec<(K, V)> {
        self.inner
            .lock()
            .unwrap()
            .current
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl<K: Ord + Clone + Send, V: Clone + Send> Default for TransactionMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone + Send, V: Clone + Send> TransactionObject for TransactionMap<K, V> {
    fn has_local_changes(&self) -> bool {
        self.inner.lock().unwrap().saved.is_some()
    }

    fn commit_local(&self) {
        if !self.bound.load(Ordering::Acquire) {
            panic!("transaction map committed outside of an active transaction context");
        }
        self.inner.lock().unwrap().saved = None;
    }

    fn rollback_local(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(saved) = inner.saved.take() {
            inner.current = saved;
        }
    }

    fn bind(&self) {
        self.bound.store(true, Ordering::Release);
    }

    fn unbind(&self) {
        self.bound.store(false, Ordering::Release);
    }
}

/// Convenience alias used by entity constructors.
pub(crate) fn txmap<K: Ord + Clone + Send, V: Clone + Send>() -> Arc<TransactionMap<K, V>> {
    Arc::new(TransactionMap::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionMgr;

    #[test]
    fn test_map_rollback_restores_structure() {
        let mgr = TransactionMgr::new();
        let map: Arc<TransactionMap<u32, &'static str>> = txmap();
        map.insert(1, "one");

        mgr.register(Arc::clone(&map) as Arc<dyn TransactionObject>);
        map.insert(2, "two");
        map.remove(&1);
        assert!(map.has_local_changes());

        mgr.rollback();
        assert_eq!(Some("one"), map.get(&1));
        assert!(!map.contains_key(&2));
        assert_eq!(1, map.len());
    }

    #[test]
    fn test_map_commit_keeps_structure() {
        let mgr = TransactionMgr::new();
        let map: Arc<TransactionMap<u32, &'static str>> = txmap();
        mgr.register(Arc::clone(&map) as Arc<dyn TransactionObject>);

        map.insert(7, "seven");
        mgr.commit();
        assert_eq!(Some("seven"), map.get(&7));
        assert!(!map.has_local_changes());
    }
}
