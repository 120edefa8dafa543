//! The composable transaction-object protocol.
//!
//! Every stateful entity is an aggregate of sub-objects (single-value
//! cells, collections, child entities) that commit or roll back together
//! as one unit. A [`TransactionMgr`] is the unit of work: objects are
//! registered into it (directly or by recursive propagation through
//! [`TransactionObject::transaction_children`]), and `commit`/`rollback`
//! then apply or discard the pending changes of every registered object.
//!
//! Entity graphs are cyclic (a resource references its node, which
//! indirectly references the resource again). Registration therefore
//! checks the per-context visited set *before* recursing into children;
//! an object already registered with the same manager is skipped. This
//! guard is what keeps context propagation finite.

mod cell;
mod map;

pub use cell::TransactionCell;
pub use map::TransactionMap;

pub(crate) use cell::cell;
pub(crate) use map::txmap;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

/// A participant in the transaction protocol.
///
/// `has_local_changes`, `commit_local` and `rollback_local` concern only
/// the object itself, never its children; the manager owns the recursion
/// (flattened at registration time).
pub trait TransactionObject: Send + Sync {
    /// The explicit ordered list of composed transaction objects.
    ///
    /// May contain back-references to parents; the registration guard
    /// breaks the resulting cycles.
    fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
        Vec::new()
    }

    /// Whether this object itself has uncommitted changes.
    fn has_local_changes(&self) -> bool;

    /// Discards the saved pre-transaction state.
    ///
    /// Panics when invoked outside an active unit of work; that is a
    /// programming error, not a recoverable condition.
    fn commit_local(&self);

    /// Restores the saved pre-transaction state.
    fn rollback_local(&self);

    /// Marks this object as bound to an active unit of work.
    fn bind(&self);

    /// Detaches this object from its unit of work.
    fn unbind(&self);
}

/// Address-based identity of a transaction object instance.
fn instance_key(obj: &Arc<dyn TransactionObject>) -> usize {
    Arc::as_ptr(obj) as *const () as usize
}

/// A unit of work.
///
/// Holds the ordered set of transaction objects whose pending changes
/// commit or roll back as one atomic step. The scope of a manager is
/// caller-defined: one API request, or one satellite update batch.
#[derive(Default)]
pub struct TransactionMgr {
    registered: Mutex<IndexMap<usize, Arc<dyn TransactionObject>>>,
}

impl TransactionMgr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an object and, transitively, its children.
    ///
    /// An object already registered with this manager is skipped before
    /// its children are visited, so cyclic object graphs terminate.
    pub fn register(&self, obj: Arc<dyn TransactionObject>) {
        let key = instance_key(&obj);
        let newly_added = {
            let mut registered = self.registered.lock().unwrap();
            if registered.contains_key(&key) {
                false
            } else {
                registered.insert(key, Arc::clone(&obj));
                true
            }
        };
        // The lock is not held while recursing; children re-enter here.
        if newly_added {
            obj.bind();
            for child in obj.transaction_children() {
                self.register(child);
            }
        }
    }

    pub fn registered_count(&self) -> usize {
        self.registered.lock().unwrap().len()
    }

    /// Whether any registered object has uncommitted changes.
    pub fn is_dirty(&self) -> bool {
        self.registered
            .lock()
            .unwrap()
            .values()
            .any(|obj| obj.has_local_changes())
    }

    /// Applies the pending changes of every registered object, then ends
    /// the unit of work.
    pub fn commit(&self) {
        let registered = std::mem::take(&mut *self.registered.lock().unwrap());
        for obj in registered.values() {
            if obj.has_local_changes() {
                obj.commit_local();
            }
            obj.unbind();
        }
    }

    /// Discards the pending changes of every registered object, then ends
    /// the unit of work.
    pub fn rollback(&self) {
        let registered = std::mem::take(&mut *self.registered.lock().unwrap());
        for obj in registered.values() {
            if obj.has_local_changes() {
                obj.rollback_local();
            }
            obj.unbind();
        }
    }
}

/// Whether uncommitted state exists anywhere in the graph reachable from
/// `root`, usable with no unit of work bound.
///
/// Used by shutdown and consistency checks. Walks the child lists with a
/// visited set, so cyclic graphs terminate.
pub fn dirty_without_context(root: Arc<dyn TransactionObject>) -> bool {
    let mut visited: HashSet<usize> = HashSet::new();
    let mut pending = vec![root];
    while let Some(obj) = pending.pop() {
        if !visited.insert(instance_key(&obj)) {
            continue;
        }
        if obj.has_local_changes() {
            return true;
        }
        pending.extend(obj.transaction_children());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two objects referencing each other through their child lists.
    struct CyclicPair {
        value: TransactionCell<u32>,
        peer: Mutex<Option<Arc<CyclicPair>>>,
    }

    impl CyclicPair {
        fn new(initial: u32) -> Arc<Self> {
            Arc::new(Self {
                value: TransactionCell::new(initial),
                peer: Mutex::new(None),
            })
        }
    }

    impl TransactionObject for CyclicPair {
        fn transaction_children(&self) -> Vec<Arc<dyn TransactionObject>> {
            let mut children: Vec<Arc<dyn TransactionObject>> = Vec::new();
            if let Some(peer) = self.peer.lock().unwrap().as_ref() {
                children.push(Arc::clone(peer) as Arc<dyn TransactionObject>);
            }
            children
        }

        fn has_local_changes(&self) -> bool {
            self.value.has_local_changes()
        }

        fn commit_local(&self) {
            self.value.commit_local();
        }

        fn rollback_local(&self) {
            self.value.rollback_local();
        }

        fn bind(&self) {
            self.value.bind();
        }

        fn unbind(&self) {
            self.value.unbind();
        }
    }

    #[test]
    fn test_cell_commit_and_rollback() {
        let mgr = TransactionMgr::new();
        let cell = Arc::new(TransactionCell::new(1u32));
        mgr.register(Arc::clone(&cell) as Arc<dyn TransactionObject>);

        cell.set(2);
        assert!(mgr.is_dirty());
        mgr.rollback();
        assert_eq!(1, cell.get());

        mgr.register(Arc::clone(&cell) as Arc<dyn TransactionObject>);
        cell.set(3);
        mgr.commit();
        assert_eq!(3, cell.get());
        assert!(!cell.has_local_changes());
    }

    #[test]
    fn test_cyclic_registration_terminates() {
        let first = CyclicPair::new(10);
        let second = CyclicPair::new(20);
        *first.peer.lock().unwrap() = Some(Arc::clone(&second));
        *second.peer.lock().unwrap() = Some(Arc::clone(&first));

        let mgr = TransactionMgr::new();
        mgr.register(Arc::clone(&first) as Arc<dyn TransactionObject>);
        assert_eq!(2, mgr.registered_count());

        // re-registering the same graph adds nothing
        mgr.register(Arc::clone(&second) as Arc<dyn TransactionObject>);
        assert_eq!(2, mgr.registered_count());
    }

    #[test]
    fn test_all_or_nothing() {
        let mgr = TransactionMgr::new();
        let cells: Vec<Arc<TransactionCell<u32>>> =
            (0..8).map(|nr| Arc::new(TransactionCell::new(nr))).collect();
        for cell in &cells {
            mgr.register(Arc::clone(cell) as Arc<dyn TransactionObject>);
        }
        for cell in &cells {
            cell.set(cell.get() + 100);
        }
        mgr.rollback();
        for (nr, cell) in cells.iter().enumerate() {
            assert_eq!(nr as u32, cell.get());
        }

        for cell in &cells {
            mgr.register(Arc::clone(cell) as Arc<dyn TransactionObject>);
            cell.set(cell.get() + 100);
        }
        mgr.commit();
        for (nr, cell) in cells.iter().enumerate() {
            assert_eq!(nr as u32 + 100, cell.get());
        }
    }

    #[test]
    fn test_dirty_without_context() {
        let first = CyclicPair::new(1);
        let second = CyclicPair::new(2);
        *first.peer.lock().unwrap() = Some(Arc::clone(&second));
        *second.peer.lock().unwrap() = Some(Arc::clone(&first));

        assert!(!dirty_without_context(
            Arc::clone(&first) as Arc<dyn TransactionObject>
        ));

        let mgr = TransactionMgr::new();
        mgr.register(Arc::clone(&first) as Arc<dyn TransactionObject>);
        second.value.set(42);
        assert!(dirty_without_context(
            Arc::clone(&first) as Arc<dyn TransactionObject>
        ));
        mgr.rollback();
        assert!(!dirty_without_context(first as Arc<dyn TransactionObject>));
    }

    #[test]
    #[should_panic(expected = "outside of an active transaction")]
    fn test_commit_without_context_panics() {
        let cell = TransactionCell::new(1u32);
        cell.commit_local();
    }
}
