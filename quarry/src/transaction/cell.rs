//! Single-value transaction cell.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::TransactionObject;

struct CellInner<T> {
    value: T,
    saved: Option<T>,
}

/// A single mutable value participating in the transaction protocol.
///
/// While bound to a unit of work, the first mutation saves the
/// pre-transaction value; rollback restores it, commit discards it.
/// Mutations on an unbound cell apply directly (bootstrap and mirror
/// initialization rely on this).
pub struct TransactionCell<T: Clone + Send> {
    inner: Mutex<CellInner<T>>,
    bound: AtomicBool,
}

impl<T: Clone + Send> TransactionCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(CellInner { value, saved: None }),
            bound: AtomicBool::new(false),
        }
    }

    pub fn get(&self) -> T {
        self.inner.lock().unwrap().value.clone()
    }

    /// Replaces the value, returning the previous one.
    pub fn set(&self, value: T) -> T {
        let mut inner = self.inner.lock().unwrap();
        if self.bound.load(Ordering::Acquire) && inner.saved.is_none() {
            inner.saved = Some(inner.value.clone());
        }
        std::mem::replace(&mut inner.value, value)
    }
}

impl<T: Clone + Send> TransactionObject for TransactionCell<T> {
    fn has_local_changes(&self) -> bool {
        self.inner.lock().unwrap().saved.is_some()
    }

    fn commit_local(&self) {
        if !self.bound.load(Ordering::Acquire) {
            panic!("transaction cell committed outside of an active transaction context");
        }
        self.inner.lock().unwrap().saved = None;
    }

    fn rollback_local(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(saved) = inner.saved.take() {
            inner.value = saved;
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
pub(crate) fn cell<T: Clone + Send>(value: T) -> Arc<TransactionCell<T>> {
    Arc::new(TransactionCell::new(value))
}
