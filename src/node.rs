//! List node with a lazily-set deletion mark and its own lock.

use core::sync::atomic::{AtomicBool, Ordering};
use crossbeam_epoch::{Atomic, Guard, Shared};
use parking_lot::{Mutex, MutexGuard};

/// A node of `OrderedIntSet`.
///
/// `next` and `deleted` are read without locking. Writes to `next` happen only while holding this
/// node's own lock; `deleted` is set only while holding both this node's lock and its
/// predecessor's.
#[derive(Debug)]
pub(crate) struct Node {
    value: i64,
    deleted: AtomicBool,
    next: Atomic<Node>,
    lock: Mutex<()>,
}

impl Node {
    pub(crate) fn new(value: i64) -> Self {
        Self {
            value,
            deleted: AtomicBool::new(false),
            next: Atomic::null(),
            lock: Mutex::new(()),
        }
    }

    /// Sentinel for the head of the list. Its value is never compared.
    pub(crate) fn sentinel() -> Self {
        Self::new(i64::MIN)
    }

    #[inline]
    pub(crate) fn value(&self) -> i64 {
        self.value
    }

    #[inline]
    pub(crate) fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Caller must hold this node's lock and the lock of the predecessor being redirected.
    #[inline]
    pub(crate) fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    #[inline]
    pub(crate) fn next<'g>(&self, guard: &'g Guard) -> Shared<'g, Node> {
        self.next.load(Ordering::Acquire, guard)
    }

    /// Caller must hold this node's lock, unless the node is not yet published.
    #[inline]
    pub(crate) fn set_next(&self, next: Shared<'_, Node>) {
        self.next.store(next, Ordering::Release);
    }

    #[inline]
    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }
}
