//! Ordered set of integers on a lazily-deleted, per-node-locked linked list.

use core::fmt;
use core::iter::FromIterator;
use core::sync::atomic::{AtomicIsize, Ordering};
use crossbeam_epoch::{self as epoch, Guard, Owned, Shared};
use crossbeam_utils::{Backoff, CachePadded};
use log::{debug, trace};

use super::error::InvariantError;
use super::node::Node;

/// Concurrent sorted set of `i64`.
///
/// Mutators scan without locks, then lock the one or two nodes they touch and validate the scan
/// before committing; on a failed validation they back off and rescan from `head`. Readers
/// (`contains`, `range`, `len`) never lock.
///
/// Deletion is lazy: the victim is marked under both its own lock and its predecessor's, and is
/// unlinked in the same critical section. Unlinked nodes are retired to `crossbeam_epoch`, so a
/// reader that is still standing on one keeps it alive until it unpins.
///
/// Lock order: a deleter locks the victim, then its predecessor; an inserter locks only the
/// predecessor. A thread therefore only waits on a node with a smaller value than any node it
/// holds, or on `head`, so no cycle of waiters can form.
pub struct OrderedIntSet {
    /// Sentinel. Never marked, never unlinked, value never read.
    head: Node,
    /// Approximate number of elements; updated after the structural change, not with it.
    count: CachePadded<AtomicIsize>,
}

impl Default for OrderedIntSet {
    fn default() -> Self {
        debug!("creating empty ordered int set");
        Self {
            head: Node::sentinel(),
            count: CachePadded::new(AtomicIsize::new(0)),
        }
    }
}

impl OrderedIntSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds adjacent `(a, b)` with `a.value < value` and `b` either null or `value <= b.value`.
    /// `a` may be `head`.
    fn find<'g>(&'g self, value: i64, guard: &'g Guard) -> (&'g Node, Shared<'g, Node>) {
        let mut a = &self.head;
        let mut b = a.next(guard);
        while let Some(node) = unsafe { b.as_ref() } {
            if node.value() >= value {
                break;
            }
            a = node;
            b = node.next(guard);
        }
        (a, b)
    }

    /// Returns `true` if `value` is present and not marked deleted.
    pub fn contains(&self, value: i64) -> bool {
        let guard = &epoch::pin();
        let (_, b) = self.find(value, guard);
        match unsafe { b.as_ref() } {
            Some(node) => node.value() == value && !node.is_deleted(),
            None => false,
        }
    }

    /// Inserts `value`. Returns `false` if an unmarked node with the same value already exists.
    ///
    /// An equal node that is already marked belongs to a delete that is about to unlink it, so the
    /// insert rescans instead of reporting a duplicate.
    pub fn insert(&self, value: i64) -> bool {
        let guard = &epoch::pin();
        let backoff = Backoff::new();
        let owned = Owned::new(Node::new(value));

        loop {
            let (a, b) = self.find(value, guard);

            if let Some(node) = unsafe { b.as_ref() } {
                if node.value() == value {
                    if !node.is_deleted() {
                        return false;
                    }
                    trace!("insert({}): equal node is being deleted, rescanning", value);
                    backoff.snooze();
                    continue;
                }
            }

            let a_lock = a.lock();
            if a.next(guard) == b && !a.is_deleted() {
                owned.set_next(b);
                a.set_next(owned.into_shared(guard));
                drop(a_lock);
                break;
            }
            drop(a_lock);

            trace!("insert({}): validation failed, rescanning", value);
            backoff.snooze();
        }

        self.count.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Deletes `value`. Returns `false` if no unmarked node with that value was found.
    pub fn delete(&self, value: i64) -> bool {
        let guard = &epoch::pin();
        let backoff = Backoff::new();

        loop {
            let (a, b) = self.find(value, guard);
            let victim = match unsafe { b.as_ref() } {
                Some(node) if node.value() == value => node,
                _ => return false,
            };

            {
                let _victim_lock = victim.lock();
                if !victim.is_deleted() {
                    let _pred_lock = a.lock();
                    if a.next(guard) == b && !a.is_deleted() {
                        victim.mark_deleted();
                        a.set_next(victim.next(guard));
                        // `b` is unreachable from `head` now; threads already holding it are
                        // pinned.
                        unsafe { guard.defer_destroy(b) };
                        break;
                    }
                    trace!("delete({}): predecessor changed, rescanning", value);
                } else {
                    trace!("delete({}): lost race to another deleter, rescanning", value);
                }
            }

            backoff.snooze();
        }

        self.count.fetch_sub(1, Ordering::AcqRel);
        true
    }

    /// Calls `visit` on each unmarked value in ascending order until it returns `false`.
    ///
    /// No snapshot is taken: concurrent inserts and deletes may or may not be observed.
    pub fn range<F>(&self, mut visit: F)
    where
        F: FnMut(i64) -> bool,
    {
        let guard = &epoch::pin();
        let mut curr = self.head.next(guard);
        while let Some(node) = unsafe { curr.as_ref() } {
            if !node.is_deleted() && !visit(node.value()) {
                break;
            }
            curr = node.next(guard);
        }
    }

    /// Approximate number of elements. Exact only when no mutation is in flight.
    pub fn len(&self) -> usize {
        let count = self.count.load(Ordering::Acquire);
        if count < 0 {
            0
        } else {
            count as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collects the current contents in ascending order.
    pub fn to_vec(&self) -> Vec<i64> {
        let mut values = Vec::new();
        self.range(|value| {
            values.push(value);
            true
        });
        values
    }

    /// Checks the structural invariants. Meaningful only at a quiescent point; under concurrent
    /// mutation it may report spurious errors.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let guard = &epoch::pin();
        let mut prev: Option<i64> = None;
        let mut counted = 0usize;

        let mut curr = self.head.next(guard);
        while let Some(node) = unsafe { curr.as_ref() } {
            if node.is_deleted() {
                return Err(InvariantError::MarkedReachable {
                    value: node.value(),
                });
            }
            if let Some(prev) = prev {
                if prev >= node.value() {
                    return Err(InvariantError::Unsorted {
                        prev,
                        next: node.value(),
                    });
                }
            }
            prev = Some(node.value());
            counted += 1;
            curr = node.next(guard);
        }

        let reported = self.count.load(Ordering::Acquire);
        if reported != counted as isize {
            return Err(InvariantError::CountMismatch { reported, counted });
        }
        Ok(())
    }
}

impl Drop for OrderedIntSet {
    /// Frees every node still linked from `head`. Unlinked nodes were already retired.
    fn drop(&mut self) {
        let mut freed = 0usize;
        unsafe {
            let guard = epoch::unprotected();
            let mut curr = self.head.next(guard);
            while !curr.is_null() {
                let next = curr.deref().next(guard);
                drop(curr.into_owned());
                freed += 1;
                curr = next;
            }
        }
        debug!("dropped ordered int set, freed {} nodes", freed);
    }
}

impl fmt::Debug for OrderedIntSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.to_vec()).finish()
    }
}

impl Extend<i64> for OrderedIntSet {
    fn extend<I: IntoIterator<Item = i64>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

impl FromIterator<i64> for OrderedIntSet {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set() {
        let set = OrderedIntSet::new();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
        assert!(!set.contains(0));
        assert!(!set.delete(0));
        assert!(set.to_vec().is_empty());
        assert_eq!(set.check_invariants(), Ok(()));
    }

    #[test]
    fn insert_delete_scenario() {
        let set = OrderedIntSet::new();

        assert!(set.insert(5));
        assert!(set.insert(3));
        assert!(!set.insert(5));
        assert_eq!(set.to_vec(), vec![3, 5]);
        assert_eq!(set.len(), 2);

        assert!(set.delete(3));
        assert_eq!(set.to_vec(), vec![5]);
        assert_eq!(set.len(), 1);

        assert!(!set.delete(3));
        assert!(!set.contains(3));
        assert!(set.contains(5));
        assert_eq!(set.check_invariants(), Ok(()));
    }

    #[test]
    fn repeated_insert_and_delete() {
        let set = OrderedIntSet::new();
        assert!(set.insert(7));
        assert!(!set.insert(7));
        assert!(set.contains(7));
        assert!(set.delete(7));
        assert!(!set.delete(7));
        assert!(!set.contains(7));
        assert!(set.insert(7));
        assert!(set.contains(7));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn extreme_values() {
        let set = OrderedIntSet::new();
        assert!(set.insert(i64::MAX));
        assert!(set.insert(i64::MIN));
        assert!(set.insert(0));
        assert!(!set.insert(i64::MIN));
        assert_eq!(set.to_vec(), vec![i64::MIN, 0, i64::MAX]);
        assert!(set.delete(i64::MIN));
        assert!(set.delete(i64::MAX));
        assert_eq!(set.to_vec(), vec![0]);
        assert_eq!(set.check_invariants(), Ok(()));
    }

    #[test]
    fn range_stops_early() {
        let set: OrderedIntSet = (1..=10).rev().collect();
        let mut seen = Vec::new();
        set.range(|value| {
            seen.push(value);
            value < 4
        });
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    #[test]
    fn from_iter_deduplicates() {
        let set: OrderedIntSet = vec![4, 1, 4, 2, 1].into_iter().collect();
        assert_eq!(set.to_vec(), vec![1, 2, 4]);
        assert_eq!(set.len(), 3);
        assert_eq!(format!("{:?}", set), "{1, 2, 4}");
    }

    #[test]
    fn count_mismatch_is_reported() {
        let set: OrderedIntSet = (0..3).collect();
        set.count.fetch_add(1, Ordering::AcqRel);
        assert_eq!(
            set.check_invariants(),
            Err(InvariantError::CountMismatch {
                reported: 4,
                counted: 3
            })
        );
    }

    #[test]
    fn negative_count_reads_as_zero() {
        let set = OrderedIntSet::new();
        set.count.fetch_sub(1, Ordering::AcqRel);
        assert_eq!(set.len(), 0);
        assert!(set.is_empty());
    }

    #[test]
    fn drop_populated_set() {
        let set: OrderedIntSet = (0..1000).collect();
        for value in (0..1000).step_by(2) {
            assert!(set.delete(value));
        }
        assert_eq!(set.len(), 500);
        drop(set);
    }

    #[test]
    fn range_skips_marked_node_still_linked() {
        let set: OrderedIntSet = vec![1, 5, 9].into_iter().collect();
        let guard = &epoch::pin();
        let (a, b) = set.find(5, guard);
        let victim = unsafe { b.deref() };

        {
            let _victim_lock = victim.lock();
            let _pred_lock = a.lock();
            victim.mark_deleted();

            assert!(a.next(guard) == b);
            assert!(!set.contains(5));
            assert_eq!(set.to_vec(), vec![1, 9]);
            assert_eq!(
                set.check_invariants(),
                Err(InvariantError::MarkedReachable { value: 5 })
            );

            a.set_next(victim.next(guard));
            unsafe { guard.defer_destroy(b) };
        }
        set.count.fetch_sub(1, Ordering::AcqRel);

        assert_eq!(set.to_vec(), vec![1, 9]);
        assert_eq!(set.check_invariants(), Ok(()));
    }

    #[test]
    fn insert_waits_out_marked_equal_node() {
        use core::sync::atomic::AtomicBool;
        use core::time::Duration;
        use crossbeam_utils::thread;

        let set: OrderedIntSet = vec![1, 5, 9].into_iter().collect();
        let done = AtomicBool::new(false);
        let guard = &epoch::pin();
        let (a, b) = set.find(5, guard);
        let victim = unsafe { b.deref() };

        let victim_lock = victim.lock();
        let pred_lock = a.lock();
        victim.mark_deleted();

        thread::scope(|s| {
            let inserter = s.spawn(|_| {
                let inserted = set.insert(5);
                done.store(true, Ordering::Release);
                inserted
            });

            // While the marked node is linked the insert can neither succeed nor fail.
            std::thread::sleep(Duration::from_millis(50));
            let finished_early = done.load(Ordering::Acquire);
            let visible_while_marked = set.contains(5);

            a.set_next(victim.next(guard));
            drop(pred_lock);
            drop(victim_lock);
            unsafe { guard.defer_destroy(b) };
            set.count.fetch_sub(1, Ordering::AcqRel);

            assert!(inserter.join().unwrap());
            assert!(!finished_early);
            assert!(!visible_while_marked);
        })
        .unwrap();

        assert!(set.contains(5));
        assert_eq!(set.to_vec(), vec![1, 5, 9]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.check_invariants(), Ok(()));
    }
}
