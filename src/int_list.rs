//! Object-safe interface over ordered integer sets.

use super::ordered_int_set::OrderedIntSet;

/// Thread-safe ordered set of `i64`, usable behind `dyn IntList`.
pub trait IntList: Send + Sync {
    /// Returns `true` if `value` is present.
    fn contains(&self, value: i64) -> bool;

    /// Returns `true` if `value` was absent and is now present.
    fn insert(&self, value: i64) -> bool;

    /// Returns `true` if `value` was present and is now removed.
    fn delete(&self, value: i64) -> bool;

    /// Visits values in ascending order until `visit` returns `false`.
    fn range(&self, visit: &mut dyn FnMut(i64) -> bool);

    /// Approximate number of elements.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IntList for OrderedIntSet {
    fn contains(&self, value: i64) -> bool {
        OrderedIntSet::contains(self, value)
    }

    fn insert(&self, value: i64) -> bool {
        OrderedIntSet::insert(self, value)
    }

    fn delete(&self, value: i64) -> bool {
        OrderedIntSet::delete(self, value)
    }

    fn range(&self, visit: &mut dyn FnMut(i64) -> bool) {
        OrderedIntSet::range(self, visit)
    }

    fn len(&self) -> usize {
        OrderedIntSet::len(self)
    }
}

/// Returns an empty set behind the `IntList` interface.
pub fn new_int_list() -> Box<dyn IntList> {
    Box::new(OrderedIntSet::new())
}
