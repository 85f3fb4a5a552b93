//! Concurrent ordered integer set on a singly linked list with per-node locks and lock-free reads.

mod error;
mod int_list;
mod node;
mod ordered_int_set;

pub use error::InvariantError;
pub use int_list::{new_int_list, IntList};
pub use ordered_int_set::OrderedIntSet;
