use thiserror::Error;

/// Structural violation found by `OrderedIntSet::check_invariants`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvariantError {
    #[error("values out of order: {prev} is followed by {next}")]
    Unsorted { prev: i64, next: i64 },

    #[error("node {value} is marked deleted but still linked")]
    MarkedReachable { value: i64 },

    #[error("len reports {reported} but {counted} nodes are linked")]
    CountMismatch { reported: isize, counted: usize },
}
