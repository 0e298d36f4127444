//! Control functions
//!
//! Predicates that steer retry nodes.

mod non_empty;

pub use non_empty::NonEmptyPredicate;
