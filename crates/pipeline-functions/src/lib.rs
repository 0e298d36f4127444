//! Pipeline Functions
//!
//! Built-in functions for `function` nodes of the pipeline engine. Every
//! function registers itself at link time, so
//! `FunctionRegistry::with_builtins()` sees them once this crate is linked.
//!
//! # Categories
//!
//! - **Text**: joining lists into text, splitting text into lists, merging
//! - **JSON**: parsing model output, path extraction, plucking keys
//! - **Control**: retry predicates

mod args;
pub mod control;
pub mod json;
pub mod text;

pub use control::*;
pub use json::*;
pub use text::*;

/// Names of every function this crate registers
pub const BUILTIN_FUNCTIONS: &[&str] = &[
    JoinFunction::NAME,
    PluckFunction::NAME,
    SplitLinesFunction::NAME,
    ParseJsonFunction::NAME,
    JsonPathFunction::NAME,
    MergeFunction::NAME,
    NonEmptyPredicate::NAME,
];
