//! Text functions
//!
//! Functions that turn lists into text and text into lists.

mod join;
mod merge;
mod split_lines;

pub use join::JoinFunction;
pub use merge::MergeFunction;
pub use split_lines::SplitLinesFunction;
