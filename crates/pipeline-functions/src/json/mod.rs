//! JSON functions
//!
//! Functions that pull structured data out of LLM text and JSON values.

mod json_path;
mod parse_json;
mod pluck;

pub use json_path::JsonPathFunction;
pub use parse_json::ParseJsonFunction;
pub use pluck::PluckFunction;
