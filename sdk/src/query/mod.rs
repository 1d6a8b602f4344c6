//! Query-string plumbing
//!
//! Converts dot attribute paths to bracket-notation query keys and
//! accumulates filter/sort/paging conditions for outbound requests.

pub mod builder;
pub mod path;

pub use builder::QueryBuilder;
pub use path::{AttributePath, root, suffix, to_dot_path, to_query_key};
