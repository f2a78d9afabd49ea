//! Shared utilities.

mod dot;

pub use dot::{escape_dot, graph_to_dot};
