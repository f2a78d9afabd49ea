//! Anonymous-code partitioning and ownership attribution.
//!
//! Dynamically generated code arrives as one flat graph per trace: basic blocks
//! with synthetic tags plus the module-boundary nodes through which static code
//! reached them. This module carves that graph into ownership-attributable units:
//!
//! 1. [`MaximalSubgraphs`] partitions the flat graph into its maximal
//!    weakly-connected components of application code, cloning boundary nodes per
//!    component and rewriting the crossing edges onto the clones.
//! 2. [`OwnershipResolver`] attributes each component to the unit that both
//!    generated the code and executes into it, discarding components whose
//!    ownership cannot be established unambiguously.
//!
//! # Examples
//!
//! ```rust,ignore
//! use tracegraph::anonymous::{MaximalSubgraphs, OwnershipResolver};
//!
//! let subgraphs = MaximalSubgraphs::partition(&flat_anonymous_graph)?;
//! let owned = OwnershipResolver::new(&registry).resolve_all(subgraphs);
//! for graph in &owned {
//!     println!("{} -> {:?}", graph.graph().name(), graph.owner());
//! }
//! ```

mod ownership;
mod subgraphs;

pub use ownership::OwnershipResolver;
pub use subgraphs::MaximalSubgraphs;
