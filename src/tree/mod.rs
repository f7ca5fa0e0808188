//! Shared directory tree: nodes, the path index, and local directory reads.

pub mod model;
pub mod node;
pub mod path;
pub mod walker;

pub use model::{NodeId, PathIndex, Tree};
pub use node::FileNode;
