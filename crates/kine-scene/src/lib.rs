//! Kine Scene - Node hierarchy bound to the component store
//!
//! Scene nodes live in an arena ([`SceneGraph`]) addressed by generational
//! [`NodeId`]s. Each node carries a boxed [`Node`] behaviour and, once the
//! tree is finalized, one entity in the [`SceneTree`]'s world.

mod error;
mod graph;
mod node;
mod tree;

pub use error::SceneError;
pub use graph::SceneGraph;
pub use node::{AsAny, EmptyNode, Node, NodeData, NodeId};
pub use tree::{NodeContext, SceneTree};
