use crate::node::NodeId;

/// Errors from structural edits to the scene hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    #[error("node {0} does not exist")]
    NodeNotFound(NodeId),

    #[error("node {child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },

    #[error("moving {node} under {new_parent} would create a cycle")]
    WouldCycle { node: NodeId, new_parent: NodeId },

    #[error("the root node cannot be reparented")]
    RootReparent,
}
