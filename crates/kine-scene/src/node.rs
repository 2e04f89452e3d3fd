use std::any::{type_name, Any, TypeId};
use std::collections::HashSet;
use std::fmt;

use kine_ecs::Entity;

use crate::tree::NodeContext;

/// Upcast helper so boxed nodes can be downcast to their concrete type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Behaviour of a scene node. Every hook has an empty default.
///
/// Hooks run with the node's own behaviour checked out of the graph, so
/// typed lookups of the running node through [`NodeContext`] return `None`.
pub trait Node: AsAny + 'static {
    /// The node's entity now exists and it is linked into the tree.
    /// Typically used to attach components.
    fn on_attach(&mut self, _ctx: &mut NodeContext<'_>) {}

    /// The node is leaving the tree; its entity is still valid.
    fn on_detach(&mut self, _ctx: &mut NodeContext<'_>) {}

    /// Runs exactly once, after the whole tree has been attached.
    fn init(&mut self, _ctx: &mut NodeContext<'_>) {}

    /// Variable-rate update.
    fn update(&mut self, _ctx: &mut NodeContext<'_>, _dt: f32) {}

    /// Fixed-rate update.
    fn fixed_update(&mut self, _ctx: &mut NodeContext<'_>, _dt: f32) {}
}

/// A node with no behaviour of its own, used for grouping.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyNode;

impl Node for EmptyNode {}

/// Generational handle to a node in a [`SceneGraph`](crate::SceneGraph).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Per-node state kept by the graph.
pub struct NodeData {
    name: String,
    enabled: bool,
    pause_mode: bool,
    groups: HashSet<String>,
    queued_for_deletion: bool,
    pub(crate) entity: Option<Entity>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) initialized: bool,
    /// Checked out while one of the node's hooks is running.
    pub(crate) behavior: Option<Box<dyn Node>>,
    type_id: TypeId,
    type_name: &'static str,
}

impl NodeData {
    pub(crate) fn new<N: Node>(name: String, behavior: N) -> Self {
        Self {
            name,
            enabled: true,
            pause_mode: false,
            groups: HashSet::new(),
            queued_for_deletion: false,
            entity: None,
            parent: None,
            children: Vec::new(),
            initialized: false,
            behavior: Some(Box::new(behavior)),
            type_id: TypeId::of::<N>(),
            type_name: type_name::<N>(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// A disabled node is skipped by update traversals together with its subtree.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn pause_mode(&self) -> bool {
        self.pause_mode
    }

    /// A paused node skips its own update hooks; its children are still visited.
    pub fn set_pause_mode(&mut self, paused: bool) {
        self.pause_mode = paused;
    }

    pub fn add_to_group(&mut self, group: impl Into<String>) {
        self.groups.insert(group.into());
    }

    pub fn remove_from_group(&mut self, group: &str) -> bool {
        self.groups.remove(group)
    }

    pub fn is_in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(String::as_str)
    }

    /// Mark for removal by the next deferred-deletion pass.
    pub fn queue_free(&mut self) {
        self.queued_for_deletion = true;
    }

    pub fn is_queued_for_deletion(&self) -> bool {
        self.queued_for_deletion
    }

    /// The bound entity, once the node has been attached.
    pub fn entity(&self) -> Option<Entity> {
        self.entity
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_attached(&self) -> bool {
        self.entity.is_some()
    }

    /// Whether the node's behaviour is of concrete type `T`.
    pub fn is<T: Node>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Type name of the node's behaviour.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn behavior<T: Node>(&self) -> Option<&T> {
        self.behavior.as_deref()?.as_any().downcast_ref::<T>()
    }

    pub(crate) fn behavior_mut<T: Node>(&mut self) -> Option<&mut T> {
        self.behavior.as_deref_mut()?.as_any_mut().downcast_mut::<T>()
    }
}

impl fmt::Debug for NodeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeData")
            .field("name", &self.name)
            .field("type", &self.type_name)
            .field("enabled", &self.enabled)
            .field("pause_mode", &self.pause_mode)
            .field("queued_for_deletion", &self.queued_for_deletion)
            .field("entity", &self.entity)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker(u8);
    impl Node for Marker {}

    #[test]
    fn defaults() {
        let data = NodeData::new("n".into(), EmptyNode);
        assert_eq!(data.name(), "n");
        assert!(data.enabled());
        assert!(!data.pause_mode());
        assert!(!data.is_queued_for_deletion());
        assert!(!data.is_attached());
        assert!(data.is::<EmptyNode>());
        assert!(!data.is::<Marker>());
    }

    #[test]
    fn groups() {
        let mut data = NodeData::new("n".into(), EmptyNode);
        data.add_to_group("enemies");
        data.add_to_group("enemies");
        assert!(data.is_in_group("enemies"));
        assert_eq!(data.groups().count(), 1);
        assert!(data.remove_from_group("enemies"));
        assert!(!data.remove_from_group("enemies"));
        assert!(!data.is_in_group("enemies"));
    }

    #[test]
    fn typed_behavior_access() {
        let mut data = NodeData::new("m".into(), Marker(3));
        assert_eq!(data.behavior::<Marker>().map(|m| m.0), Some(3));
        assert!(data.behavior::<EmptyNode>().is_none());
        data.behavior_mut::<Marker>().unwrap().0 = 9;
        assert_eq!(data.behavior::<Marker>().map(|m| m.0), Some(9));
    }
}
