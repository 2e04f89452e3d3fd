use crate::node::{Node, NodeData, NodeId};

struct Slot {
    generation: u32,
    data: Option<NodeData>,
}

/// Arena of scene nodes. Links between nodes are stored as [`NodeId`]s, so
/// a node's parent is never an owning reference.
///
/// Structural edits that have lifecycle consequences (attach, detach, entity
/// teardown) go through [`SceneTree`](crate::SceneTree); the graph itself
/// exposes lookup and per-node flags.
#[derive(Default)]
pub struct SceneGraph {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    len: usize,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new, unlinked node.
    pub(crate) fn insert<N: Node>(&mut self, name: impl Into<String>, behavior: N) -> NodeId {
        let data = NodeData::new(name.into(), behavior);
        self.len += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.data = Some(data);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                data: Some(data),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    /// Drop a node's slot. Links to and from it must already be gone.
    pub(crate) fn release(&mut self, id: NodeId) -> Option<NodeData> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let data = slot.data.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
        self.len -= 1;
        Some(data)
    }

    /// Append `child` to `parent`'s children. `child` must be unlinked.
    pub(crate) fn link(&mut self, parent: NodeId, child: NodeId) {
        if let Some(data) = self.node_mut(child) {
            data.parent = Some(parent);
        }
        if let Some(data) = self.node_mut(parent) {
            data.children.push(child);
        }
    }

    /// Detach `child` from its parent. Returns the former parent.
    pub(crate) fn unlink(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.node_mut(child)?.parent.take()?;
        if let Some(data) = self.node_mut(parent) {
            data.children.retain(|&c| c != child);
        }
        Some(parent)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_ref())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_mut())
    }

    /// Typed access to a node's behaviour.
    pub fn get<T: Node>(&self, id: NodeId) -> Option<&T> {
        self.node(id)?.behavior::<T>()
    }

    pub fn get_mut<T: Node>(&mut self, id: NodeId) -> Option<&mut T> {
        self.node_mut(id)?.behavior_mut::<T>()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(NodeData::children).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `ancestor` lies on the parent chain of `node` (or is `node`).
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Resolve a relative path from `from`.
    ///
    /// Segments are separated by `/`; `.` stays put, `..` moves to the parent
    /// and any other segment selects the first child with that name. Empty
    /// segments are ignored, so a leading `/` is not an absolute path.
    pub fn find(&self, from: NodeId, path: &str) -> Option<NodeId> {
        if !self.contains(from) {
            return None;
        }

        let mut current = from;
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => current = self.parent(current)?,
                name => {
                    current = self
                        .children(current)
                        .iter()
                        .copied()
                        .find(|&child| self.node(child).is_some_and(|n| n.name() == name))?;
                }
            }
        }
        Some(current)
    }

    /// First node named `name` in the subtree below `from`, depth-first.
    pub fn find_descendant(&self, from: NodeId, name: &str) -> Option<NodeId> {
        self.subtree(from)
            .into_iter()
            .skip(1)
            .find(|&id| self.node(id).is_some_and(|n| n.name() == name))
    }

    /// Every node in `from`'s subtree (inclusive) whose behaviour is a `T`,
    /// in depth-first pre-order.
    pub fn find_all<T: Node>(&self, from: NodeId) -> Vec<NodeId> {
        self.subtree(from)
            .into_iter()
            .filter(|&id| self.node(id).is_some_and(NodeData::is::<T>))
            .collect()
    }

    pub fn find_first<T: Node>(&self, from: NodeId) -> Option<NodeId> {
        self.subtree(from)
            .into_iter()
            .find(|&id| self.node(id).is_some_and(NodeData::is::<T>))
    }

    /// Every node in `from`'s subtree (inclusive) that belongs to `group`.
    pub fn nodes_in_group(&self, from: NodeId, group: &str) -> Vec<NodeId> {
        self.subtree(from)
            .into_iter()
            .filter(|&id| self.node(id).is_some_and(|n| n.is_in_group(group)))
            .collect()
    }

    /// `from` and all of its descendants in depth-first pre-order.
    pub fn subtree(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.contains(from) {
            return out;
        }

        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Names from the topmost ancestor down to `id`, joined by `/`.
    pub fn path_of(&self, id: NodeId) -> Option<String> {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            let data = self.node(node)?;
            names.push(data.name());
            current = data.parent();
        }
        names.reverse();
        Some(names.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::EmptyNode;

    struct Pipe;
    impl Node for Pipe {}

    fn sample() -> (SceneGraph, NodeId, NodeId, NodeId, NodeId) {
        let mut graph = SceneGraph::new();
        let root = graph.insert("root", EmptyNode);
        let a = graph.insert("a", Pipe);
        let b = graph.insert("b", EmptyNode);
        let c = graph.insert("c", Pipe);
        graph.link(root, a);
        graph.link(root, b);
        graph.link(b, c);
        (graph, root, a, b, c)
    }

    #[test]
    fn relative_paths() {
        let (graph, root, a, b, c) = sample();
        assert_eq!(graph.find(root, "b/c"), Some(c));
        assert_eq!(graph.find(c, "../../a"), Some(a));
        assert_eq!(graph.find(c, ".."), Some(b));
        assert_eq!(graph.find(b, "./c"), Some(c));
        assert_eq!(graph.find(b, ""), Some(b));
        assert_eq!(graph.find(root, "missing"), None);
        assert_eq!(graph.find(root, ".."), None);
    }

    #[test]
    fn first_child_with_name_wins() {
        let mut graph = SceneGraph::new();
        let root = graph.insert("root", EmptyNode);
        let first = graph.insert("dup", EmptyNode);
        let second = graph.insert("dup", EmptyNode);
        graph.link(root, first);
        graph.link(root, second);
        assert_eq!(graph.find(root, "dup"), Some(first));
    }

    #[test]
    fn typed_search_is_preorder() {
        let (graph, root, a, _, c) = sample();
        assert_eq!(graph.find_all::<Pipe>(root), vec![a, c]);
        assert_eq!(graph.find_first::<Pipe>(root), Some(a));
        assert_eq!(graph.find_all::<EmptyNode>(root).len(), 2);
    }

    #[test]
    fn descendants_and_paths() {
        let (graph, root, _, b, c) = sample();
        assert_eq!(graph.find_descendant(root, "c"), Some(c));
        assert_eq!(graph.find_descendant(c, "c"), None);
        assert_eq!(graph.path_of(c).as_deref(), Some("root/b/c"));
        assert!(graph.is_ancestor(root, c));
        assert!(graph.is_ancestor(b, b));
        assert!(!graph.is_ancestor(c, b));
    }

    #[test]
    fn group_membership() {
        let (mut graph, root, a, _, c) = sample();
        graph.node_mut(c).unwrap().add_to_group("obstacles");
        graph.node_mut(a).unwrap().add_to_group("obstacles");
        assert_eq!(graph.nodes_in_group(root, "obstacles"), vec![a, c]);
        assert!(graph.nodes_in_group(root, "nobody").is_empty());
    }

    #[test]
    fn unlink_and_release() {
        let (mut graph, root, a, b, _) = sample();
        assert_eq!(graph.unlink(a), Some(root));
        assert_eq!(graph.children(root), &[b]);
        assert_eq!(graph.parent(a), None);

        assert!(graph.release(a).is_some());
        assert!(!graph.contains(a));
        assert_eq!(graph.len(), 3);

        let reused = graph.insert("new", EmptyNode);
        assert_eq!(reused.index, a.index);
        assert_ne!(reused, a);
        assert!(graph.node(a).is_none());
    }
}
