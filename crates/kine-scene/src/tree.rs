use kine_ecs::{Component, DefaultBundle, Entity, World};
use tracing::{debug, info, trace};

use crate::error::SceneError;
use crate::graph::SceneGraph;
use crate::node::{Node, NodeData, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Nodes are being assembled; nothing is attached yet.
    Building,
    /// `finalize` is running its attach and init passes.
    Attaching,
    Ready,
}

#[derive(Clone, Copy)]
enum Pass {
    Update,
    FixedUpdate,
}

/// What a node hook can reach: its own node and entity, the rest of the
/// graph, and the world.
pub struct NodeContext<'a> {
    id: NodeId,
    entity: Entity,
    phase: Phase,
    graph: &'a mut SceneGraph,
    world: &'a mut World,
}

impl<'a> NodeContext<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The entity bound to this node.
    pub fn entity(&self) -> Entity {
        self.entity
    }

    pub fn node(&self) -> Option<&NodeData> {
        self.graph.node(self.id)
    }

    pub fn node_mut(&mut self) -> Option<&mut NodeData> {
        self.graph.node_mut(self.id)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.graph.parent(self.id)
    }

    pub fn graph(&self) -> &SceneGraph {
        &*self.graph
    }

    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut *self.graph
    }

    pub fn world(&self) -> &World {
        &*self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut *self.world
    }

    /// Component on this node's entity. Fatal if absent.
    pub fn get<T: Component>(&self) -> &T {
        self.world.get(self.entity)
    }

    pub fn get_mut<T: Component>(&mut self) -> &mut T {
        self.world.get_mut(self.entity)
    }

    pub fn has<T: Component>(&self) -> bool {
        self.world.has::<T>(self.entity)
    }

    pub fn add<T: Component>(&mut self, component: T) -> &mut T {
        self.world.add(self.entity, component)
    }

    /// Add default-constructed components of `B` that the entity lacks.
    pub fn require<B: DefaultBundle>(&mut self) {
        self.world.require::<B>(self.entity);
    }

    /// Resolve a path relative to this node.
    pub fn find(&self, path: &str) -> Option<NodeId> {
        self.graph.find(self.id, path)
    }

    /// Add a child to this node. In a ready tree the child is attached and
    /// initialized before this returns.
    pub fn add_child<N: Node>(&mut self, name: impl Into<String>, node: N) -> NodeId {
        let child = self.graph.insert(name, node);
        self.graph.link(self.id, child);
        activate(self.graph, self.world, self.phase, child);
        child
    }

    /// Mark this node for the next deferred-deletion pass.
    pub fn queue_free(&mut self) {
        if let Some(node) = self.graph.node_mut(self.id) {
            node.queue_free();
        }
    }
}

/// Owns the node graph and the world the nodes' entities live in, and
/// drives the node lifecycle.
///
/// ```text
/// Building --finalize--> Ready
/// ```
///
/// `finalize` attaches every node (entity created, `on_attach`) parent
/// first, then runs `init` over the whole tree in the same order. Nodes
/// linked into a ready tree go through both steps on the spot.
pub struct SceneTree {
    graph: SceneGraph,
    world: World,
    root: Option<NodeId>,
    phase: Phase,
}

impl SceneTree {
    pub fn new() -> Self {
        Self::with_world(World::new())
    }

    pub fn with_world(world: World) -> Self {
        Self {
            graph: SceneGraph::new(),
            world,
            root: None,
            phase: Phase::Building,
        }
    }

    /// Create the root node. Any previous root is torn down with its subtree.
    pub fn create<N: Node>(&mut self, name: impl Into<String>, node: N) -> NodeId {
        if let Some(old) = self.root.take() {
            debug!(root = %old, "replacing scene root");
            teardown(&mut self.graph, &mut self.world, self.phase, old);
        }

        let id = self.graph.insert(name, node);
        self.root = Some(id);
        if self.phase == Phase::Ready {
            attach_subtree(&mut self.graph, &mut self.world, self.phase, id);
            init_subtree(&mut self.graph, &mut self.world, self.phase, id);
        }
        id
    }

    /// Create a node outside the tree. It stays inert until it is
    /// reparented under an attached node.
    pub fn spawn<N: Node>(&mut self, name: impl Into<String>, node: N) -> NodeId {
        self.graph.insert(name, node)
    }

    pub fn add_child<N: Node>(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        node: N,
    ) -> Result<NodeId, SceneError> {
        if !self.graph.contains(parent) {
            return Err(SceneError::NodeNotFound(parent));
        }

        let child = self.graph.insert(name, node);
        self.graph.link(parent, child);
        activate(&mut self.graph, &mut self.world, self.phase, child);
        Ok(child)
    }

    /// Unlink `child` from `parent`. With `free` the child's subtree is torn
    /// down; otherwise it is kept detached, entities included.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId, free: bool) -> Result<(), SceneError> {
        if !self.graph.contains(parent) {
            return Err(SceneError::NodeNotFound(parent));
        }
        if self.graph.parent(child) != Some(parent) {
            return Err(SceneError::NotAChild { parent, child });
        }

        self.graph.unlink(child);
        if free {
            teardown(&mut self.graph, &mut self.world, self.phase, child);
        }
        Ok(())
    }

    /// Move `node` under `new_parent`, appending it to the new child list.
    pub fn reparent(&mut self, node: NodeId, new_parent: NodeId) -> Result<(), SceneError> {
        for id in [node, new_parent] {
            if !self.graph.contains(id) {
                return Err(SceneError::NodeNotFound(id));
            }
        }
        if self.root == Some(node) {
            return Err(SceneError::RootReparent);
        }
        if self.graph.is_ancestor(node, new_parent) {
            return Err(SceneError::WouldCycle { node, new_parent });
        }

        self.graph.unlink(node);
        self.graph.link(new_parent, node);
        activate(&mut self.graph, &mut self.world, self.phase, node);
        Ok(())
    }

    /// Tear down `node` and its subtree immediately.
    pub fn free_node(&mut self, node: NodeId) -> Result<(), SceneError> {
        if !self.graph.contains(node) {
            return Err(SceneError::NodeNotFound(node));
        }
        if self.root == Some(node) {
            self.root = None;
        }

        self.graph.unlink(node);
        teardown(&mut self.graph, &mut self.world, self.phase, node);
        Ok(())
    }

    /// Mark `node` for the next [`remove_queued_objs`](Self::remove_queued_objs).
    pub fn queue_free(&mut self, node: NodeId) -> bool {
        match self.graph.node_mut(node) {
            Some(data) => {
                data.queue_free();
                true
            }
            None => false,
        }
    }

    /// Attach and initialize the whole tree. Does nothing once ready, or
    /// while there is no root to attach.
    pub fn finalize(&mut self) {
        if self.phase == Phase::Ready {
            return;
        }
        let Some(root) = self.root else {
            debug!("finalize skipped, scene tree has no root");
            return;
        };

        self.phase = Phase::Attaching;
        attach_subtree(&mut self.graph, &mut self.world, self.phase, root);
        init_subtree(&mut self.graph, &mut self.world, self.phase, root);
        self.phase = Phase::Ready;

        info!(nodes = self.graph.len(), entities = self.world.entity_count(), "scene tree ready");
    }

    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    /// Variable-rate pass over the tree, parent before children.
    pub fn update(&mut self, dt: f32) {
        self.traverse(Pass::Update, dt);
    }

    /// Fixed-rate pass over the tree, parent before children.
    pub fn fixed_update(&mut self, dt: f32) {
        self.traverse(Pass::FixedUpdate, dt);
    }

    fn traverse(&mut self, pass: Pass, dt: f32) {
        if self.phase != Phase::Ready {
            return;
        }
        if let Some(root) = self.root {
            update_subtree(&mut self.graph, &mut self.world, self.phase, root, pass, dt);
        }
    }

    /// Tear down every node queued for deletion, with its subtree.
    /// Returns the number of nodes removed.
    pub fn remove_queued_objs(&mut self) -> usize {
        let Some(root) = self.root else {
            return 0;
        };

        let removed = if self.graph.node(root).is_some_and(NodeData::is_queued_for_deletion) {
            self.root = None;
            teardown(&mut self.graph, &mut self.world, self.phase, root)
        } else {
            sweep(&mut self.graph, &mut self.world, self.phase, root)
        };

        if removed > 0 {
            debug!(removed, "removed queued nodes");
        }
        removed
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Resolve a path relative to the root.
    pub fn get_node(&self, path: &str) -> Option<NodeId> {
        self.graph.find(self.root?, path)
    }

    pub fn find(&self, from: NodeId, path: &str) -> Option<NodeId> {
        self.graph.find(from, path)
    }

    /// Every node of type `T` in the tree, pre-order.
    pub fn find_all<T: Node>(&self) -> Vec<NodeId> {
        self.root.map(|root| self.graph.find_all::<T>(root)).unwrap_or_default()
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.graph.node(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.graph.node_mut(id)
    }

    pub fn get<T: Node>(&self, id: NodeId) -> Option<&T> {
        self.graph.get(id)
    }

    pub fn get_mut<T: Node>(&mut self, id: NodeId) -> Option<&mut T> {
        self.graph.get_mut(id)
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Borrow the graph and the world at the same time, e.g. to hand a
    /// node's behaviour the world it should act on.
    pub fn parts_mut(&mut self) -> (&mut SceneGraph, &mut World) {
        (&mut self.graph, &mut self.world)
    }
}

impl Default for SceneTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one hook with the node's behaviour checked out. Skips nodes that
/// are unattached or already inside one of their own hooks.
fn run_hook(
    graph: &mut SceneGraph,
    world: &mut World,
    phase: Phase,
    id: NodeId,
    hook: impl FnOnce(&mut dyn Node, &mut NodeContext<'_>),
) {
    let Some(data) = graph.node_mut(id) else {
        return;
    };
    let Some(entity) = data.entity else {
        return;
    };
    let Some(mut behavior) = data.behavior.take() else {
        return;
    };

    {
        let mut ctx = NodeContext {
            id,
            entity,
            phase,
            graph: &mut *graph,
            world: &mut *world,
        };
        hook(&mut *behavior, &mut ctx);
    }

    if let Some(data) = graph.node_mut(id) {
        data.behavior = Some(behavior);
    }
}

/// Attach a freshly linked node if its parent is already live.
fn activate(graph: &mut SceneGraph, world: &mut World, phase: Phase, id: NodeId) {
    if phase == Phase::Building {
        return;
    }
    let parent_attached = graph
        .parent(id)
        .and_then(|parent| graph.node(parent))
        .is_some_and(NodeData::is_attached);
    if !parent_attached {
        return;
    }

    attach_subtree(graph, world, phase, id);
    if phase == Phase::Ready {
        init_subtree(graph, world, phase, id);
    }
}

fn attach_subtree(graph: &mut SceneGraph, world: &mut World, phase: Phase, id: NodeId) {
    let Some(data) = graph.node_mut(id) else {
        return;
    };
    if data.entity.is_none() {
        let entity = world.create();
        data.entity = Some(entity);
        trace!(node = %id, %entity, "attached");
        run_hook(graph, world, phase, id, |node, ctx| node.on_attach(ctx));
    }

    let children = graph.children(id).to_vec();
    for child in children {
        attach_subtree(graph, world, phase, child);
    }
}

fn init_subtree(graph: &mut SceneGraph, world: &mut World, phase: Phase, id: NodeId) {
    let Some(data) = graph.node_mut(id) else {
        return;
    };
    if !data.initialized && data.is_attached() {
        data.initialized = true;
        run_hook(graph, world, phase, id, |node, ctx| node.init(ctx));
    }

    let children = graph.children(id).to_vec();
    for child in children {
        init_subtree(graph, world, phase, child);
    }
}

fn update_subtree(graph: &mut SceneGraph, world: &mut World, phase: Phase, id: NodeId, pass: Pass, dt: f32) {
    let Some(data) = graph.node(id) else {
        return;
    };
    if !data.enabled() {
        return;
    }

    if !data.pause_mode() {
        run_hook(graph, world, phase, id, |node, ctx| match pass {
            Pass::Update => node.update(ctx, dt),
            Pass::FixedUpdate => node.fixed_update(ctx, dt),
        });
    }

    let children = graph.children(id).to_vec();
    for child in children {
        update_subtree(graph, world, phase, child, pass, dt);
    }
}

/// Remove queued descendants of `id`: first its queued children, then
/// recurse into the survivors. Returns the number of nodes removed.
fn sweep(graph: &mut SceneGraph, world: &mut World, phase: Phase, id: NodeId) -> usize {
    let mut removed = 0;
    let children = graph.children(id).to_vec();
    for child in children {
        if graph.node(child).is_some_and(NodeData::is_queued_for_deletion) {
            graph.unlink(child);
            removed += teardown(graph, world, phase, child);
        }
    }

    let survivors = graph.children(id).to_vec();
    for child in survivors {
        removed += sweep(graph, world, phase, child);
    }
    removed
}

/// Detach and release `id` and its subtree. `on_detach` runs parent first,
/// each while the node's entity is still alive; entities are destroyed and
/// slots released after the children have been torn down.
fn teardown(graph: &mut SceneGraph, world: &mut World, phase: Phase, id: NodeId) -> usize {
    run_hook(graph, world, phase, id, |node, ctx| node.on_detach(ctx));

    let mut removed = 0;
    let children = graph.children(id).to_vec();
    for child in children {
        removed += teardown(graph, world, phase, child);
    }

    if let Some(data) = graph.release(id) {
        if let Some(entity) = data.entity {
            world.destroy(entity);
        }
        trace!(node = %id, name = data.name(), "released");
        removed += 1;
    }
    removed
}
