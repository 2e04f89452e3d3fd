use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;

use tracing::warn;

use crate::component::{Component, ComponentStorage, SparseSet};
use crate::context::Contexts;
use crate::entity::{Entity, EntityAllocator};
use crate::error::{fatal, EcsError};
use crate::query::{
    ComponentSet, DefaultBundle, QueryIter, ReadOnlyWorldQuery, StoragePtrs, View, WorldQuery,
};

/// The component store. Owns all entities, their components, and the
/// per-type context objects.
///
/// Accessors without a `try_` prefix treat a dead entity, a missing component
/// or a missing context as a programming error: they log the violation and
/// panic.
pub struct World {
    entities: EntityAllocator,
    components: HashMap<TypeId, Box<dyn ComponentStorage>>,
    contexts: Contexts,
}

impl World {
    pub fn new() -> Self {
        Self {
            entities: EntityAllocator::new(),
            components: HashMap::new(),
            contexts: Contexts::new(),
        }
    }

    // ---- Entity management ----

    /// Allocate a fresh entity with no components.
    pub fn create(&mut self) -> Entity {
        self.entities.create()
    }

    /// Destroy an entity and every component attached to it.
    /// Returns `false` (and does nothing) if the entity was already invalid.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        if !self.entities.destroy(entity) {
            return false;
        }
        for storage in self.components.values_mut() {
            storage.remove(entity.index);
        }
        true
    }

    pub fn valid(&self, entity: Entity) -> bool {
        self.entities.is_valid(entity)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Destroy every entity. Context objects are kept.
    pub fn clear(&mut self) {
        let live: Vec<Entity> = self.entities.alive().collect();
        for entity in live {
            self.entities.destroy(entity);
        }
        for storage in self.components.values_mut() {
            storage.clear();
        }
    }

    // ---- Component management ----

    fn storage_mut<T: Component>(&mut self) -> &mut SparseSet<T> {
        self.components
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(SparseSet::<T>::new()))
            .as_any_mut()
            .downcast_mut::<SparseSet<T>>()
            .expect("component type mismatch")
    }

    fn storage<T: Component>(&self) -> Option<&SparseSet<T>> {
        self.components
            .get(&TypeId::of::<T>())
            .and_then(|s| s.as_any().downcast_ref::<SparseSet<T>>())
    }

    fn check_valid(&self, entity: Entity) -> Result<(), EcsError> {
        if self.entities.is_valid(entity) {
            Ok(())
        } else {
            Err(EcsError::InvalidEntity(entity))
        }
    }

    /// Attach a component to a live entity.
    ///
    /// An entity holds at most one component per type; adding a type that is
    /// already present replaces it and logs a warning. Use [`World::add_or_get`]
    /// when the component may already exist.
    pub fn try_add<T: Component>(&mut self, entity: Entity, component: T) -> Result<&mut T, EcsError> {
        self.check_valid(entity)?;
        let (stored, previous) = self.storage_mut::<T>().insert_mut(entity.index, component);
        if previous.is_some() {
            warn!("entity {entity} already had {}, replaced it", type_name::<T>());
        }
        Ok(stored)
    }

    /// Attach a component, aborting if the entity is invalid.
    #[track_caller]
    pub fn add<T: Component>(&mut self, entity: Entity, component: T) -> &mut T {
        match self.try_add(entity, component) {
            Ok(component) => component,
            Err(err) => fatal(err),
        }
    }

    /// Return the existing component of type `T`, or insert `make()`.
    #[track_caller]
    pub fn add_or_get<T: Component>(&mut self, entity: Entity, make: impl FnOnce() -> T) -> &mut T {
        if let Err(err) = self.check_valid(entity) {
            fatal(err);
        }
        self.storage_mut::<T>().get_or_insert_with(entity.index, make)
    }

    /// [`World::add_or_get`] with `T::default()`.
    #[track_caller]
    pub fn add_or_default<T: Component + Default>(&mut self, entity: Entity) -> &mut T {
        self.add_or_get(entity, T::default)
    }

    /// Ensure `entity` holds every component in `B`, default-constructing the
    /// missing ones.
    ///
    /// ```ignore
    /// world.require::<(Velocity, Sprite)>(entity);
    /// ```
    #[track_caller]
    pub fn require<B: DefaultBundle>(&mut self, entity: Entity) {
        B::add_defaults(self, entity);
    }

    /// Detach a component, returning it. Absent components and invalid
    /// entities are a no-op.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> Option<T> {
        if !self.entities.is_valid(entity) {
            return None;
        }
        self.components
            .get_mut(&TypeId::of::<T>())?
            .as_any_mut()
            .downcast_mut::<SparseSet<T>>()?
            .take(entity.index)
    }

    /// Check whether a live entity has a component of the given type.
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.entities.is_valid(entity)
            && self
                .components
                .get(&TypeId::of::<T>())
                .is_some_and(|s| s.has(entity.index))
    }

    pub fn try_get<T: Component>(&self, entity: Entity) -> Result<&T, EcsError> {
        self.check_valid(entity)?;
        self.storage::<T>()
            .and_then(|s| s.get(entity.index))
            .ok_or(EcsError::MissingComponent {
                entity,
                component: type_name::<T>(),
            })
    }

    pub fn try_get_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T, EcsError> {
        self.check_valid(entity)?;
        self.components
            .get_mut(&TypeId::of::<T>())
            .and_then(|s| s.as_any_mut().downcast_mut::<SparseSet<T>>())
            .and_then(|s| s.get_mut(entity.index))
            .ok_or(EcsError::MissingComponent {
                entity,
                component: type_name::<T>(),
            })
    }

    /// Borrow a component, aborting if the entity is invalid or lacks it.
    #[track_caller]
    pub fn get<T: Component>(&self, entity: Entity) -> &T {
        match self.try_get(entity) {
            Ok(component) => component,
            Err(err) => fatal(err),
        }
    }

    /// Mutably borrow a component, aborting if the entity is invalid or lacks it.
    #[track_caller]
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> &mut T {
        match self.try_get_mut(entity) {
            Ok(component) => component,
            Err(err) => fatal(err),
        }
    }

    // ---- Views and queries ----

    /// Entities that currently hold every type in `F`.
    ///
    /// ```ignore
    /// let pipes: Vec<Entity> = world.view::<(Transform, PipeConfig)>().into_iter().collect();
    /// ```
    pub fn view<F: ComponentSet>(&self) -> View<'_> {
        self.view_excluding::<F, ()>()
    }

    /// Entities that hold every type in `F` and none of the types in `X`.
    pub fn view_excluding<F: ComponentSet, X: ComponentSet>(&self) -> View<'_> {
        let mut required = Vec::new();
        F::type_ids(&mut required);
        let mut excluded = Vec::new();
        X::type_ids(&mut excluded);
        View::new(&self.entities, &self.components, &required, &excluded)
    }

    fn candidates(&self, required: &[TypeId]) -> Vec<u32> {
        if required.is_empty() {
            return self.entities.alive().map(|e| e.index).collect();
        }
        let mut smallest: Option<&[u32]> = None;
        for id in required {
            let Some(storage) = self.components.get(id) else {
                return Vec::new();
            };
            let indices = storage.entity_indices();
            if smallest.map_or(true, |s| indices.len() < s.len()) {
                smallest = Some(indices);
            }
        }
        smallest.map(<[u32]>::to_vec).unwrap_or_default()
    }

    /// Iterate `(Entity, components)` for a read-only query.
    ///
    /// ```ignore
    /// for (entity, (pos, vel)) in world.query::<(&Position, &Velocity)>() {
    ///     // ...
    /// }
    /// ```
    pub fn query<Q: ReadOnlyWorldQuery>(&self) -> QueryIter<'_, Q> {
        let mut required = Vec::new();
        Q::required_type_ids(&mut required);
        let candidates = self.candidates(&required);

        let storages: StoragePtrs = self
            .components
            .iter()
            .map(|(id, s)| (*id, &**s as *const dyn ComponentStorage as *mut dyn ComponentStorage))
            .collect();
        // Safety: read-only queries only create shared references.
        let fetch = unsafe { Q::init_fetch(&storages) };

        QueryIter {
            entities: &self.entities,
            fetch,
            candidates,
            position: 0,
            _marker: PhantomData,
        }
    }

    /// Iterate `(Entity, components)` for a query that may contain `&mut T`.
    ///
    /// Naming the same component type twice is a contract violation.
    #[track_caller]
    pub fn query_mut<Q: WorldQuery>(&mut self) -> QueryIter<'_, Q> {
        let mut accessed = Vec::new();
        Q::accessed_types(&mut accessed);
        for (i, (id, name)) in accessed.iter().enumerate() {
            if accessed[..i].iter().any(|(other, _)| other == id) {
                fatal(EcsError::ConflictingAccess(*name));
            }
        }

        let mut required = Vec::new();
        Q::required_type_ids(&mut required);
        let candidates = self.candidates(&required);

        let storages: StoragePtrs = self
            .components
            .iter_mut()
            .map(|(id, s)| (*id, &mut **s as *mut dyn ComponentStorage))
            .collect();
        // Safety: `&mut self` is held for the iterator's lifetime and every
        // component type appears at most once in `Q`.
        let fetch = unsafe { Q::init_fetch(&storages) };

        QueryIter {
            entities: &self.entities,
            fetch,
            candidates,
            position: 0,
            _marker: PhantomData,
        }
    }

    // ---- Context objects ----

    /// Install a context object, overwriting any previous one of the same type.
    pub fn set_context<T: Component>(&mut self, value: T) -> &mut T {
        self.contexts.insert(value)
    }

    pub fn try_context<T: Component>(&self) -> Result<&T, EcsError> {
        self.contexts
            .get::<T>()
            .ok_or(EcsError::MissingContext(type_name::<T>()))
    }

    pub fn try_context_mut<T: Component>(&mut self) -> Result<&mut T, EcsError> {
        self.contexts
            .get_mut::<T>()
            .ok_or(EcsError::MissingContext(type_name::<T>()))
    }

    /// Borrow a context object, aborting if it was never set.
    #[track_caller]
    pub fn context<T: Component>(&self) -> &T {
        match self.try_context() {
            Ok(value) => value,
            Err(err) => fatal(err),
        }
    }

    /// Mutably borrow a context object, aborting if it was never set.
    #[track_caller]
    pub fn context_mut<T: Component>(&mut self) -> &mut T {
        match self.try_context_mut() {
            Ok(value) => value,
            Err(err) => fatal(err),
        }
    }

    pub fn has_context<T: Component>(&self) -> bool {
        self.contexts.contains::<T>()
    }

    /// Remove a context object, returning it if it existed.
    pub fn remove_context<T: Component>(&mut self) -> Option<T> {
        self.contexts.remove::<T>()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Name(String);

    #[test]
    fn create_and_destroy() {
        let mut world = World::new();
        let e = world.create();
        assert!(world.valid(e));
        assert_eq!(world.entity_count(), 1);
        assert!(world.destroy(e));
        assert!(!world.valid(e));
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn double_destroy_is_noop() {
        let mut world = World::new();
        let e = world.create();
        assert!(world.destroy(e));
        assert!(!world.destroy(e));
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn add_get_remove_component() {
        let mut world = World::new();
        let e = world.create();
        world.add(e, Position { x: 1.0, y: 2.0 });
        assert_eq!(world.get::<Position>(e), &Position { x: 1.0, y: 2.0 });
        assert!(world.has::<Position>(e));
        assert_eq!(world.remove::<Position>(e), Some(Position { x: 1.0, y: 2.0 }));
        assert!(!world.has::<Position>(e));
        assert_eq!(world.remove::<Position>(e), None);
    }

    #[test]
    fn component_mutation() {
        let mut world = World::new();
        let e = world.create();
        world.add(e, Position::default()).x = 3.0;
        world.get_mut::<Position>(e).y = 5.0;
        assert_eq!(world.get::<Position>(e), &Position { x: 3.0, y: 5.0 });
    }

    #[test]
    fn add_or_get_keeps_existing() {
        let mut world = World::new();
        let e = world.create();
        world.add(e, Name("first".into()));
        let name = world.add_or_get(e, || Name("second".into()));
        assert_eq!(name, &Name("first".into()));

        let vel = world.add_or_default::<Velocity>(e);
        assert_eq!(vel, &Velocity::default());
    }

    #[test]
    fn require_adds_missing_components_only() {
        let mut world = World::new();
        let e = world.create();
        world.add(e, Position { x: 9.0, y: 9.0 });
        world.require::<(Position, Velocity, Name)>(e);

        assert_eq!(world.get::<Position>(e).x, 9.0);
        assert!(world.has::<Velocity>(e));
        assert!(world.has::<Name>(e));
    }

    #[test]
    fn try_variants_report_errors() {
        let mut world = World::new();
        let e = world.create();
        assert_eq!(
            world.try_get::<Position>(e).unwrap_err(),
            EcsError::MissingComponent {
                entity: e,
                component: type_name::<Position>(),
            }
        );
        world.destroy(e);
        assert_eq!(world.try_get::<Position>(e).unwrap_err(), EcsError::InvalidEntity(e));
        assert_eq!(
            world.try_add(e, Position::default()).unwrap_err(),
            EcsError::InvalidEntity(e)
        );
    }

    #[test]
    #[should_panic(expected = "invalid entity")]
    fn get_after_destroy_is_fatal() {
        let mut world = World::new();
        let e = world.create();
        world.add(e, Position::default());
        world.destroy(e);
        assert!(!world.valid(e));
        let _ = world.get::<Position>(e);
    }

    #[test]
    #[should_panic(expected = "has no component")]
    fn get_missing_component_is_fatal() {
        let mut world = World::new();
        let e = world.create();
        let _ = world.get::<Velocity>(e);
    }

    #[test]
    #[should_panic(expected = "invalid entity")]
    fn add_to_invalid_entity_is_fatal() {
        let mut world = World::new();
        let e = world.create();
        world.destroy(e);
        world.add(e, Position::default());
    }

    #[test]
    fn destroy_removes_components() {
        let mut world = World::new();
        let e = world.create();
        world.add(e, Position::default());
        world.destroy(e);
        assert_eq!(world.query::<(&Position,)>().count(), 0);
        assert_eq!(world.view::<(Position,)>().iter().count(), 0);
    }

    #[test]
    fn recycled_entity_does_not_inherit_components() {
        let mut world = World::new();
        let e1 = world.create();
        world.add(e1, Position { x: 1.0, y: 0.0 });
        world.destroy(e1);

        let e2 = world.create();
        assert_eq!(e1.index(), e2.index());
        assert_ne!(e1, e2);
        assert!(!world.has::<Position>(e1));
        assert!(!world.has::<Position>(e2));
    }

    #[test]
    fn remove_on_invalid_entity_is_noop() {
        let mut world = World::new();
        let e = world.create();
        world.add(e, Velocity::default());
        world.destroy(e);
        assert_eq!(world.remove::<Velocity>(e), None);
    }

    #[test]
    fn clear_keeps_contexts() {
        let mut world = World::new();
        world.set_context(7u32);
        let e = world.create();
        world.add(e, Position::default());
        world.clear();
        assert_eq!(world.entity_count(), 0);
        assert!(!world.valid(e));
        assert_eq!(world.view::<(Position,)>().iter().count(), 0);
        assert_eq!(*world.context::<u32>(), 7);
    }

    #[test]
    fn context_lifecycle() {
        let mut world = World::new();
        assert!(!world.has_context::<u32>());
        *world.set_context(42u32) += 1;
        assert_eq!(*world.context::<u32>(), 43);
        *world.context_mut::<u32>() = 100;
        world.set_context(5u32);
        assert_eq!(*world.context::<u32>(), 5);
        assert_eq!(world.remove_context::<u32>(), Some(5));
        assert!(!world.has_context::<u32>());
        assert_eq!(
            world.try_context::<u32>().unwrap_err(),
            EcsError::MissingContext("u32")
        );
    }

    #[test]
    #[should_panic(expected = "does not exist")]
    fn missing_context_is_fatal() {
        let world = World::new();
        let _ = world.context::<String>();
    }
}
