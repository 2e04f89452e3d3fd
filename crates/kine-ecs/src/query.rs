//! Entity filters and typed component queries.
//!
//! [`View`] answers "which entities hold all of these types" and yields bare
//! [`Entity`] handles. [`QueryIter`] goes one step further and hands out the
//! component references themselves.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;

use crate::component::{Component, ComponentStorage, SparseSet};
use crate::entity::{Entity, EntityAllocator};
use crate::world::World;

/// A set of component types named as a tuple, e.g. `(Transform, Velocity)`.
pub trait ComponentSet: 'static {
    fn type_ids(ids: &mut Vec<TypeId>);
}

/// A [`ComponentSet`] whose members can all be default-constructed.
pub trait DefaultBundle: ComponentSet {
    /// Add every member to `entity` unless it is already present.
    fn add_defaults(world: &mut World, entity: Entity);
}

impl ComponentSet for () {
    fn type_ids(_: &mut Vec<TypeId>) {}
}

impl DefaultBundle for () {
    fn add_defaults(_: &mut World, _: Entity) {}
}

macro_rules! impl_component_set_tuple {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            fn type_ids(ids: &mut Vec<TypeId>) {
                $(ids.push(TypeId::of::<$name>());)+
            }
        }

        impl<$($name: Component + Default),+> DefaultBundle for ($($name,)+) {
            fn add_defaults(world: &mut World, entity: Entity) {
                $(world.add_or_default::<$name>(entity);)+
            }
        }
    };
}

impl_component_set_tuple!(A);
impl_component_set_tuple!(A, B);
impl_component_set_tuple!(A, B, C);
impl_component_set_tuple!(A, B, C, D);
impl_component_set_tuple!(A, B, C, D, E);
impl_component_set_tuple!(A, B, C, D, E, F);
impl_component_set_tuple!(A, B, C, D, E, F, G);
impl_component_set_tuple!(A, B, C, D, E, F, G, H);

pub(crate) type StorageMap = HashMap<TypeId, Box<dyn ComponentStorage>>;

#[derive(Clone, Copy)]
enum Driver<'w> {
    /// Some required type has never been stored.
    Empty,
    /// Dense entity list of the smallest required storage.
    Dense(&'w [u32]),
    /// No required types: every allocated slot is a candidate.
    All(u32),
}

/// Lazy, restartable sequence of entities holding every required component
/// type and none of the excluded ones.
///
/// Iteration is driven by the smallest participating storage. A `View` borrows
/// the world, so to mutate components while walking it, collect first or use
/// [`World::query_mut`].
#[derive(Clone)]
pub struct View<'w> {
    entities: &'w EntityAllocator,
    driver: Driver<'w>,
    required: Vec<&'w dyn ComponentStorage>,
    excluded: Vec<&'w dyn ComponentStorage>,
}

impl<'w> View<'w> {
    pub(crate) fn new(
        entities: &'w EntityAllocator,
        storages: &'w StorageMap,
        required_ids: &[TypeId],
        excluded_ids: &[TypeId],
    ) -> Self {
        let excluded = excluded_ids
            .iter()
            .filter_map(|id| storages.get(id))
            .map(|s| -> &'w dyn ComponentStorage { &**s })
            .collect();

        let mut required: Vec<&'w dyn ComponentStorage> = Vec::with_capacity(required_ids.len());
        for id in required_ids {
            match storages.get(id) {
                Some(storage) => required.push(&**storage),
                None => {
                    return Self {
                        entities,
                        driver: Driver::Empty,
                        required: Vec::new(),
                        excluded,
                    }
                }
            }
        }

        let driver = required
            .iter()
            .copied()
            .map(|s| s.entity_indices())
            .min_by_key(|indices| indices.len())
            .map_or(Driver::All(entities.capacity()), Driver::Dense);

        Self {
            entities,
            driver,
            required,
            excluded,
        }
    }

    fn matches(&self, index: u32) -> bool {
        self.required.iter().all(|s| s.has(index)) && !self.excluded.iter().any(|s| s.has(index))
    }

    /// Whether `entity` is live and passes this view's filter.
    pub fn contains(&self, entity: Entity) -> bool {
        !matches!(self.driver, Driver::Empty)
            && self.entities.is_valid(entity)
            && self.matches(entity.index)
    }

    /// Start a fresh pass over the view.
    pub fn iter(&self) -> ViewIter<'w> {
        ViewIter {
            view: self.clone(),
            position: 0,
        }
    }
}

impl<'w> IntoIterator for View<'w> {
    type Item = Entity;
    type IntoIter = ViewIter<'w>;

    fn into_iter(self) -> Self::IntoIter {
        ViewIter {
            view: self,
            position: 0,
        }
    }
}

impl<'w> IntoIterator for &View<'w> {
    type Item = Entity;
    type IntoIter = ViewIter<'w>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`View`].
pub struct ViewIter<'w> {
    view: View<'w>,
    position: usize,
}

impl<'w> Iterator for ViewIter<'w> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        loop {
            let index = match self.view.driver {
                Driver::Empty => return None,
                Driver::Dense(indices) => *indices.get(self.position)?,
                Driver::All(capacity) => {
                    if self.position >= capacity as usize {
                        return None;
                    }
                    self.position as u32
                }
            };
            self.position += 1;

            if let Some(entity) = self.view.entities.entity_at(index) {
                if self.view.matches(index) {
                    return Some(entity);
                }
            }
        }
    }
}

/// Raw per-type storage pointers captured for a single query.
#[doc(hidden)]
pub type StoragePtrs = HashMap<TypeId, *mut dyn ComponentStorage>;

/// Trait implemented for query parameter types (`&T`, `&mut T`, `Option<&T>`
/// and tuples of those).
///
/// # Safety
/// Implementors must report every component type they access through
/// `accessed_types`, and only dereference storages mutably for `&mut T`.
pub unsafe trait WorldQuery {
    type Item<'w>;
    #[doc(hidden)]
    type Fetch<'w>;

    /// The TypeIds of components that must be present on the entity.
    fn required_type_ids(ids: &mut Vec<TypeId>);

    /// Every component type touched, with its name for diagnostics.
    fn accessed_types(types: &mut Vec<(TypeId, &'static str)>);

    /// Resolve the storages this query reads. `None` means no entity can match.
    ///
    /// # Safety
    /// Every pointer in `storages` must be valid for `'w`, and no other live
    /// reference may alias a storage this query accesses mutably.
    #[doc(hidden)]
    unsafe fn init_fetch<'w>(storages: &StoragePtrs) -> Option<Self::Fetch<'w>>;

    /// Fetch the item for a given entity index.
    ///
    /// # Safety
    /// Each index must be fetched at most once per `Fetch` when the query
    /// hands out mutable references.
    #[doc(hidden)]
    unsafe fn fetch<'w>(fetch: &Self::Fetch<'w>, index: u32) -> Option<Self::Item<'w>>;
}

/// Queries that never hand out mutable references.
///
/// # Safety
/// Implementors must not create mutable references in `fetch`.
pub unsafe trait ReadOnlyWorldQuery: WorldQuery {}

unsafe fn downcast<'w, T: Component>(storages: &StoragePtrs) -> Option<&'w SparseSet<T>> {
    let ptr = *storages.get(&TypeId::of::<T>())?;
    (*ptr).as_any().downcast_ref::<SparseSet<T>>()
}

// --- &T ---

unsafe impl<T: Component> WorldQuery for &T {
    type Item<'w> = &'w T;
    type Fetch<'w> = &'w SparseSet<T>;

    fn required_type_ids(ids: &mut Vec<TypeId>) {
        ids.push(TypeId::of::<T>());
    }

    fn accessed_types(types: &mut Vec<(TypeId, &'static str)>) {
        types.push((TypeId::of::<T>(), type_name::<T>()));
    }

    unsafe fn init_fetch<'w>(storages: &StoragePtrs) -> Option<Self::Fetch<'w>> {
        downcast::<T>(storages)
    }

    unsafe fn fetch<'w>(fetch: &Self::Fetch<'w>, index: u32) -> Option<Self::Item<'w>> {
        let set: &'w SparseSet<T> = *fetch;
        set.get(index)
    }
}

unsafe impl<T: Component> ReadOnlyWorldQuery for &T {}

// --- &mut T ---

#[doc(hidden)]
pub struct MutFetch<'w, T> {
    sparse: &'w [Option<usize>],
    dense: *mut T,
}

unsafe impl<T: Component> WorldQuery for &mut T {
    type Item<'w> = &'w mut T;
    type Fetch<'w> = MutFetch<'w, T>;

    fn required_type_ids(ids: &mut Vec<TypeId>) {
        ids.push(TypeId::of::<T>());
    }

    fn accessed_types(types: &mut Vec<(TypeId, &'static str)>) {
        types.push((TypeId::of::<T>(), type_name::<T>()));
    }

    unsafe fn init_fetch<'w>(storages: &StoragePtrs) -> Option<Self::Fetch<'w>> {
        let ptr = *storages.get(&TypeId::of::<T>())?;
        let set = (*ptr).as_any_mut().downcast_mut::<SparseSet<T>>()?;
        let (sparse, dense) = set.parts_mut();
        Some(MutFetch { sparse, dense })
    }

    unsafe fn fetch<'w>(fetch: &Self::Fetch<'w>, index: u32) -> Option<Self::Item<'w>> {
        let dense_idx = fetch.sparse.get(index as usize).copied().flatten()?;
        Some(&mut *fetch.dense.add(dense_idx))
    }
}

// --- Option<&T> ---

unsafe impl<T: Component> WorldQuery for Option<&T> {
    type Item<'w> = Option<&'w T>;
    type Fetch<'w> = Option<&'w SparseSet<T>>;

    fn required_type_ids(_: &mut Vec<TypeId>) {}

    fn accessed_types(types: &mut Vec<(TypeId, &'static str)>) {
        types.push((TypeId::of::<T>(), type_name::<T>()));
    }

    unsafe fn init_fetch<'w>(storages: &StoragePtrs) -> Option<Self::Fetch<'w>> {
        Some(downcast::<T>(storages))
    }

    unsafe fn fetch<'w>(fetch: &Self::Fetch<'w>, index: u32) -> Option<Self::Item<'w>> {
        let set: Option<&'w SparseSet<T>> = *fetch;
        Some(set.and_then(|s| s.get(index)))
    }
}

unsafe impl<T: Component> ReadOnlyWorldQuery for Option<&T> {}

// --- Tuple implementations ---

macro_rules! impl_world_query_tuple {
    ($($name:ident),+) => {
        #[allow(non_snake_case)]
        unsafe impl<$($name: WorldQuery),+> WorldQuery for ($($name,)+) {
            type Item<'w> = ($($name::Item<'w>,)+);
            type Fetch<'w> = ($($name::Fetch<'w>,)+);

            fn required_type_ids(ids: &mut Vec<TypeId>) {
                $($name::required_type_ids(ids);)+
            }

            fn accessed_types(types: &mut Vec<(TypeId, &'static str)>) {
                $($name::accessed_types(types);)+
            }

            unsafe fn init_fetch<'w>(storages: &StoragePtrs) -> Option<Self::Fetch<'w>> {
                Some(($($name::init_fetch(storages)?,)+))
            }

            unsafe fn fetch<'w>(fetch: &Self::Fetch<'w>, index: u32) -> Option<Self::Item<'w>> {
                let ($($name,)+) = fetch;
                Some(($($name::fetch($name, index)?,)+))
            }
        }

        unsafe impl<$($name: ReadOnlyWorldQuery),+> ReadOnlyWorldQuery for ($($name,)+) {}
    };
}

impl_world_query_tuple!(A);
impl_world_query_tuple!(A, B);
impl_world_query_tuple!(A, B, C);
impl_world_query_tuple!(A, B, C, D);
impl_world_query_tuple!(A, B, C, D, E);
impl_world_query_tuple!(A, B, C, D, E, F);
impl_world_query_tuple!(A, B, C, D, E, F, G);
impl_world_query_tuple!(A, B, C, D, E, F, G, H);

/// Iterator returned by [`World::query`] and [`World::query_mut`].
/// Yields `(Entity, Q::Item)` for each matching entity.
pub struct QueryIter<'w, Q: WorldQuery> {
    pub(crate) entities: &'w EntityAllocator,
    pub(crate) fetch: Option<Q::Fetch<'w>>,
    pub(crate) candidates: Vec<u32>,
    pub(crate) position: usize,
    pub(crate) _marker: PhantomData<Q>,
}

impl<'w, Q: WorldQuery> Iterator for QueryIter<'w, Q> {
    type Item = (Entity, Q::Item<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        let fetch = self.fetch.as_ref()?;
        while let Some(&index) = self.candidates.get(self.position) {
            self.position += 1;

            let Some(entity) = self.entities.entity_at(index) else {
                continue;
            };
            // Safety: candidates are unique, so each index is fetched once.
            if let Some(item) = unsafe { Q::fetch(fetch, index) } {
                return Some((entity, item));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Position(f32);

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Velocity(f32);

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Frozen;

    #[test]
    fn view_yields_only_full_matches() {
        let mut world = World::new();
        let a = world.create();
        let b = world.create();
        let c = world.create();
        world.add(a, Position(0.0));
        world.add(a, Velocity(1.0));
        world.add(b, Position(0.0));
        world.add(c, Velocity(2.0));

        let hits: Vec<_> = world.view::<(Position, Velocity)>().into_iter().collect();
        assert_eq!(hits, vec![a]);
    }

    #[test]
    fn view_is_restartable() {
        let mut world = World::new();
        for _ in 0..3 {
            let e = world.create();
            world.add(e, Position(1.0));
        }
        let view = world.view::<(Position,)>();
        assert_eq!(view.iter().count(), 3);
        assert_eq!(view.iter().count(), 3);
        assert_eq!((&view).into_iter().count(), 3);
    }

    #[test]
    fn view_of_unknown_type_is_empty() {
        let mut world = World::new();
        let e = world.create();
        world.add(e, Position(1.0));
        assert_eq!(world.view::<(Position, Velocity)>().iter().count(), 0);
        assert!(!world.view::<(Position, Velocity)>().contains(e));
    }

    #[test]
    fn empty_view_lists_every_live_entity() {
        let mut world = World::new();
        let a = world.create();
        let b = world.create();
        let c = world.create();
        world.destroy(b);
        let all: Vec<_> = world.view::<()>().into_iter().collect();
        assert_eq!(all, vec![a, c]);
    }

    #[test]
    fn view_excluding_skips_excluded_types() {
        let mut world = World::new();
        let moving = world.create();
        let frozen = world.create();
        world.add(moving, Position(0.0));
        world.add(frozen, Position(0.0));
        world.add(frozen, Frozen);

        let hits: Vec<_> = world
            .view_excluding::<(Position,), (Frozen,)>()
            .into_iter()
            .collect();
        assert_eq!(hits, vec![moving]);
    }

    #[test]
    fn view_skips_destroyed_entities() {
        let mut world = World::new();
        let a = world.create();
        let b = world.create();
        world.add(a, Position(0.0));
        world.add(b, Position(0.0));
        world.destroy(a);
        let hits: Vec<_> = world.view::<(Position,)>().into_iter().collect();
        assert_eq!(hits, vec![b]);
    }

    #[test]
    fn query_mut_updates_components() {
        let mut world = World::new();
        let a = world.create();
        let b = world.create();
        world.add(a, Position(0.0));
        world.add(a, Velocity(2.0));
        world.add(b, Position(5.0));

        for (_, (pos, vel)) in world.query_mut::<(&mut Position, &Velocity)>() {
            pos.0 += vel.0;
        }
        assert_eq!(world.get::<Position>(a), &Position(2.0));
        assert_eq!(world.get::<Position>(b), &Position(5.0));
    }

    #[test]
    fn query_optional_component() {
        let mut world = World::new();
        let a = world.create();
        let b = world.create();
        world.add(a, Position(1.0));
        world.add(a, Velocity(1.0));
        world.add(b, Position(2.0));

        let results: Vec<_> = world.query::<(&Position, Option<&Velocity>)>().collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results.iter().filter(|(_, (_, v))| v.is_some()).count(), 1);
    }

    #[test]
    #[should_panic(expected = "more than once")]
    fn query_mut_rejects_aliasing() {
        let mut world = World::new();
        let e = world.create();
        world.add(e, Position(0.0));
        let _ = world.query_mut::<(&mut Position, &Position)>().count();
    }
}
