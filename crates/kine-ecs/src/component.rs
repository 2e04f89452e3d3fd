use std::any::Any;

/// Marker trait for types that can be stored as ECS components.
pub trait Component: 'static + Send + Sync {}

/// Blanket implementation: any `'static + Send + Sync` type is a valid component.
impl<T: 'static + Send + Sync> Component for T {}

/// Type-erased view of one component type's storage.
pub trait ComponentStorage: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Drop the component stored for `index`. Returns `true` if one existed.
    fn remove(&mut self, index: u32) -> bool;
    fn has(&self, index: u32) -> bool;
    /// Dense list of entity indices holding this component.
    fn entity_indices(&self) -> &[u32];
    fn clear(&mut self);
    /// Type name of the stored component, for diagnostics.
    fn component_name(&self) -> &'static str;
}

/// Sparse-set storage for a single component type. Provides O(1) insert/remove/lookup
/// and dense iteration.
pub struct SparseSet<T> {
    /// Maps entity index to dense index. `None` means the entity has no component.
    sparse: Vec<Option<usize>>,
    /// Packed component values.
    dense: Vec<T>,
    /// Entity index owning each dense slot.
    entities: Vec<u32>,
}

impl<T: Component> SparseSet<T> {
    pub fn new() -> Self {
        Self {
            sparse: Vec::new(),
            dense: Vec::new(),
            entities: Vec::new(),
        }
    }

    /// Insert or replace the component for an entity index.
    /// Returns the previous value when one was replaced.
    pub fn insert(&mut self, index: u32, value: T) -> Option<T> {
        self.insert_mut(index, value).1
    }

    /// Like [`SparseSet::insert`], also handing back the stored value.
    pub fn insert_mut(&mut self, index: u32, value: T) -> (&mut T, Option<T>) {
        let idx = index as usize;
        if idx >= self.sparse.len() {
            self.sparse.resize(idx + 1, None);
        }
        match self.sparse[idx] {
            Some(dense_idx) => {
                let previous = std::mem::replace(&mut self.dense[dense_idx], value);
                (&mut self.dense[dense_idx], Some(previous))
            }
            None => {
                let dense_idx = self.dense.len();
                self.sparse[idx] = Some(dense_idx);
                self.dense.push(value);
                self.entities.push(index);
                (&mut self.dense[dense_idx], None)
            }
        }
    }

    pub fn get_or_insert_with(&mut self, index: u32, make: impl FnOnce() -> T) -> &mut T {
        match self.dense_index(index) {
            Some(dense_idx) => &mut self.dense[dense_idx],
            None => self.insert_mut(index, make()).0,
        }
    }

    fn dense_index(&self, index: u32) -> Option<usize> {
        self.sparse.get(index as usize).copied().flatten()
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        self.dense_index(index).map(|dense_idx| &self.dense[dense_idx])
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        let dense_idx = self.dense_index(index)?;
        Some(&mut self.dense[dense_idx])
    }

    /// Remove and return the component for an entity index.
    pub fn take(&mut self, index: u32) -> Option<T> {
        let dense_idx = self.dense_index(index)?;
        self.sparse[index as usize] = None;

        let value = self.dense.swap_remove(dense_idx);
        self.entities.swap_remove(dense_idx);
        // The former last element now lives at `dense_idx`.
        if let Some(&moved) = self.entities.get(dense_idx) {
            self.sparse[moved as usize] = Some(dense_idx);
        }
        Some(value)
    }

    /// Iterate over all (entity_index, &component) pairs in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.entities.iter().copied().zip(self.dense.iter())
    }

    /// Sparse table and dense base pointer, for queries that hand out
    /// `&mut T` to several entities at once.
    pub(crate) fn parts_mut(&mut self) -> (&[Option<usize>], *mut T) {
        (&self.sparse, self.dense.as_mut_ptr())
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }
}

impl<T: Component> Default for SparseSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component> ComponentStorage for SparseSet<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn remove(&mut self, index: u32) -> bool {
        self.take(index).is_some()
    }

    fn has(&self, index: u32) -> bool {
        self.dense_index(index).is_some()
    }

    fn entity_indices(&self) -> &[u32] {
        &self.entities
    }

    fn clear(&mut self) {
        self.sparse.clear();
        self.dense.clear();
        self.entities.clear();
    }

    fn component_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}
