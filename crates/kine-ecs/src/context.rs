use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Type-map storage for context objects: at most one value per type, not
/// tied to any entity.
#[derive(Default)]
pub(crate) struct Contexts {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Contexts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a context object, replacing any previous value of the same type.
    pub fn insert<T: 'static + Send + Sync>(&mut self, value: T) -> &mut T {
        let id = TypeId::of::<T>();
        if self.map.insert(id, Box::new(value)).is_some() {
            tracing::debug!("replaced context {}", std::any::type_name::<T>());
        }
        self.map
            .get_mut(&id)
            .and_then(|b| b.downcast_mut())
            .expect("context type mismatch")
    }

    pub fn get<T: 'static + Send + Sync>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|b| b.downcast_ref())
    }

    pub fn get_mut<T: 'static + Send + Sync>(&mut self) -> Option<&mut T> {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|b| b.downcast_mut())
    }

    /// Remove a context object, returning it if it existed.
    pub fn remove<T: 'static + Send + Sync>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|b| b.downcast().ok())
            .map(|b| *b)
    }

    pub fn contains<T: 'static + Send + Sync>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut ctx = Contexts::new();
        ctx.insert(42u32);
        ctx.insert("hello".to_string());
        assert_eq!(ctx.get::<u32>(), Some(&42));
        assert_eq!(ctx.get::<String>(), Some(&"hello".to_string()));
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn reinsert_overwrites() {
        let mut ctx = Contexts::new();
        ctx.insert(1u32);
        *ctx.insert(2u32) += 10;
        assert_eq!(ctx.get::<u32>(), Some(&12));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn remove_returns_value() {
        let mut ctx = Contexts::new();
        ctx.insert(vec![1, 2, 3]);
        assert_eq!(ctx.remove::<Vec<i32>>(), Some(vec![1, 2, 3]));
        assert!(!ctx.contains::<Vec<i32>>());
        assert_eq!(ctx.remove::<Vec<i32>>(), None);
    }
}
