use std::fmt;

/// A generational entity handle: a recyclable slot index plus the generation
/// the slot had when the handle was issued.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl Entity {
    /// Create an entity from raw parts (mainly for testing).
    pub fn from_raw(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// The slot index of this entity.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The generation of this entity (incremented each time the slot is freed).
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    generation: u32,
    alive: bool,
}

/// Hands out entity slots and recycles destroyed ones with a bumped generation.
#[derive(Debug, Default)]
pub(crate) struct EntityAllocator {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    live: usize,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self) -> Entity {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.alive = true;
            return Entity {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            alive: true,
        });
        Entity {
            index,
            generation: 0,
        }
    }

    /// Free an entity's slot. Returns `false` for stale or unknown handles.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        if !self.is_valid(entity) {
            return false;
        }
        let slot = &mut self.slots[entity.index as usize];
        slot.alive = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(entity.index);
        self.live -= 1;
        true
    }

    pub fn is_valid(&self, entity: Entity) -> bool {
        self.slots
            .get(entity.index as usize)
            .is_some_and(|slot| slot.alive && slot.generation == entity.generation)
    }

    /// The live entity currently occupying `index`, if any.
    pub fn entity_at(&self, index: u32) -> Option<Entity> {
        let slot = self.slots.get(index as usize)?;
        slot.alive.then_some(Entity {
            index,
            generation: slot.generation,
        })
    }

    /// Number of slots ever allocated (live or free).
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn alive(&self) -> impl Iterator<Item = Entity> + '_ {
        (0..self.capacity()).filter_map(|index| self.entity_at(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_sequential() {
        let mut alloc = EntityAllocator::new();
        let e0 = alloc.create();
        let e1 = alloc.create();
        assert_eq!(e0.index(), 0);
        assert_eq!(e1.index(), 1);
        assert_eq!(e0.generation(), 0);
        assert_eq!(alloc.len(), 2);
    }

    #[test]
    fn destroyed_slot_is_recycled_with_new_generation() {
        let mut alloc = EntityAllocator::new();
        let e0 = alloc.create();
        assert!(alloc.destroy(e0));
        let reused = alloc.create();
        assert_eq!(reused.index(), 0);
        assert_eq!(reused.generation(), 1);
        assert_ne!(e0, reused);
        assert!(!alloc.is_valid(e0));
        assert!(alloc.is_valid(reused));
    }

    #[test]
    fn double_destroy_is_rejected() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.create();
        assert!(alloc.destroy(e));
        assert!(!alloc.destroy(e));
        assert_eq!(alloc.len(), 0);
    }

    #[test]
    fn unknown_handle_is_invalid() {
        let alloc = EntityAllocator::new();
        assert!(!alloc.is_valid(Entity::from_raw(7, 0)));
        assert_eq!(alloc.entity_at(7), None);
    }

    #[test]
    fn alive_skips_free_slots() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.create();
        let b = alloc.create();
        let c = alloc.create();
        alloc.destroy(b);
        assert_eq!(alloc.alive().collect::<Vec<_>>(), vec![a, c]);
    }
}
