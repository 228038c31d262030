use std::{collections::HashMap, hash::Hash};

/// Bijection between entity handles and dense ids assigned in order of first
/// registration.
#[derive(Debug, Clone)]
pub struct EntityRegistry<E> {
    id_to_entity: Vec<E>,
    entity_to_id: HashMap<E, usize>,
}

impl<E> Default for EntityRegistry<E> {
    fn default() -> Self {
        Self {
            id_to_entity: vec![],
            entity_to_id: HashMap::new(),
        }
    }
}

impl<E: Copy + Eq + Hash> EntityRegistry<E> {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, e: E) -> usize {
        let next = self.id_to_entity.len();
        let id = *self.entity_to_id.entry(e).or_insert(next);
        if id == next {
            self.id_to_entity.push(e);
        }
        id
    }

    #[inline]
    pub fn lookup(&self, e: E) -> Option<usize> {
        self.entity_to_id.get(&e).copied()
    }

    #[inline]
    pub fn contains(&self, e: E) -> bool {
        self.entity_to_id.contains_key(&e)
    }

    #[inline]
    pub fn entity(&self, id: usize) -> E {
        assert!(
            id < self.id_to_entity.len(),
            "entity id {} was never issued",
            id
        );
        self.id_to_entity[id]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.id_to_entity.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.id_to_entity.is_empty()
    }

    /// Entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = E> + '_ {
        self.id_to_entity.iter().copied()
    }

    pub(crate) fn into_parts(self) -> (Vec<E>, HashMap<E, usize>) {
        (self.id_to_entity, self.entity_to_id)
    }
}
