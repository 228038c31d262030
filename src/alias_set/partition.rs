use std::{collections::HashMap, hash::Hash};

use crate::{disjoint_set::Classes, program::Program, registry::EntityRegistry};

/// Entities of one equivalence class, in registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasSet<E> {
    members: Vec<E>,
}

impl<E> Default for AliasSet<E> {
    fn default() -> Self {
        Self { members: vec![] }
    }
}

impl<E: Copy + Eq> AliasSet<E> {
    #[inline]
    pub fn members(&self) -> &[E] {
        &self.members
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[inline]
    pub fn contains(&self, e: E) -> bool {
        self.members.contains(&e)
    }

    pub fn iter(&self) -> impl Iterator<Item = E> + '_ {
        self.members.iter().copied()
    }
}

/// Finished alias sets. Set ids follow the registration order of each set's
/// first member.
#[derive(Debug, Clone)]
pub struct Partition<E> {
    sets: Vec<AliasSet<E>>,
    set_of: HashMap<E, usize>,
}

impl<E: Copy + Eq + Hash + std::fmt::Debug> Partition<E> {
    pub(crate) fn new(registry: EntityRegistry<E>, classes: &Classes) -> Self {
        assert_eq!(
            registry.len(),
            classes.len(),
            "registry and forest disagree on the universe"
        );
        let (entities, ids) = registry.into_parts();
        let mut sets = vec![AliasSet::default(); classes.num_classes()];
        for (id, e) in entities.into_iter().enumerate() {
            sets[classes.class_of(id)].members.push(e);
        }
        let set_of = ids
            .into_iter()
            .map(|(e, id)| (e, classes.class_of(id)))
            .collect();
        Self { sets, set_of }
    }

    #[inline]
    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    #[inline]
    pub fn num_entities(&self) -> usize {
        self.set_of.len()
    }

    pub fn set_at(&self, i: usize) -> &AliasSet<E> {
        assert!(
            i < self.sets.len(),
            "alias set {} does not exist; there are {}",
            i,
            self.sets.len()
        );
        &self.sets[i]
    }

    /// Id of the set containing `e`, which must have been registered.
    pub fn set_id_of(&self, e: E) -> usize {
        match self.set_of.get(&e) {
            Some(i) => *i,
            None => panic!("{:?} is not in any alias set", e),
        }
    }

    #[inline]
    pub fn try_set_id_of(&self, e: E) -> Option<usize> {
        self.set_of.get(&e).copied()
    }

    #[inline]
    pub fn set_of(&self, e: E) -> &AliasSet<E> {
        &self.sets[self.set_id_of(e)]
    }

    pub fn same_set(&self, a: E, b: E) -> bool {
        self.set_id_of(a) == self.set_id_of(b)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AliasSet<E>> {
        self.sets.iter()
    }

    pub fn display<'a, P: Program<Entity = E>>(
        &'a self,
        program: &'a P,
    ) -> PartitionDisplay<'a, P> {
        PartitionDisplay {
            partition: self,
            program,
        }
    }
}

impl<'a, E> IntoIterator for &'a Partition<E> {
    type Item = &'a AliasSet<E>;
    type IntoIter = std::slice::Iter<'a, AliasSet<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.sets.iter()
    }
}

/// Renders a partition with program names: each member as `owner.name`
/// followed by a space, each set ended by a blank line.
pub struct PartitionDisplay<'a, P: Program> {
    partition: &'a Partition<P::Entity>,
    program: &'a P,
}

impl<P: Program> std::fmt::Display for PartitionDisplay<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "Number of alias sets: {}", self.partition.num_sets())?;
        for set in self.partition {
            for e in set.iter() {
                write!(f, "{} ", self.program.qualified_name(e))?;
            }
            write!(f, "\n\n")?;
        }
        Ok(())
    }
}
