use std::cell::Cell;

#[derive(Debug, Default)]
pub struct EquivalenceForest {
    parent: Vec<Cell<usize>>,
    rank: Vec<usize>,
}

impl EquivalenceForest {
    #[inline]
    pub fn new(len: usize) -> Self {
        let mut forest = Self::default();
        forest.grow(len);
        forest
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn grow(&mut self, len: usize) {
        for id in self.parent.len()..len {
            self.parent.push(Cell::new(id));
            self.rank.push(0);
        }
    }

    pub fn find(&self, id: usize) -> usize {
        self.check(id);
        let parent = self.parent[id].get();
        if parent == id {
            return id;
        }
        let root = self.find(parent);
        self.parent[id].set(root);
        root
    }

    #[inline]
    pub fn same_class(&self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let this = self.find(a);
        let that = self.find(b);
        if this == that {
            return false;
        }
        self.link(this, that);
        true
    }

    fn link(&mut self, this: usize, that: usize) {
        if self.rank[this] > self.rank[that] {
            self.parent[that].set(this);
        } else {
            self.parent[this].set(that);
            if self.rank[this] == self.rank[that] {
                self.rank[that] += 1;
            }
        }
    }

    /// Classes are numbered in the order of their smallest member.
    pub fn finalize(self) -> Classes {
        let mut root_class = vec![usize::MAX; self.len()];
        let mut class_of = Vec::with_capacity(self.len());
        let mut num_classes = 0;
        for id in 0..self.len() {
            let root = self.find(id);
            if root_class[root] == usize::MAX {
                root_class[root] = num_classes;
                num_classes += 1;
            }
            class_of.push(root_class[root]);
        }
        Classes {
            class_of,
            num_classes,
        }
    }

    #[inline]
    fn check(&self, id: usize) {
        assert!(
            id < self.len(),
            "id {} is outside the universe of {} ids",
            id,
            self.len()
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classes {
    class_of: Vec<usize>,
    num_classes: usize,
}

impl Classes {
    #[inline]
    pub fn class_of(&self, id: usize) -> usize {
        assert!(
            id < self.class_of.len(),
            "id {} is outside the finalized universe of {} ids",
            id,
            self.class_of.len()
        );
        self.class_of[id]
    }

    #[inline]
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.class_of.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.class_of.is_empty()
    }
}
