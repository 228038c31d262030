use std::{fmt::Debug, hash::Hash};

/// Verdict of an alias query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AliasResult {
    NoAlias,
    MayAlias,
    PartialAlias,
    MustAlias,
}

impl AliasResult {
    /// Everything except `NoAlias` puts two pointers in the same alias set.
    #[inline]
    pub fn may_alias(self) -> bool {
        !matches!(self, AliasResult::NoAlias)
    }
}

impl std::fmt::Display for AliasResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Pairwise alias queries over the entities of a program. Implementations
/// must be deterministic and must give the same answer for `(a, b)` and
/// `(b, a)`.
pub trait AliasOracle<E> {
    fn alias(&self, a: E, b: E) -> AliasResult;
}

impl<E, O: AliasOracle<E> + ?Sized> AliasOracle<E> for &O {
    #[inline]
    fn alias(&self, a: E, b: E) -> AliasResult {
        (**self).alias(a, b)
    }
}

/// Read-only view of a whole program.
///
/// `Entity` is an opaque handle; two handles are equal iff they denote the
/// same program value.
pub trait Program {
    type Entity: Copy + Eq + Hash + Debug;
    type Function: Copy + Eq + Debug;
    type CallSite: Copy + Debug;

    /// Functions in program order.
    fn functions(&self) -> Vec<Self::Function>;

    /// Parameters of `f` in declaration order.
    fn params(&self, f: Self::Function) -> Vec<Self::Entity>;

    /// Instructions of `f` in layout order, including the ones that produce
    /// no value.
    fn instructions(&self, f: Self::Function) -> Vec<Self::Entity>;

    fn is_pointer(&self, e: Self::Entity) -> bool;

    /// Direct calls whose callee is `f`.
    fn call_sites(&self, f: Self::Function) -> Vec<Self::CallSite>;

    /// Actual arguments of a call. `None` for operands that are not values
    /// local to a function, such as constants and module-level values.
    fn call_args(&self, call: Self::CallSite) -> Vec<Option<Self::Entity>>;

    /// The value produced by the call, if it produces one.
    fn call_result(&self, call: Self::CallSite) -> Option<Self::Entity>;

    /// Function-local values returned by the `ret` terminators of `f`.
    fn returned_values(&self, f: Self::Function) -> Vec<Self::Entity>;

    /// `(owner, local)` name of an entity. The owner is the enclosing
    /// function, or `None` for module-level values.
    fn name_of(&self, e: Self::Entity) -> (Option<String>, String);

    /// Pointer-typed parameters, then pointer-typed instruction results.
    fn pointer_values(&self, f: Self::Function) -> Vec<Self::Entity> {
        self.params(f)
            .into_iter()
            .chain(self.instructions(f))
            .filter(|e| self.is_pointer(*e))
            .collect()
    }

    fn qualified_name(&self, e: Self::Entity) -> String {
        match self.name_of(e) {
            (Some(owner), local) => format!("{}.{}", owner, local),
            (None, local) => local,
        }
    }
}
