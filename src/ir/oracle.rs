use std::collections::{HashMap, HashSet};

use etrace::some_or;

use super::*;
use crate::program::{AliasOracle, AliasResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Object {
    Null,
    Stack(ValueRef),
    Heap(ValueRef),
    Global(GlobalId),
    Unknown(ValueRef),
}

impl Object {
    #[inline]
    fn is_identified(self) -> bool {
        matches!(self, Object::Stack(_) | Object::Heap(_) | Object::Global(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Offset {
    Known(i64),
    Unknown,
}

impl Offset {
    fn add(self, other: Offset) -> Offset {
        match (self, other) {
            (Offset::Known(a), Offset::Known(b)) => match a.checked_add(b) {
                Some(n) => Offset::Known(n),
                None => Offset::Unknown,
            },
            _ => Offset::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Location {
    object: Object,
    offset: Offset,
}

pub struct BasicOracle<'a> {
    module: &'a Module,
    locations: HashMap<ValueRef, Location>,
}

impl<'a> BasicOracle<'a> {
    pub fn new(module: &'a Module) -> Self {
        let mut oracle = Self {
            module,
            locations: HashMap::new(),
        };
        for f in module.fn_ids() {
            for i in 0..module.function(f).insts.len() {
                oracle.resolve(ValueRef::Inst(f, i as _));
            }
        }
        oracle
    }

    fn location(&self, v: ValueRef) -> Location {
        match v {
            ValueRef::Global(g) => root(Object::Global(g)),
            ValueRef::Param(_, _) => root(Object::Unknown(v)),
            ValueRef::Inst(_, _) => some_or!(
                self.locations.get(&v).copied(),
                root(Object::Unknown(v))
            ),
        }
    }

    // Operands still in progress belong to a cycle and are seen as unknown.
    fn resolve(&mut self, v: ValueRef) {
        let module = self.module;
        let mut stack = vec![v];
        let mut in_progress = HashSet::new();
        while let Some(&v) = stack.last() {
            if self.locations.contains_key(&v) {
                stack.pop();
                continue;
            }
            let inst = some_or!(module.inst(v), {
                stack.pop();
                continue;
            });
            if in_progress.insert(v) {
                let len = stack.len();
                stack.extend(dependencies(inst).filter(|u| {
                    !self.locations.contains_key(u) && !in_progress.contains(u)
                }));
                if stack.len() > len {
                    continue;
                }
            }
            let loc = self.compute(v, inst, &in_progress);
            self.locations.insert(v, loc);
            in_progress.remove(&v);
            stack.pop();
        }
    }

    fn compute(&self, v: ValueRef, inst: &Inst, in_progress: &HashSet<ValueRef>) -> Location {
        match &inst.kind {
            InstKind::Alloca => root(Object::Stack(v)),
            InstKind::Call {
                callee: Callee::External(name),
                ..
            } if ALLOCATORS.contains(&name.as_str()) => root(Object::Heap(v)),
            InstKind::Gep { base, offset } => {
                let loc = self.operand_location(*base, v, in_progress);
                let offset = match offset {
                    Operand::Const(n) => Offset::Known(*n),
                    _ => Offset::Unknown,
                };
                Location {
                    object: loc.object,
                    offset: loc.offset.add(offset),
                }
            }
            InstKind::BitCast(op) => self.operand_location(*op, v, in_progress),
            InstKind::Select { then, els, .. } => self.merge(v, &[*then, *els], in_progress),
            InstKind::Phi(ops) => self.merge(v, ops, in_progress),
            _ => root(Object::Unknown(v)),
        }
    }

    fn operand_location(
        &self,
        op: Operand,
        user: ValueRef,
        in_progress: &HashSet<ValueRef>,
    ) -> Location {
        match op {
            Operand::Value(v) if in_progress.contains(&v) => root(Object::Unknown(v)),
            Operand::Value(v) => self.location(v),
            Operand::Null => root(Object::Null),
            Operand::Const(_) => root(Object::Unknown(user)),
        }
    }

    fn merge(&self, v: ValueRef, ops: &[Operand], in_progress: &HashSet<ValueRef>) -> Location {
        let mut merged: Option<Location> = None;
        for op in ops {
            let loc = self.operand_location(*op, v, in_progress);
            match merged {
                Some(m) if m != loc => return root(Object::Unknown(v)),
                _ => merged = Some(loc),
            }
        }
        merged.unwrap_or(root(Object::Unknown(v)))
    }

    fn owner(v: ValueRef) -> Option<FnId> {
        match v {
            ValueRef::Global(_) => None,
            ValueRef::Param(f, _) | ValueRef::Inst(f, _) => Some(f),
        }
    }

    fn allocation_vs_param(alloc: Object, other: Object) -> bool {
        let (Object::Stack(a) | Object::Heap(a)) = alloc else { return false };
        let Object::Unknown(p @ ValueRef::Param(_, _)) = other else { return false };
        Self::owner(a) == Self::owner(p)
    }
}

#[inline]
fn root(object: Object) -> Location {
    Location {
        object,
        offset: Offset::Known(0),
    }
}

fn dependencies(inst: &Inst) -> impl Iterator<Item = ValueRef> + '_ {
    let ops: &[Operand] = match &inst.kind {
        InstKind::Gep { base, .. } => std::slice::from_ref(base),
        InstKind::BitCast(op) => std::slice::from_ref(op),
        InstKind::Phi(ops) => ops,
        _ => &[],
    };
    let select = match &inst.kind {
        InstKind::Select { then, els, .. } => [Some(*then), Some(*els)],
        _ => [None, None],
    };
    ops.iter()
        .copied()
        .chain(select.into_iter().flatten())
        .filter_map(|op| match op {
            Operand::Value(v @ ValueRef::Inst(_, _)) => Some(v),
            _ => None,
        })
}

impl AliasOracle<ValueRef> for BasicOracle<'_> {
    fn alias(&self, a: ValueRef, b: ValueRef) -> AliasResult {
        if a == b {
            return AliasResult::MustAlias;
        }
        let la = self.location(a);
        let lb = self.location(b);
        let (oa, ob) = (la.object, lb.object);

        if oa == Object::Null || ob == Object::Null {
            return if la == lb {
                AliasResult::MustAlias
            } else {
                AliasResult::NoAlias
            };
        }
        if oa == ob {
            return match (la.offset, lb.offset) {
                (Offset::Known(x), Offset::Known(y)) if x == y => AliasResult::MustAlias,
                (Offset::Known(_), Offset::Known(_)) => AliasResult::PartialAlias,
                _ => AliasResult::MayAlias,
            };
        }
        if oa.is_identified() && ob.is_identified() {
            return AliasResult::NoAlias;
        }
        if Self::allocation_vs_param(oa, ob) || Self::allocation_vs_param(ob, oa) {
            return AliasResult::NoAlias;
        }
        AliasResult::MayAlias
    }
}
