//! A small SSA program representation with a textual syntax, used to drive
//! the alias-set analysis without an external compiler.
//!
//! ```text
//! extern fn getenv
//! global @g
//! fn pick(%a: ptr, %b: ptr) -> ptr {
//!   %x = load int %a
//!   %y = load int %b
//!   %c = icmp %x, %y
//!   %p = select ptr %c, %a, %b
//!   ret %p
//! }
//! ```

mod oracle;
mod parse;

use std::collections::HashMap;

pub use oracle::BasicOracle;
pub use parse::{load_module, parse_module, LoadError, ParseError};

use crate::program::Program;

/// External functions whose result is a fresh heap object.
pub const ALLOCATORS: [&str; 3] = ["malloc", "calloc", "realloc"];

#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FnId(usize);

impl std::fmt::Debug for FnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#f{}", self.0)
    }
}

#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(usize);

impl std::fmt::Debug for GlobalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#g{}", self.0)
    }
}

/// Handle of a value in a [`Module`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueRef {
    Global(GlobalId),
    Param(FnId, u32),
    Inst(FnId, u32),
}

impl std::fmt::Debug for ValueRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global(g) => write!(f, "{:?}", g),
            Self::Param(func, i) => write!(f, "{:?}_p{}", func, i),
            Self::Inst(func, i) => write!(f, "{:?}_{}", func, i),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ty {
    Ptr,
    Int,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Value(ValueRef),
    Const(i64),
    Null,
}

impl Operand {
    /// The operand as a parameter or instruction result.
    #[inline]
    pub fn local_value(self) -> Option<ValueRef> {
        match self {
            Self::Value(v @ (ValueRef::Param(..) | ValueRef::Inst(..))) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    ICmp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    Defined(FnId),
    External(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstKind {
    Alloca,
    Call { callee: Callee, args: Vec<Operand> },
    Gep { base: Operand, offset: Operand },
    BitCast(Operand),
    Load(Operand),
    Store { value: Operand, ptr: Operand },
    Select { cond: Operand, then: Operand, els: Operand },
    Phi(Vec<Operand>),
    Binary(BinOp, Operand, Operand),
    Ret(Option<Operand>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inst {
    pub name: Option<String>,
    pub ty: Ty,
    pub kind: InstKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret_ty: Ty,
    pub insts: Vec<Inst>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub name: String,
}

/// Call instruction identified by its caller and position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub caller: FnId,
    pub inst: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    globals: Vec<Global>,
    functions: Vec<Function>,
    externs: Vec<String>,
    callers: HashMap<FnId, Vec<CallSite>>,
}

impl Module {
    pub fn new(globals: Vec<Global>, functions: Vec<Function>, externs: Vec<String>) -> Self {
        let mut callers: HashMap<_, Vec<_>> = HashMap::new();
        for (i, func) in functions.iter().enumerate() {
            for (j, inst) in func.insts.iter().enumerate() {
                if let InstKind::Call {
                    callee: Callee::Defined(callee),
                    ..
                } = &inst.kind
                {
                    callers.entry(*callee).or_default().push(CallSite {
                        caller: FnId(i),
                        inst: j as _,
                    });
                }
            }
        }
        Self {
            globals,
            functions,
            externs,
            callers,
        }
    }

    #[inline]
    pub fn function(&self, f: FnId) -> &Function {
        &self.functions[f.0]
    }

    pub fn fn_ids(&self) -> impl Iterator<Item = FnId> + '_ {
        (0..self.functions.len()).map(FnId)
    }

    pub fn find_function(&self, name: &str) -> Option<FnId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(FnId)
    }

    pub fn find_global(&self, name: &str) -> Option<GlobalId> {
        self.globals
            .iter()
            .position(|g| g.name == name)
            .map(GlobalId)
    }

    #[inline]
    pub fn global(&self, g: GlobalId) -> &Global {
        &self.globals[g.0]
    }

    #[inline]
    pub fn externs(&self) -> &[String] {
        &self.externs
    }

    /// Looks up a parameter or a named instruction of `f`.
    pub fn find_value(&self, f: FnId, name: &str) -> Option<ValueRef> {
        let func = self.function(f);
        if let Some(i) = func.params.iter().position(|p| p.name == name) {
            return Some(ValueRef::Param(f, i as _));
        }
        func.insts
            .iter()
            .position(|inst| inst.name.as_deref() == Some(name))
            .map(|i| ValueRef::Inst(f, i as _))
    }

    /// The instruction behind `v`, if `v` is an instruction result.
    pub fn inst(&self, v: ValueRef) -> Option<&Inst> {
        let ValueRef::Inst(f, i) = v else { return None };
        Some(&self.function(f).insts[i as usize])
    }

    pub fn ty(&self, v: ValueRef) -> Ty {
        match v {
            ValueRef::Global(_) => Ty::Ptr,
            ValueRef::Param(f, i) => self.function(f).params[i as usize].ty,
            ValueRef::Inst(f, i) => self.function(f).insts[i as usize].ty,
        }
    }

    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }
}

impl Program for Module {
    type Entity = ValueRef;
    type Function = FnId;
    type CallSite = CallSite;

    fn functions(&self) -> Vec<FnId> {
        self.fn_ids().collect()
    }

    fn params(&self, f: FnId) -> Vec<ValueRef> {
        (0..self.function(f).params.len())
            .map(|i| ValueRef::Param(f, i as _))
            .collect()
    }

    fn instructions(&self, f: FnId) -> Vec<ValueRef> {
        (0..self.function(f).insts.len())
            .map(|i| ValueRef::Inst(f, i as _))
            .collect()
    }

    fn is_pointer(&self, e: ValueRef) -> bool {
        self.ty(e) == Ty::Ptr
    }

    fn call_sites(&self, f: FnId) -> Vec<CallSite> {
        self.callers.get(&f).cloned().unwrap_or_default()
    }

    fn call_args(&self, call: CallSite) -> Vec<Option<ValueRef>> {
        let inst = &self.function(call.caller).insts[call.inst as usize];
        let InstKind::Call { args, .. } = &inst.kind else {
            panic!("{:?} is not a call", call)
        };
        args.iter().map(|a| a.local_value()).collect()
    }

    fn call_result(&self, call: CallSite) -> Option<ValueRef> {
        let inst = &self.function(call.caller).insts[call.inst as usize];
        if inst.ty == Ty::Void {
            None
        } else {
            Some(ValueRef::Inst(call.caller, call.inst))
        }
    }

    fn returned_values(&self, f: FnId) -> Vec<ValueRef> {
        self.function(f)
            .insts
            .iter()
            .filter_map(|inst| match inst.kind {
                InstKind::Ret(Some(op)) => op.local_value(),
                _ => None,
            })
            .collect()
    }

    fn name_of(&self, e: ValueRef) -> (Option<String>, String) {
        match e {
            ValueRef::Global(g) => (None, self.global(g).name.clone()),
            ValueRef::Param(f, i) => {
                let func = self.function(f);
                (Some(func.name.clone()), func.params[i as usize].name.clone())
            }
            ValueRef::Inst(f, i) => {
                let func = self.function(f);
                let name = func.insts[i as usize].name.clone().unwrap_or_default();
                (Some(func.name.clone()), name)
            }
        }
    }
}
