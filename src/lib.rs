pub mod alias_set;
pub mod disjoint_set;
pub mod ir;
pub mod program;
pub mod registry;
