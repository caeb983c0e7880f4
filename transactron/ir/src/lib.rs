//! The circuit IR that Transactron elaborates into.
//!
//! A [Design] is a flat arena of signals (combinational wires and registers)
//! grouped into a tree of name-scoped modules, plus a list of guarded
//! [Assignment]s. A [ModuleBuilder] appends to a design while tracking the
//! enclosing control blocks, and the [Simulator] executes a design cycle by
//! cycle.
mod builder;
mod ctrl;
mod design;
mod expr;
mod layout;
mod printer;
mod sim;
mod value;

pub use builder::ModuleBuilder;
pub use ctrl::{CtrlPath, CtrlPathBuilder, EnterType, PathEdge, PathPredicate};
pub use design::{
    Assignment, Design, Domain, ModuleData, ModuleIdx, Signal, SignalData,
    SignalIdx, SignalKind,
};
pub use expr::{BinOp, CmpOp, Expr, ReduceOp};
pub use layout::{Field, Layout};
pub use printer::Printer;
pub use sim::{SimError, SimResult, Simulator};
pub use value::Value;
