//! Transactions and methods as entries of a single arena.
//!
//! A transaction and a method differ only in how their control signals are
//! driven, so both are stored as an [EndpointInfo]. A transaction's
//! `request`/`grant` pair occupies the slots of a method's `ready`/`run`.
//! Merging simultaneous transactions demotes them to methods by flipping
//! [EndpointKind].
use crate::method::Combine;
use linked_hash_map::LinkedHashMap;
use transactron_ir::{CtrlPath, Expr, Layout, ModuleIdx, PathPredicate, Signal, Value};
use transactron_utils::{GPosIdx, GetName, Id, WithPos, impl_index};

/// Index of a transaction or method in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointIdx(u32);
impl_index!(EndpointIdx);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Transaction,
    Method,
}

/// Which side of a conflict wins when both sides are runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    #[default]
    Undefined,
    /// The endpoint that declared the relation wins.
    Left,
    /// The other endpoint wins.
    Right,
}

/// A relation declared by an endpoint towards `end`.
#[derive(Debug, Clone)]
pub struct Relation {
    pub end: EndpointIdx,
    pub priority: Priority,
    /// `false` for pure ordering relations created by `schedule_before`.
    pub conflict: bool,
    pub silence_warning: bool,
    pub pos: GPosIdx,
}

/// One textual call of a method.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub ctrl_path: CtrlPath,
    pub predicate: PathPredicate,
    /// Argument of this call, driven unconditionally.
    pub arg: Signal,
    /// High when the control blocks around the call and its extra enable
    /// condition all hold.
    pub enable: Signal,
    pub pos: GPosIdx,
}

/// Every call of one method from one caller, together with the signals
/// that merge them.
#[derive(Debug, Clone)]
pub struct MethodUse {
    pub arg: Signal,
    pub enable: Signal,
    pub calls: Vec<CallRecord>,
}

impl MethodUse {
    /// Literals common to every call, i.e. a condition that holds whenever
    /// any of the calls is reachable.
    pub fn predicate(&self) -> PathPredicate {
        let Some((first, rest)) = self.calls.split_first() else {
            return PathPredicate::default();
        };
        let literals = first
            .predicate
            .literals()
            .iter()
            .filter(|lit| rest.iter().all(|c| c.predicate.literals().contains(lit)))
            .cloned()
            .collect();
        PathPredicate::new(literals)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MethodFlags {
    /// Several callers may run the method in the same cycle.
    pub nonexclusive: bool,
    /// At most one caller may use the method.
    pub single_caller: bool,
    /// Defined outside of the design; `ready` and `data_out` are inputs.
    pub external: bool,
}

/// Maps a call's argument to an extra readiness condition.
pub type Validator = Box<dyn Fn(&Value) -> Expr>;

pub struct EndpointInfo {
    pub name: Id,
    pub kind: EndpointKind,
    pub pos: GPosIdx,
    pub module: ModuleIdx,
    /// `ready` of a method, `request` of a transaction.
    pub ready: Signal,
    /// `run` of a method, `grant` of a transaction.
    pub run: Signal,
    /// `runnable` of a transaction. Methods reuse their `ready` signal.
    pub runnable: Signal,
    pub data_in: Signal,
    pub data_out: Signal,
    pub layout_in: Layout,
    pub layout_out: Layout,
    pub flags: MethodFlags,
    pub combiner: Option<Box<dyn Combine>>,
    pub validator: Option<Validator>,
    pub defined: bool,
    pub def_order: usize,
    /// Transactions that may be opened inside another body.
    pub inner: bool,
    pub ctrl_path: CtrlPath,
    pub predicate: PathPredicate,
    pub uses: LinkedHashMap<EndpointIdx, MethodUse>,
    pub relations: Vec<Relation>,
    pub simultaneous: Vec<EndpointIdx>,
    pub independent: Vec<EndpointIdx>,
}

impl EndpointInfo {
    pub fn is_transaction(&self) -> bool {
        self.kind == EndpointKind::Transaction
    }

    pub fn is_method(&self) -> bool {
        self.kind == EndpointKind::Method
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            EndpointKind::Transaction => "transaction",
            EndpointKind::Method => "method",
        }
    }

    /// The methods this endpoint calls, in order of first call.
    pub fn callees(&self) -> impl Iterator<Item = EndpointIdx> + '_ {
        self.uses.keys().copied()
    }
}

impl GetName for EndpointInfo {
    fn name(&self) -> Id {
        self.name
    }
}

impl WithPos for EndpointInfo {
    fn copy_span(&self) -> GPosIdx {
        self.pos
    }
}

impl std::fmt::Debug for EndpointInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointInfo")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("defined", &self.defined)
            .field("callees", &self.uses.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
