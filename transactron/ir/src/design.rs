use crate::Expr;
use transactron_utils::{
    GPosIdx, Id, IndexRef, IndexedMap, NameGenerator, impl_index,
};

/// Index of a signal in a [Design].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalIdx(pub(crate) u32);
impl_index!(SignalIdx);

/// Index of a module in a [Design].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleIdx(pub(crate) u32);
impl_index!(ModuleIdx);

/// Handle to a signal. Carries the width so that expressions can be sized
/// without access to the design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signal {
    pub idx: SignalIdx,
    pub width: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// Combinational; takes `init` when no assignment is active.
    Wire,
    /// Clocked; reset to `init`, keeps its value when no assignment is active.
    Reg,
}

#[derive(Debug, Clone)]
pub struct SignalData {
    pub name: Id,
    pub width: u32,
    pub kind: SignalKind,
    pub init: u64,
    pub module: ModuleIdx,
}

#[derive(Debug, Clone)]
pub struct ModuleData {
    pub name: Id,
    pub parent: Option<ModuleIdx>,
    /// Names of the signals of this module.
    signal_names: NameGenerator,
    /// Names of the submodules of this module.
    module_names: NameGenerator,
}

/// Assignment domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// Combinational: the value in the current cycle.
    Comb,
    /// Synchronous: the value of a register in the next cycle.
    Sync,
}

/// `dst = src` whenever `guard` is high. When several assignments to the
/// same signal are active, the one added last wins.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub dst: Signal,
    pub src: Expr,
    pub guard: Expr,
    pub domain: Domain,
    pub pos: GPosIdx,
}

/// A synchronous circuit: signals organised in a module tree, and the
/// assignments driving them.
#[derive(Debug, Clone)]
pub struct Design {
    signals: IndexedMap<SignalIdx, SignalData>,
    modules: IndexedMap<ModuleIdx, ModuleData>,
    assignments: Vec<Assignment>,
}

impl Design {
    pub fn new<S: Into<Id>>(top: S) -> Self {
        let mut modules = IndexedMap::new();
        modules.push(ModuleData {
            name: top.into(),
            parent: None,
            signal_names: NameGenerator::default(),
            module_names: NameGenerator::default(),
        });
        Design {
            signals: IndexedMap::new(),
            modules,
            assignments: vec![],
        }
    }

    /// The root module.
    pub fn top(&self) -> ModuleIdx {
        ModuleIdx::new(0)
    }

    /// Create a submodule of `parent`. The name is made unique among the
    /// siblings.
    pub fn add_module<S: Into<Id>>(&mut self, parent: ModuleIdx, name: S) -> ModuleIdx {
        let name = self.modules[parent].module_names.gen_name(name);
        self.modules.push(ModuleData {
            name,
            parent: Some(parent),
            signal_names: NameGenerator::default(),
            module_names: NameGenerator::default(),
        })
    }

    fn add_signal<S: Into<Id>>(
        &mut self,
        module: ModuleIdx,
        name: S,
        width: u32,
        kind: SignalKind,
        init: u64,
    ) -> Signal {
        let name = self.modules[module].signal_names.gen_name(name);
        let idx = self.signals.push(SignalData {
            name,
            width,
            kind,
            init,
            module,
        });
        Signal { idx, width }
    }

    /// A new combinational wire that defaults to `init`.
    pub fn fresh_signal<S: Into<Id>>(
        &mut self,
        module: ModuleIdx,
        name: S,
        width: u32,
        init: u64,
    ) -> Signal {
        self.add_signal(module, name, width, SignalKind::Wire, init)
    }

    /// A new register with the given reset value.
    pub fn fresh_register<S: Into<Id>>(
        &mut self,
        module: ModuleIdx,
        name: S,
        width: u32,
        reset: u64,
    ) -> Signal {
        self.add_signal(module, name, width, SignalKind::Reg, reset)
    }

    pub fn assign(&mut self, assign: Assignment) {
        self.assignments.push(assign)
    }

    pub fn signal(&self, sig: SignalIdx) -> &SignalData {
        &self.signals[sig]
    }

    pub fn signals(&self) -> impl Iterator<Item = (SignalIdx, &SignalData)> {
        self.signals.iter()
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    pub fn module(&self, module: ModuleIdx) -> &ModuleData {
        &self.modules[module]
    }

    pub fn modules(&self) -> impl Iterator<Item = (ModuleIdx, &ModuleData)> {
        self.modules.iter()
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    /// Names of the modules from the top down to `module`.
    pub fn module_path(&self, module: ModuleIdx) -> Vec<Id> {
        let mut path = vec![];
        let mut cur = Some(module);
        while let Some(m) = cur {
            path.push(self.modules[m].name);
            cur = self.modules[m].parent;
        }
        path.reverse();
        path
    }

    /// Hierarchical location of a signal: the module path followed by the
    /// signal name.
    pub fn path(&self, sig: SignalIdx) -> Vec<String> {
        let data = &self.signals[sig];
        self.module_path(data.module)
            .into_iter()
            .chain(std::iter::once(data.name))
            .map(|id| id.to_string())
            .collect()
    }

    /// Dotted form of [Design::path].
    pub fn full_name(&self, sig: SignalIdx) -> String {
        self.path(sig).join(".")
    }

    /// Look up a signal by its hierarchical path.
    pub fn find<S: AsRef<str>>(&self, path: &[S]) -> Option<Signal> {
        self.signals
            .iter()
            .find(|(idx, _)| {
                let p = self.path(*idx);
                p.len() == path.len()
                    && p.iter().zip(path).all(|(a, b)| a == b.as_ref())
            })
            .map(|(idx, data)| Signal {
                idx,
                width: data.width,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_hierarchical() {
        let mut design = Design::new("top");
        let fifo = design.add_module(design.top(), "fifo");
        let fifo2 = design.add_module(design.top(), "fifo");
        let level = design.fresh_register(fifo, "level", 3, 0);
        let level2 = design.fresh_register(fifo, "level", 3, 0);
        assert_eq!(design.path(level.idx), vec!["top", "fifo", "level"]);
        assert_eq!(design.path(level2.idx), vec!["top", "fifo", "level_1"]);
        assert_eq!(design.module(fifo2).name, "fifo_1");
        assert_eq!(design.find(&["top", "fifo", "level_1"]), Some(level2));
        assert_eq!(design.full_name(level.idx), "top.fifo.level");
    }
}
