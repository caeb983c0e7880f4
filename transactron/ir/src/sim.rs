//! A cycle-accurate, two-valued simulator for [Design]s.
//!
//! Combinational signals are evaluated in dependency order. Groups of
//! signals that depend on each other are iterated until they stop changing;
//! a group that does not settle is reported as a combinational loop.
use crate::{Design, Domain, Expr, Signal, SignalIdx, SignalKind};
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use thiserror::Error;
use transactron_utils::math::mask;
use transactron_utils::IndexRef;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("combinational loop through `{0}'")]
    CombinationalLoop(String),
    #[error("signal `{name}' is {width} bits wide; at most 64 bits are supported")]
    WidthOverflow { name: String, width: u32 },
    #[error("`{0}' is driven by the design and cannot be set")]
    DrivenSignal(String),
    #[error("{domain} assignment to `{name}', which is a {kind}")]
    DomainMismatch {
        name: String,
        domain: &'static str,
        kind: &'static str,
    },
    #[error("cycle {cycle}: {message}")]
    HardwareError { cycle: u64, message: String },
}

pub type SimResult<T> = Result<T, SimError>;

pub struct Simulator<'a> {
    design: &'a Design,
    values: Vec<u64>,
    /// Indices of the combinational assignments driving each signal.
    comb: Vec<Vec<usize>>,
    /// Indices of the synchronous assignments driving each register.
    sync: Vec<Vec<usize>>,
    /// Strongly connected groups of wires, in evaluation order.
    order: Vec<Vec<SignalIdx>>,
    /// Whether each group needs to be iterated to a fixed point.
    cyclic: Vec<bool>,
    cycle: u64,
}

impl<'a> Simulator<'a> {
    /// Prepare `design` for simulation. Registers start at their reset
    /// values and the combinational signals are settled.
    pub fn new(design: &'a Design) -> SimResult<Self> {
        let n = design.signal_count();
        let mut comb = vec![vec![]; n];
        let mut sync = vec![vec![]; n];
        for (idx, data) in design.signals() {
            if data.width > 64 {
                return Err(SimError::WidthOverflow {
                    name: design.full_name(idx),
                    width: data.width,
                });
            }
        }
        for (i, assign) in design.assignments().iter().enumerate() {
            let data = design.signal(assign.dst.idx);
            match (assign.domain, data.kind) {
                (Domain::Comb, SignalKind::Wire) => comb[assign.dst.idx.index()].push(i),
                (Domain::Sync, SignalKind::Reg) => sync[assign.dst.idx.index()].push(i),
                (Domain::Comb, SignalKind::Reg) => {
                    return Err(SimError::DomainMismatch {
                        name: design.full_name(assign.dst.idx),
                        domain: "combinational",
                        kind: "register",
                    });
                }
                (Domain::Sync, SignalKind::Wire) => {
                    return Err(SimError::DomainMismatch {
                        name: design.full_name(assign.dst.idx),
                        domain: "synchronous",
                        kind: "wire",
                    });
                }
            }
        }

        let mut graph: DiGraphMap<SignalIdx, ()> = DiGraphMap::new();
        for (idx, _) in design.signals() {
            graph.add_node(idx);
        }
        for assign in design.assignments() {
            if assign.domain != Domain::Comb {
                continue;
            }
            let mut add = |src: Signal| {
                graph.add_edge(src.idx, assign.dst.idx, ());
            };
            assign.src.for_each_signal(&mut add);
            assign.guard.for_each_signal(&mut add);
        }
        // `tarjan_scc` returns the components in reverse topological order.
        let mut order = tarjan_scc(&graph);
        order.reverse();
        let cyclic: Vec<bool> = order
            .iter()
            .map(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .collect();

        log::debug!(
            "simulating {n} signals in {} groups, {} cyclic",
            order.len(),
            cyclic.iter().filter(|c| **c).count()
        );

        let values = design.signals().map(|(_, data)| data.init).collect();
        let mut sim = Simulator {
            design,
            values,
            comb,
            sync,
            order,
            cyclic,
            cycle: 0,
        };
        sim.settle()?;
        Ok(sim)
    }

    pub fn design(&self) -> &'a Design {
        self.design
    }

    /// Number of clock edges so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn get(&self, sig: Signal) -> u64 {
        self.values[sig.idx.index()]
    }

    /// Value of the signal at the hierarchical `path`, if there is one.
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<u64> {
        self.design.find(path).map(|sig| self.get(sig))
    }

    pub fn eval(&self, expr: &Expr) -> u64 {
        expr.eval(&|idx| self.values[idx.index()])
    }

    /// Drive an input. Only wires without any assignment can be set. The
    /// combinational signals are settled afterwards.
    pub fn set(&mut self, sig: Signal, value: u64) -> SimResult<()> {
        let data = self.design.signal(sig.idx);
        if data.kind == SignalKind::Reg || !self.comb[sig.idx.index()].is_empty() {
            return Err(SimError::DrivenSignal(self.design.full_name(sig.idx)));
        }
        self.values[sig.idx.index()] = value & mask(data.width);
        self.settle()
    }

    fn compute(&self, sig: SignalIdx) -> u64 {
        let data = self.design.signal(sig);
        let assignments = self.design.assignments();
        let mut value = data.init;
        if self.comb[sig.index()].is_empty() {
            return self.values[sig.index()];
        }
        for &i in &self.comb[sig.index()] {
            let assign = &assignments[i];
            if self.eval(&assign.guard) != 0 {
                value = self.eval(&assign.src);
            }
        }
        value & mask(data.width)
    }

    /// Recompute every combinational signal from the inputs and registers.
    pub fn settle(&mut self) -> SimResult<()> {
        for g in 0..self.order.len() {
            if !self.cyclic[g] {
                let sig = self.order[g][0];
                if self.design.signal(sig).kind == SignalKind::Wire {
                    self.values[sig.index()] = self.compute(sig);
                }
                continue;
            }
            for &sig in &self.order[g] {
                if !self.comb[sig.index()].is_empty() {
                    self.values[sig.index()] = self.design.signal(sig).init;
                }
            }
            let limit = self.order[g].len() + 2;
            let mut stable = false;
            for _ in 0..limit {
                let mut changed = false;
                for k in 0..self.order[g].len() {
                    let sig = self.order[g][k];
                    let value = self.compute(sig);
                    if value != self.values[sig.index()] {
                        self.values[sig.index()] = value;
                        changed = true;
                    }
                }
                if !changed {
                    stable = true;
                    break;
                }
            }
            if !stable {
                return Err(SimError::CombinationalLoop(
                    self.design.full_name(self.order[g][0]),
                ));
            }
        }
        Ok(())
    }

    /// Clock edge: every register takes the value of its last active
    /// synchronous assignment, then the combinational signals settle.
    pub fn step(&mut self) -> SimResult<()> {
        let assignments = self.design.assignments();
        let next = self
            .sync
            .iter()
            .enumerate()
            .filter(|(_, drivers)| !drivers.is_empty())
            .map(|(sig, drivers)| {
                let mut value = self.values[sig];
                for &i in drivers {
                    if self.eval(&assignments[i].guard) != 0 {
                        value = self.eval(&assignments[i].src);
                    }
                }
                (sig, value & mask(assignments[drivers[0]].dst.width))
            })
            .collect::<Vec<_>>();
        for (sig, value) in next {
            self.values[sig] = value;
        }
        self.cycle += 1;
        self.settle()
    }

    /// `n` clock edges.
    pub fn run(&mut self, n: u64) -> SimResult<()> {
        for _ in 0..n {
            self.step()?;
        }
        Ok(())
    }
}
