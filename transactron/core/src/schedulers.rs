//! Schedulers for one connected component of the conflict graph.
//!
//! A scheduler drives the `grant` signal of every transaction of the
//! component from its `masked` readiness: `runnable`, blocked while a
//! conflicting transaction with priority over it is runnable. The grants of
//! two conflicting transactions are never high together.
use crate::config::SchedulerKind;
use crate::conflicts::ConflictGraph;
use crate::endpoint::EndpointIdx;
use crate::registry::Registry;
use ahash::AHashMap;
use transactron_ir::{Expr, ModuleBuilder, Signal};
use transactron_utils::ceil_log2;

pub struct ComponentInput<'a> {
    pub registry: &'a Registry,
    pub conflicts: &'a ConflictGraph,
    /// Transactions of the component, in priority order.
    pub component: &'a [EndpointIdx],
    pub masked: &'a AHashMap<EndpointIdx, Expr>,
}

impl ComponentInput<'_> {
    fn masked(&self, t: EndpointIdx) -> Expr {
        self.masked.get(&t).cloned().unwrap_or_else(Expr::zero)
    }

    fn grant(&self, t: EndpointIdx) -> Signal {
        self.registry.endpoint(t).run
    }

    fn name(&self, t: EndpointIdx) -> transactron_utils::Id {
        self.registry.name(t)
    }
}

pub fn schedule(kind: SchedulerKind, ir: &mut ModuleBuilder, input: &ComponentInput) {
    match kind {
        SchedulerKind::Eager => eager(ir, input),
        SchedulerKind::RoundRobin => round_robin(ir, input),
    }
}

/// Grants in a fixed order: each transaction is granted unless an earlier
/// conflicting one is.
pub fn eager(ir: &mut ModuleBuilder, input: &ComponentInput) {
    for (i, &t) in input.component.iter().enumerate() {
        let blocked = Expr::or_all(
            input.component[..i]
                .iter()
                .filter(|p| input.conflicts.conflicts(**p, t))
                .map(|p| Expr::from(input.grant(*p))),
        );
        ir.top_comb(input.grant(t), input.masked(t) & !blocked);
    }
}

/// Like [eager], but the transaction served first rotates among the
/// component in every cycle in which one of them is runnable.
pub fn round_robin(ir: &mut ModuleBuilder, input: &ComponentInput) {
    let cc = input.component;
    let n = cc.len();
    if n == 1 {
        ir.top_comb(input.grant(cc[0]), input.masked(cc[0]));
        return;
    }
    let width = ceil_log2(n as u64).max(1);
    let ptr = ir.register("rr_ptr", width, 0);

    let mut grants: Vec<Expr> = vec![Expr::zero(); n];
    for r in 0..n {
        let mut tentative: Vec<(usize, Signal)> = Vec::with_capacity(n);
        for k in 0..n {
            let i = (r + k) % n;
            let t = cc[i];
            let blocked = Expr::or_all(
                tentative
                    .iter()
                    .filter(|(j, _)| input.conflicts.conflicts(cc[*j], t))
                    .map(|(_, g)| Expr::from(*g)),
            );
            let g = ir.signal(format!("{}_rr{r}", input.name(t)), 1);
            ir.top_comb(g, input.masked(t) & !blocked);
            tentative.push((i, g));
            let sel = Expr::from(ptr).eq_const(r as u64) & g;
            grants[i] = std::mem::take(&mut grants[i]) | sel;
        }
    }
    for (&t, grant) in cc.iter().zip(grants) {
        ir.top_comb(input.grant(t), grant);
    }

    let any_runnable = Expr::or_all(
        cc.iter()
            .map(|t| Expr::from(input.registry.endpoint(*t).runnable)),
    );
    let last = Expr::from(ptr).eq_const(n as u64 - 1);
    let next = last.mux(Expr::constant(0, width), Expr::from(ptr) + Expr::constant(1, width));
    ir.sync(ptr, any_runnable.mux(next, ptr));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Context, ElaborationConfig, Method, Transaction};
    use transactron_ir::{Simulator, Value};

    fn contended(scheduler: SchedulerKind) -> Vec<(u64, u64)> {
        let config = ElaborationConfig::default().scheduler(scheduler);
        let mut ctx = Context::new("top", config);
        let mut m = ctx.top();
        let inc = Method::build("inc").create(&mut m).unwrap();
        inc.define(&mut m, true, |_, _| Ok(Value::empty())).unwrap();
        let ts = ["a", "b"].map(|n| Transaction::new(&mut m, n).unwrap());
        for t in &ts {
            t.body(&mut m, true, |m| inc.call(m, ()).map(|_| ())).unwrap();
        }
        drop(m);
        let elab = ctx.finish().unwrap();
        let mut sim = Simulator::new(&elab.design).unwrap();
        let mut out = vec![];
        for _ in 0..4 {
            sim.settle().unwrap();
            out.push((sim.get(ts[0].grant), sim.get(ts[1].grant)));
            sim.step().unwrap();
        }
        out
    }

    #[test]
    fn eager_prefers_the_first() {
        assert_eq!(contended(SchedulerKind::Eager), vec![(1, 0); 4]);
    }

    #[test]
    fn round_robin_alternates() {
        assert_eq!(
            contended(SchedulerKind::RoundRobin),
            vec![(1, 0), (0, 1), (1, 0), (0, 1)]
        );
    }
}
