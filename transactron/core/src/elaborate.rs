//! Elaboration: checking the registered transactions and methods, and
//! synthesizing the circuit that schedules them.
use crate::config::{ElaborationConfig, VERBOSE_ENV};
use crate::conflicts::ConflictGraph;
use crate::context::{Elaboratable, TModule};
use crate::endpoint::EndpointIdx;
use crate::generation::GenerationInfo;
use crate::hw_log::{LogLevel, LogPrinter};
use crate::method::{Combine, CombineInput, OneHotCombiner};
use crate::method_map::{MethodMap, check_call_graph};
use crate::metrics::MetricInfo;
use crate::profiler::ProfileCollector;
use crate::registry::Registry;
use crate::schedulers::{ComponentInput, schedule};
use crate::simultaneous::{check_components, merge};
use ahash::AHashMap;
use itertools::Itertools;
use regex::Regex;
use std::fmt::Write as _;
use std::io;
use transactron_ir::{Design, Expr, ModuleBuilder, Printer, SimResult, Simulator, Value};
use transactron_utils::{Error, Id, MultiError};

/// Name of the module that holds the scheduling logic.
pub const MANAGER_MODULE: &str = "transaction_manager";

/// Results of the analysis done when registration closes.
struct Analysis {
    method_map: MethodMap,
    conflicts: ConflictGraph,
    merged: Vec<EndpointIdx>,
}

/// A design under elaboration together with its registry.
pub struct Context {
    design: Design,
    registry: Registry,
    analysis: Option<Analysis>,
}

impl Context {
    pub fn new<S: Into<Id>>(top: S, config: ElaborationConfig) -> Self {
        Context {
            design: Design::new(top),
            registry: Registry::new(config),
            analysis: None,
        }
    }

    /// The top module.
    pub fn top(&mut self) -> TModule<'_> {
        let top = self.design.top();
        TModule::new(&mut self.registry, ModuleBuilder::new(&mut self.design, top))
    }

    pub fn design(&self) -> &Design {
        &self.design
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut Registry, &mut Design) {
        (&mut self.registry, &mut self.design)
    }

    /// Close registration. Checks that every transaction and method has a
    /// body and that the call graph is acyclic, merges simultaneous
    /// transactions and builds the conflict graph. Calling it again after it
    /// succeeded has no effect.
    pub fn finalize(&mut self) -> Result<(), MultiError> {
        if self.analysis.is_none() {
            self.analysis = Some(self.analyze()?);
        }
        Ok(())
    }

    fn analyze(&mut self) -> Result<Analysis, MultiError> {
        let mut errors = MultiError::new();
        for (_, info) in self.registry.endpoints() {
            if info.defined || info.flags.external {
                continue;
            }
            let err = if info.is_transaction() {
                Error::undefined_transaction(info.name)
            } else {
                Error::undefined_method(info.name)
            };
            errors.push(err.with_pos(info));
        }
        if let Err(err) = check_call_graph(&self.registry) {
            errors.push(err);
        }
        errors.into_result()?;

        let merged = merge(&mut self.registry, &mut self.design)?;
        let method_map = MethodMap::new(&self.registry)?;
        let conflicts = ConflictGraph::new(&self.registry, &method_map)?;
        check_components(&self.registry, &method_map, &conflicts)?;
        self.registry.set_finalized();
        log::info!(
            target: "transactron",
            "{} transactions, {} methods, {} conflict components, {} merged groups",
            method_map.transactions().len(),
            method_map.methods().len(),
            conflicts.components().len(),
            merged.len()
        );
        Ok(Analysis {
            method_map,
            conflicts,
            merged,
        })
    }

    /// Finalize and drive the control signals of every transaction and
    /// method.
    pub fn finish(mut self) -> Result<Elaborated, MultiError> {
        let analysis = match self.analysis.take() {
            Some(analysis) => analysis,
            None => self.analyze()?,
        };
        let Context {
            mut design,
            registry,
            ..
        } = self;
        let Analysis {
            method_map,
            conflicts,
            merged,
        } = analysis;

        {
            let top = design.top();
            let mut top = ModuleBuilder::new(&mut design, top);
            let mut ir = top.child(MANAGER_MODULE);
            synthesize(&mut ir, &registry, &method_map, &conflicts)?;
        }

        let gen_info = GenerationInfo::new(&design, &registry, &method_map, &conflicts);
        let verbose = registry.config().verbose
            || std::env::var(VERBOSE_ENV).is_ok_and(|v| !v.is_empty());
        let level = if verbose {
            log::Level::Info
        } else {
            log::Level::Debug
        };
        if log::log_enabled!(target: "transactron", level) {
            let text = report(&registry, &method_map, &conflicts);
            log::log!(target: "transactron", level, "{text}");
        }

        Ok(Elaborated {
            design,
            registry,
            method_map,
            conflicts,
            merged,
            gen_info,
        })
    }
}

/// Drive `runnable`, `grant` and the method `run` and `data_in` signals.
fn synthesize(
    ir: &mut ModuleBuilder,
    registry: &Registry,
    map: &MethodMap,
    conflicts: &ConflictGraph,
) -> Result<(), MultiError> {
    // Merge the calls of each method from one caller.
    for (_, info) in registry.endpoints() {
        for usage in info.uses.values() {
            if let [call] = usage.calls.as_slice() {
                ir.top_comb(usage.arg, call.arg);
                ir.top_comb(usage.enable, call.enable);
            } else {
                let arg = Expr::one_hot_mux(
                    usage.arg.width,
                    usage
                        .calls
                        .iter()
                        .map(|c| (Expr::from(c.enable), Expr::from(c.arg))),
                );
                ir.top_comb(usage.arg, arg);
                ir.top_comb(
                    usage.enable,
                    Expr::or_all(usage.calls.iter().map(|c| Expr::from(c.enable))),
                );
            }
        }
    }

    for &t in map.transactions() {
        let info = registry.endpoint(t);
        let ready = Expr::and_all(
            map.methods_by_transaction(t)
                .iter()
                .map(|m| map.readiness(t, *m)),
        );
        ir.top_comb(info.runnable, Expr::from(info.ready) & ready);
    }

    let masked: AHashMap<EndpointIdx, Expr> = map
        .transactions()
        .iter()
        .map(|&t| {
            let runnable = Expr::from(registry.endpoint(t).runnable);
            let preempted = Expr::or_all(
                conflicts
                    .masking(t)
                    .into_iter()
                    .map(|p| Expr::from(registry.endpoint(p).runnable)),
            );
            (t, runnable & !preempted)
        })
        .collect();
    let kind = registry.config().scheduler;
    for (i, component) in conflicts.components().iter().enumerate() {
        let mut sched = ir.child(format!("scheduler{i}"));
        let input = ComponentInput {
            registry,
            conflicts,
            component,
            masked: &masked,
        };
        schedule(kind, &mut sched, &input);
    }

    for &m in map.methods() {
        let run = Expr::or_all(
            map.transactions_by_method(m)
                .iter()
                .map(|&t| Expr::from(registry.endpoint(t).run) & map.enable(t, m)),
        );
        ir.top_comb(registry.endpoint(m).run, run);
    }

    let mut errors = MultiError::new();
    for &m in map.methods() {
        let info = registry.endpoint(m);
        let inputs = map
            .method_parents(m)
            .iter()
            .filter_map(|p| {
                let parent = registry.endpoint(*p);
                let usage = parent.uses.get(&m)?;
                Some(CombineInput {
                    arg: Value::of(usage.arg, info.layout_in.clone()),
                    run: Expr::from(parent.run) & usage.enable,
                })
            })
            .collect_vec();
        match inputs.as_slice() {
            [] => (),
            [input] => ir.top_comb(info.data_in, input.arg.expr().clone()),
            _ if info.flags.single_caller => {
                errors.push(Error::exclusive_method_overused(info.name, inputs.len()).with_pos(info));
            }
            _ => match &info.combiner {
                Some(combiner) => ir.top_comb(info.data_in, combiner.combine(&inputs)),
                None if info.flags.nonexclusive && info.layout_in.width() > 0 => {
                    errors.push(Error::missing_combiner(info.name, inputs.len()).with_pos(info));
                }
                None => ir.top_comb(info.data_in, OneHotCombiner.combine(&inputs)),
            },
        }
    }
    errors.into_result()
}

/// Human-readable summary of the scheduling problem.
fn report(registry: &Registry, map: &MethodMap, conflicts: &ConflictGraph) -> String {
    let loc = |idx: EndpointIdx| {
        let pos = registry.endpoint(idx).pos;
        format!("{}: {}:{}", registry.name(idx), pos.file(), pos.line())
    };
    let average = |total: usize, n: usize| if n == 0 { 0.0 } else { total as f64 / n as f64 };
    let components = conflicts.components();

    let mut out = String::new();
    let _ = writeln!(out, "Transactron statistics");
    let _ = writeln!(out, "\tMethods: {}", map.methods().len());
    let _ = writeln!(out, "\tTransactions: {}", map.transactions().len());
    let _ = writeln!(out, "\tIndependent subgraphs: {}", components.len());
    let callers: usize = map
        .methods()
        .iter()
        .map(|m| map.transactions_by_method(*m).len())
        .sum();
    let _ = writeln!(
        out,
        "\tAvg callers per method: {:.2}",
        average(callers, map.methods().len())
    );
    let _ = writeln!(
        out,
        "\tAvg conflicts per transaction: {:.2}",
        average(2 * conflicts.edge_count(), map.transactions().len())
    );

    let _ = writeln!(out, "\nTransaction subgraphs");
    for cc in &components {
        for t in cc {
            let _ = writeln!(out, "\t{}", registry.name(*t));
        }
        let _ = writeln!(out);
    }
    let _ = writeln!(out, "Calling transactions per method");
    for &m in map.methods() {
        let _ = writeln!(out, "\t{}", loc(m));
        for &t in map.transactions_by_method(m) {
            let _ = writeln!(out, "\t\t{}", loc(t));
        }
    }
    let _ = writeln!(out, "\nCalled methods per transaction");
    for &t in map.transactions() {
        let _ = writeln!(out, "\t{}", loc(t));
        for &m in map.methods_by_transaction(t) {
            let _ = writeln!(out, "\t\t{}", loc(m));
        }
    }
    out
}

/// A design whose transactions are scheduled.
pub struct Elaborated {
    pub design: Design,
    pub registry: Registry,
    pub method_map: MethodMap,
    pub conflicts: ConflictGraph,
    /// Transactions created for groups of simultaneous transactions.
    pub merged: Vec<EndpointIdx>,
    pub gen_info: GenerationInfo,
}

impl Elaborated {
    pub fn simulator(&self) -> SimResult<Simulator<'_>> {
        Simulator::new(&self.design)
    }

    pub fn profile_collector(&self) -> ProfileCollector {
        ProfileCollector::new(
            &self.registry,
            &self.method_map,
            self.gen_info.profile_data.clone(),
        )
    }

    pub fn log_printer(&self, level: LogLevel, namespace: &Regex) -> LogPrinter<'_> {
        LogPrinter::new(self.registry.logs(), level, namespace)
    }

    pub fn metric(&self, name: &str) -> Option<&MetricInfo> {
        self.registry.metrics().iter().find(|m| m.name == name)
    }

    pub fn write_netlist<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        Printer::write_design(&self.design, out)
    }
}

/// Elaborate `elab` as the top module of a new design and schedule it.
pub fn elaborate<S, E>(top: S, elab: &E, config: ElaborationConfig) -> Result<Elaborated, MultiError>
where
    S: Into<Id>,
    E: Elaboratable + ?Sized,
{
    let mut ctx = Context::new(top, config);
    elab.elaborate(&mut ctx.top())?;
    ctx.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, Transaction};
    use transactron_utils::{ErrorKind, TransactronResult};

    #[test]
    fn undefined_endpoints_are_all_reported() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        Method::build("m").create(&mut m).unwrap();
        Method::build("ext").external().create(&mut m).unwrap();
        Transaction::new(&mut m, "t").unwrap();
        drop(m);
        let errs = ctx.finalize().unwrap_err();
        let kinds = errs.kinds().collect_vec();
        assert_eq!(kinds.len(), 2);
        assert!(matches!(kinds[0], ErrorKind::UndefinedMethod(_)));
        assert!(matches!(kinds[1], ErrorKind::UndefinedTransaction(_)));
    }

    #[test]
    fn finalize_is_idempotent_and_closes_registration() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let t = Transaction::new(&mut m, "t").unwrap();
        t.body(&mut m, true, |_| Ok(())).unwrap();
        drop(m);
        ctx.finalize().unwrap();
        ctx.finalize().unwrap();
        let err = Transaction::new(&mut ctx.top(), "late").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Finalized(_)));
        assert!(ctx.finish().is_ok());
    }

    #[test]
    fn single_caller_methods_reject_a_second_caller() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let meth = Method::build("only").i(2).single_caller().create(&mut m).unwrap();
        meth.define(&mut m, true, |_, _| Ok(Value::empty())).unwrap();
        for name in ["a", "b"] {
            let t = Transaction::new(&mut m, name).unwrap();
            t.body(&mut m, true, |m| meth.call(m, Expr::constant(1, 2)).map(|_| ()))
                .unwrap();
        }
        drop(m);
        let errs = ctx.finish().err().unwrap();
        assert!(matches!(
            errs.first().map(|e| e.kind()),
            Some(ErrorKind::ExclusiveMethodOverused(_, 2))
        ));
    }

    #[test]
    fn nonexclusive_methods_need_a_combiner() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let meth = Method::build("shared").i(2).nonexclusive().create(&mut m).unwrap();
        meth.define(&mut m, true, |_, _| Ok(Value::empty())).unwrap();
        for name in ["a", "b"] {
            let t = Transaction::new(&mut m, name).unwrap();
            t.body(&mut m, true, |m| meth.call(m, Expr::constant(1, 2)).map(|_| ()))
                .unwrap();
        }
        drop(m);
        let errs = ctx.finish().err().unwrap();
        assert!(matches!(
            errs.first().map(|e| e.kind()),
            Some(ErrorKind::MissingCombiner(_, 2))
        ));
    }

    struct Toggle;

    impl Elaboratable for Toggle {
        fn elaborate(&self, m: &mut TModule) -> TransactronResult<()> {
            let bit = m.register("bit", 1, 0);
            let flip = Method::build("flip").create(m)?;
            flip.define(m, true, |m, _| {
                m.sync(bit, !bit);
                Ok(Value::empty())
            })?;
            let t = Transaction::new(m, "driver")?;
            t.body(m, true, |m| flip.call(m, ()).map(|_| ()))
        }
    }

    #[test]
    fn elaborates_and_simulates() {
        let elab = elaborate("top", &Toggle, ElaborationConfig::default()).unwrap();
        let mut sim = elab.simulator().unwrap();
        let bit = elab.design.find(&["top", "bit"]).unwrap();
        let mut seen = vec![];
        for _ in 0..3 {
            seen.push(sim.get(bit));
            sim.step().unwrap();
        }
        assert_eq!(seen, [0, 1, 0]);
        let mut netlist = vec![];
        elab.write_netlist(&mut netlist).unwrap();
        assert!(String::from_utf8(netlist).unwrap().contains("driver_grant"));
    }
}
