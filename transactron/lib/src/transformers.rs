//! Methods built out of other methods.
use crate::condition::{ConditionOptions, condition};
use crate::connectors::{ConnectTrans, Forwarder, ManyToOneConnectTrans};
use itertools::Itertools;
use transactron_core::{Method, TModule, Transaction};
use transactron_ir::{Expr, Layout, Signal, Value};
use transactron_utils::{Error, GPosIdx, Id, TransactronResult};

/// Rewrites a value flowing into or out of a method.
pub type Transform<'a> = Box<dyn FnOnce(&mut TModule, Value) -> TransactronResult<Value> + 'a>;

/// Merges the outputs of several calls.
pub type Combiner<'a> = Box<dyn FnOnce(&mut TModule, Vec<Value>) -> TransactronResult<Value> + 'a>;

/// A method that calls `target` with a transformed argument and transforms
/// its output.
#[derive(Debug, Clone)]
pub struct MethodMapper {
    pub method: Method,
}

pub struct MethodMapperBuilder<'a> {
    name: Id,
    target: &'a Method,
    i: Option<(Layout, Transform<'a>)>,
    o: Option<(Layout, Transform<'a>)>,
}

impl<'a> MethodMapperBuilder<'a> {
    /// Accept arguments of layout `layout` and map them with `f` before
    /// passing them on.
    pub fn i<L, F>(mut self, layout: L, f: F) -> Self
    where
        L: Into<Layout>,
        F: FnOnce(&mut TModule, Value) -> TransactronResult<Value> + 'a,
    {
        self.i = Some((layout.into(), Box::new(f)));
        self
    }

    /// Map the output of the target with `f`, which yields values of
    /// layout `layout`.
    pub fn o<L, F>(mut self, layout: L, f: F) -> Self
    where
        L: Into<Layout>,
        F: FnOnce(&mut TModule, Value) -> TransactronResult<Value> + 'a,
    {
        self.o = Some((layout.into(), Box::new(f)));
        self
    }

    #[track_caller]
    pub fn create(self, m: &mut TModule) -> TransactronResult<MethodMapper> {
        let target = self.target;
        let (layout_in, i_fun) = match self.i {
            Some((layout, f)) => (layout, Some(f)),
            None => (target.layout_in().clone(), None),
        };
        let (layout_out, o_fun) = match self.o {
            Some((layout, f)) => (layout, Some(f)),
            None => (target.layout_out().clone(), None),
        };
        let method = Method::build(self.name)
            .i(layout_in)
            .o(layout_out)
            .create(m)?;
        method.define(m, target.ready, |m, arg| {
            let arg = match i_fun {
                Some(f) => f(m, arg)?,
                None => arg,
            };
            let ret = target.call(m, arg)?;
            match o_fun {
                Some(f) => f(m, ret),
                None => Ok(ret),
            }
        })?;
        Ok(MethodMapper { method })
    }
}

impl MethodMapper {
    pub fn build<S: Into<Id>>(name: S, target: &Method) -> MethodMapperBuilder<'_> {
        MethodMapperBuilder {
            name: name.into(),
            target,
            i: None,
            o: None,
        }
    }
}

/// A method that calls `target` only when a predicate of the argument
/// holds, and otherwise returns a default value.
///
/// The two outcomes are separate alternatives, so the target's readiness
/// matters only when the predicate holds. Such a filter may have a single
/// caller. A strict filter instead is ready only when the predicate holds
/// and the target is ready, and always calls the target.
#[derive(Debug, Clone)]
pub struct MethodFilter {
    pub method: Method,
}

impl MethodFilter {
    #[track_caller]
    pub fn new<S, F>(
        m: &mut TModule,
        name: S,
        target: &Method,
        predicate: F,
        default: Option<Expr>,
        strict: bool,
    ) -> TransactronResult<Self>
    where
        S: Into<Id>,
        F: Fn(&Value) -> Expr + 'static,
    {
        let layout_out = target.layout_out().clone();
        let builder = Method::build(name)
            .i(target.layout_in().clone())
            .o(layout_out.clone());
        if strict {
            let method = builder.validate_arguments(predicate).create(m)?;
            method.define(m, true, |m, arg| target.call(m, arg))?;
            return Ok(MethodFilter { method });
        }

        let method = builder.single_caller().create(m)?;
        let ret = m.signal("filter_ret", layout_out.width());
        let default = default.unwrap_or_else(|| Expr::constant(0, layout_out.width()));
        m.comb(ret, default);

        method.define(m, true, |m, arg| {
            let cond = m.signal("filter_cond", 1);
            m.top_comb(cond, predicate(&arg));
            condition(m, ConditionOptions::default(), |m, branches| {
                branches.branch(m, cond, |m| {
                    let out = target.call(m, arg)?;
                    m.comb(ret, out);
                    Ok(())
                })?;
                branches.branch(m, !cond, |_| Ok(()))
            })?;
            Ok(Value::of(ret, layout_out.clone()))
        })?;
        Ok(MethodFilter { method })
    }
}

/// A method that calls every target with its argument.
///
/// The output is built from the targets' outputs by the combiner, or is the
/// output of the first target if there is none.
#[derive(Debug, Clone)]
pub struct MethodProduct {
    pub method: Method,
}

impl MethodProduct {
    #[track_caller]
    pub fn new<S: Into<Id>>(
        m: &mut TModule,
        name: S,
        targets: &[&Method],
        combiner: Option<(Layout, Combiner<'_>)>,
    ) -> TransactronResult<Self> {
        let pos = GPosIdx::caller();
        let Some(first) = targets.first() else {
            return Err(Error::misc("a method product needs at least one target").with_pos(&pos));
        };
        let layout_in = first.layout_in().clone();
        let (layout_out, combiner) = match combiner {
            Some((layout, f)) => (layout, Some(f)),
            None => (first.layout_out().clone(), None),
        };
        let method = Method::build(name)
            .i(layout_in)
            .o(layout_out)
            .create(m)?;
        method.define(m, true, |m, arg| {
            let results = targets
                .iter()
                .map(|t| t.call(m, &arg))
                .collect::<TransactronResult<Vec<_>>>()?;
            match combiner {
                Some(f) => f(m, results),
                None => Ok(results.into_iter().next().unwrap_or_else(Value::empty)),
            }
        })?;
        Ok(MethodProduct { method })
    }
}

/// Merges the outputs of the targets that succeeded in a [MethodTryProduct].
pub type TryCombiner<'a> =
    Box<dyn FnOnce(&mut TModule, Vec<(Signal, Value)>) -> TransactronResult<Value> + 'a>;

/// Like [MethodProduct], but every target is tried in its own transaction,
/// requested whenever the method runs, so targets that are not ready are
/// skipped.
///
/// The combiner receives, for every target, a signal telling whether the
/// call happened together with its output. Without a combiner the method
/// has no output.
#[derive(Debug, Clone)]
pub struct MethodTryProduct {
    pub method: Method,
}

impl MethodTryProduct {
    #[track_caller]
    pub fn new<S: Into<Id>>(
        m: &mut TModule,
        name: S,
        targets: &[&Method],
        combiner: Option<(Layout, TryCombiner<'_>)>,
    ) -> TransactronResult<Self> {
        let pos = GPosIdx::caller();
        let Some(first) = targets.first() else {
            return Err(Error::misc("a method product needs at least one target").with_pos(&pos));
        };
        let name = name.into();
        let (layout_out, combiner) = match combiner {
            Some((layout, f)) => (layout, Some(f)),
            None => (Layout::empty(), None),
        };
        let method = Method::build(name)
            .i(first.layout_in().clone())
            .o(layout_out)
            .create(m)?;
        let run = method.run;
        method.define(m, true, |m, arg| {
            let mut results = Vec::with_capacity(targets.len());
            for (i, target) in targets.iter().enumerate() {
                let success = m.signal(format!("success{i}"), 1);
                let t = Transaction::inner(m, format!("{name}_try{i}"))?;
                let mut out = Value::empty();
                t.body(m, run, |m| {
                    m.comb(success, true);
                    out = target.call(m, &arg)?;
                    Ok(())
                })?;
                results.push((success, out));
            }
            match combiner {
                Some(f) => f(m, results),
                None => Ok(Value::empty()),
            }
        })?;
        Ok(MethodTryProduct { method })
    }
}

/// A method that returns a value from any of the targets, which must share
/// an output layout and take no arguments.
#[derive(Debug, Clone)]
pub struct Collector {
    pub method: Method,
}

impl Collector {
    #[track_caller]
    pub fn new<S: Into<Id>>(m: &mut TModule, name: S, targets: &[&Method]) -> TransactronResult<Self> {
        let pos = GPosIdx::caller();
        let Some(first) = targets.first() else {
            return Err(Error::misc("a collector needs at least one target").with_pos(&pos));
        };
        let layout = first.layout_out().clone();
        if let Some(other) = targets.iter().find(|t| t.layout_out() != &layout) {
            return Err(Error::layout_mismatch(
                format!("output of `{}`", other.name()),
                &layout,
                other.layout_out(),
            )
            .with_pos(&pos));
        }
        let method = Method::build(name).o(layout.clone()).create(m)?;
        let forwarder = Forwarder::new(m, layout)?;
        ManyToOneConnectTrans::new(m, targets, &forwarder.write)?;
        method.proxy(m, &forwarder.read)?;
        Ok(Collector { method })
    }
}

/// A transaction that concatenates the outputs of `sources` and passes the
/// result to `sink`.
#[derive(Debug, Clone, Copy)]
pub struct CatTrans {
    pub transaction: Transaction,
}

impl CatTrans {
    #[track_caller]
    pub fn new(m: &mut TModule, sources: &[&Method], sink: &Method) -> TransactronResult<Self> {
        let name = format!(
            "cat_{}_{}",
            sources.iter().map(|s| s.name()).join("_"),
            sink.name()
        );
        let transaction = Transaction::new(m, name)?;
        transaction.body(m, true, |m| {
            let parts = sources
                .iter()
                .map(|s| s.call(m, ()).map(Value::into_expr))
                .collect::<TransactronResult<Vec<_>>>()?;
            sink.call(m, Expr::cat(parts))?;
            Ok(())
        })?;
        Ok(CatTrans { transaction })
    }
}

/// Connects `method1` to `method2` through a [MethodMapper] that rewrites
/// the values passed in both directions.
#[derive(Debug, Clone)]
pub struct ConnectAndMapTrans {
    pub mapper: MethodMapper,
    pub connect: ConnectTrans,
}

impl ConnectAndMapTrans {
    #[track_caller]
    pub fn new<'a, I, O>(
        m: &mut TModule,
        method1: &Method,
        method2: &'a Method,
        i_fun: I,
        o_fun: O,
    ) -> TransactronResult<Self>
    where
        I: FnOnce(&mut TModule, Value) -> TransactronResult<Value> + 'a,
        O: FnOnce(&mut TModule, Value) -> TransactronResult<Value> + 'a,
    {
        let mapper = MethodMapper::build(format!("{}_mapped", method2.name()), method2)
            .i(method1.layout_out().clone(), i_fun)
            .o(method1.layout_in().clone(), o_fun)
            .create(m)?;
        let connect = ConnectTrans::new(m, method1, &mapper.method)?;
        Ok(ConnectAndMapTrans { mapper, connect })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{Adapter, AdapterTrans};
    use transactron_core::{Context, ElaborationConfig};
    use transactron_utils::ErrorKind;

    fn add(v: u64, width: u32) -> Transform<'static> {
        Box::new(move |_, arg: Value| Ok(Value::bits(arg.into_expr() + Expr::constant(v, width))))
    }

    #[test]
    fn mapper_transforms_both_ways() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let target = Adapter::new(&mut m, Method::build("target").i(8).o(8)).unwrap();
        let mapper = MethodMapper::build("mapped", &target.iface)
            .i(8, add(1, 8))
            .o(8, add(10, 8))
            .create(&mut m)
            .unwrap();
        let caller = AdapterTrans::new(&mut m, &mapper.method).unwrap();
        drop(m);
        let elab = ctx.finish().unwrap();
        let mut sim = elab.simulator().unwrap();

        sim.set(target.en, 1).unwrap();
        sim.set(target.data_in, 5).unwrap();
        sim.set(caller.data_in, 2).unwrap();
        sim.set(caller.en, 1).unwrap();
        assert_eq!(sim.get(target.data_out), 3);
        assert_eq!(sim.get(caller.data_out), 15);
    }

    fn filtered(strict: bool) -> (Adapter, AdapterTrans, transactron_core::Elaborated) {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let target = Adapter::new(&mut m, Method::build("target").i(4).o(4)).unwrap();
        let filter = MethodFilter::new(
            &mut m,
            "even",
            &target.iface,
            |arg| !arg.expr().clone().get_bit(0),
            Some(Expr::constant(15, 4)),
            strict,
        )
        .unwrap();
        let caller = AdapterTrans::new(&mut m, &filter.method).unwrap();
        drop(m);
        (target, caller, ctx.finish().unwrap())
    }

    #[test]
    fn filter_returns_default_when_predicate_fails() {
        let (target, caller, elab) = filtered(false);
        let mut sim = elab.simulator().unwrap();

        sim.set(target.en, 1).unwrap();
        sim.set(target.data_in, 9).unwrap();
        sim.set(caller.en, 1).unwrap();
        sim.set(caller.data_in, 2).unwrap();
        assert_eq!(sim.get(caller.done), 1);
        assert_eq!(sim.get(target.done), 1);
        assert_eq!(sim.get(caller.data_out), 9);

        sim.set(caller.data_in, 3).unwrap();
        assert_eq!(sim.get(caller.done), 1);
        assert_eq!(sim.get(target.done), 0);
        assert_eq!(sim.get(caller.data_out), 15);

        // The target is not needed when the predicate fails.
        sim.set(target.en, 0).unwrap();
        assert_eq!(sim.get(caller.done), 1);
        sim.set(caller.data_in, 4).unwrap();
        assert_eq!(sim.get(caller.done), 0);
    }

    #[test]
    fn strict_filter_blocks_when_predicate_fails() {
        let (target, caller, elab) = filtered(true);
        let mut sim = elab.simulator().unwrap();

        sim.set(target.en, 1).unwrap();
        sim.set(target.data_in, 9).unwrap();
        sim.set(caller.en, 1).unwrap();
        sim.set(caller.data_in, 2).unwrap();
        assert_eq!(sim.get(caller.done), 1);
        assert_eq!(sim.get(caller.data_out), 9);
        sim.set(caller.data_in, 3).unwrap();
        assert_eq!(sim.get(caller.done), 0);
        assert_eq!(sim.get(target.done), 0);
    }

    #[test]
    fn product_calls_every_target() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let a = Adapter::new(&mut m, Method::build("a").i(4).o(4)).unwrap();
        let b = Adapter::new(&mut m, Method::build("b").i(4).o(4)).unwrap();
        let sum: Combiner = Box::new(|_, outs: Vec<Value>| {
            Ok(Value::bits(Expr::cat(outs.into_iter().map(Value::into_expr))))
        });
        let product =
            MethodProduct::new(&mut m, "both", &[&a.iface, &b.iface], Some((Layout::bits(8), sum)))
                .unwrap();
        let caller = AdapterTrans::new(&mut m, &product.method).unwrap();
        drop(m);
        let elab = ctx.finish().unwrap();
        let mut sim = elab.simulator().unwrap();

        sim.set(a.data_in, 1).unwrap();
        sim.set(b.data_in, 2).unwrap();
        sim.set(caller.data_in, 7).unwrap();
        sim.set(caller.en, 1).unwrap();
        sim.set(a.en, 1).unwrap();
        assert_eq!(sim.get(caller.done), 0);
        sim.set(b.en, 1).unwrap();
        assert_eq!(sim.get(caller.done), 1);
        assert_eq!(sim.get(a.data_out), 7);
        assert_eq!(sim.get(b.data_out), 7);
        assert_eq!(sim.get(caller.data_out), 0x21);
    }

    #[test]
    fn try_product_skips_targets_that_are_not_ready() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let a = Adapter::new(&mut m, Method::build("a").i(4)).unwrap();
        let b = Adapter::new(&mut m, Method::build("b").i(4)).unwrap();
        let count: TryCombiner = Box::new(|_, outs: Vec<(Signal, Value)>| {
            let bits = outs.into_iter().map(|(ok, _)| Expr::from(ok));
            Ok(Value::bits(Expr::cat(bits)))
        });
        let product = MethodTryProduct::new(
            &mut m,
            "try_both",
            &[&a.iface, &b.iface],
            Some((Layout::bits(2), count)),
        )
        .unwrap();
        let caller = AdapterTrans::new(&mut m, &product.method).unwrap();
        drop(m);
        let elab = ctx.finish().unwrap();
        let mut sim = elab.simulator().unwrap();

        sim.set(caller.en, 1).unwrap();
        sim.set(caller.data_in, 6).unwrap();
        assert_eq!(sim.get(caller.done), 1);
        assert_eq!(sim.get(caller.data_out), 0);
        sim.set(b.en, 1).unwrap();
        assert_eq!(sim.get(caller.data_out), 0b10);
        assert_eq!(sim.get(b.data_out), 6);
        sim.set(a.en, 1).unwrap();
        assert_eq!(sim.get(caller.data_out), 0b11);
    }

    #[test]
    fn collector_gathers_from_all_sources() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let a = Adapter::new(&mut m, Method::build("a").o(4)).unwrap();
        let b = Adapter::new(&mut m, Method::build("b").o(4)).unwrap();
        let collector = Collector::new(&mut m, "collect", &[&a.iface, &b.iface]).unwrap();
        let caller = AdapterTrans::new(&mut m, &collector.method).unwrap();
        let wide = Adapter::new(&mut m, Method::build("wide").o(8)).unwrap();
        let err = Collector::new(&mut m, "bad", &[&a.iface, &wide.iface]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::LayoutMismatch { .. }));
        drop(m);
        let elab = ctx.finish().unwrap();
        let mut sim = elab.simulator().unwrap();

        sim.set(caller.en, 1).unwrap();
        sim.set(b.data_in, 9).unwrap();
        assert_eq!(sim.get(caller.done), 0);
        sim.set(b.en, 1).unwrap();
        assert_eq!(sim.get(caller.done), 1);
        assert_eq!(sim.get(caller.data_out), 9);
    }

    #[test]
    fn cat_trans_concatenates_outputs() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let lo = Adapter::new(&mut m, Method::build("lo").o(4)).unwrap();
        let hi = Adapter::new(&mut m, Method::build("hi").o(4)).unwrap();
        let sink = Adapter::new(&mut m, Method::build("sink").i(8)).unwrap();
        CatTrans::new(&mut m, &[&lo.iface, &hi.iface], &sink.iface).unwrap();
        drop(m);
        let elab = ctx.finish().unwrap();
        let mut sim = elab.simulator().unwrap();

        for sig in [lo.en, hi.en, sink.en] {
            sim.set(sig, 1).unwrap();
        }
        sim.set(lo.data_in, 0x3).unwrap();
        sim.set(hi.data_in, 0xa).unwrap();
        assert_eq!(sim.get(sink.done), 1);
        assert_eq!(sim.get(sink.data_out), 0xa3);
    }

    #[test]
    fn connect_and_map_rewrites_values() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let src = Adapter::new(&mut m, Method::build("src").i(8).o(8)).unwrap();
        let dst = Adapter::new(&mut m, Method::build("dst").i(8).o(8)).unwrap();
        ConnectAndMapTrans::new(&mut m, &src.iface, &dst.iface, add(1, 8), add(2, 8)).unwrap();
        drop(m);
        let elab = ctx.finish().unwrap();
        let mut sim = elab.simulator().unwrap();

        sim.set(src.en, 1).unwrap();
        sim.set(dst.en, 1).unwrap();
        sim.set(src.data_in, 10).unwrap();
        sim.set(dst.data_in, 20).unwrap();
        assert_eq!(sim.get(dst.data_out), 11);
        assert_eq!(sim.get(src.data_out), 22);
    }
}
