//! Bridges between methods and plain signals.
//!
//! [AdapterTrans] calls a method whenever an enable signal is high, and
//! [Adapter] implements a method whose caller is driven from the outside.
//! Both are mainly used to drive designs from a testbench.
use transactron_core::{Method, MethodBuilder, TModule, Transaction};
use transactron_ir::{Signal, Value};
use transactron_utils::TransactronResult;

/// Calls a method in every cycle in which `en` is set.
///
/// `done` reports whether the call happened, `data_in` is the argument and
/// `data_out` the method's output.
#[derive(Debug, Clone, Copy)]
pub struct AdapterTrans {
    pub en: Signal,
    pub done: Signal,
    pub data_in: Signal,
    pub data_out: Signal,
    pub transaction: Transaction,
}

impl AdapterTrans {
    #[track_caller]
    pub fn new(m: &mut TModule, iface: &Method) -> TransactronResult<Self> {
        let name = format!("adapter_trans_{}", iface.name());
        let mut m = m.child(name.as_str());
        let m = &mut m;
        let en = m.signal("en", 1);
        let done = m.signal("done", 1);
        let data_in = m.signal("data_in", iface.layout_in().width());
        let data_out = m.signal("data_out", iface.layout_out().width());

        let transaction = Transaction::new(m, name)?;
        transaction.body(m, en, |m| {
            let ret = iface.call(m, Value::of(data_in, iface.layout_in().clone()))?;
            m.top_comb(data_out, ret);
            m.comb(done, true);
            Ok(())
        })?;
        Ok(AdapterTrans {
            en,
            done,
            data_in,
            data_out,
            transaction,
        })
    }
}

/// Implements a method that is ready whenever `en` is set.
///
/// When a caller runs the method, `done` is set, its argument appears on
/// `data_out` and the caller receives `data_in`.
#[derive(Debug, Clone)]
pub struct Adapter {
    pub iface: Method,
    pub en: Signal,
    pub done: Signal,
    pub data_in: Signal,
    pub data_out: Signal,
}

impl Adapter {
    #[track_caller]
    pub fn new(m: &mut TModule, builder: MethodBuilder) -> TransactronResult<Self> {
        let mut m = m.child("adapter");
        let m = &mut m;
        let iface = builder.create(m)?;
        let en = m.signal("en", 1);
        let done = m.signal("done", 1);
        let data_in = m.signal("data_in", iface.layout_out().width());
        let data_out = m.signal("data_out", iface.layout_in().width());

        let layout_out = iface.layout_out().clone();
        iface.define(m, en, |m, arg| {
            m.top_comb(data_out, arg);
            m.comb(done, true);
            Ok(Value::of(data_in, layout_out))
        })?;
        Ok(Adapter {
            iface,
            en,
            done,
            data_in,
            data_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transactron_core::{Context, ElaborationConfig};

    #[test]
    fn adapters_connect_back_to_back() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let inner = Adapter::new(&mut m, Method::build("inc").i(8).o(8)).unwrap();
        let outer = AdapterTrans::new(&mut m, &inner.iface).unwrap();
        drop(m);
        let elab = ctx.finish().unwrap();
        let mut sim = elab.simulator().unwrap();

        sim.set(outer.en, 1).unwrap();
        sim.set(outer.data_in, 41).unwrap();
        sim.set(inner.data_in, 7).unwrap();
        assert_eq!(sim.get(outer.done), 0);
        sim.set(inner.en, 1).unwrap();
        assert_eq!(sim.get(outer.done), 1);
        assert_eq!(sim.get(inner.done), 1);
        assert_eq!(sim.get(inner.data_out), 41);
        assert_eq!(sim.get(outer.data_out), 7);

        sim.set(outer.en, 0).unwrap();
        assert_eq!(sim.get(inner.done), 0);
    }
}
