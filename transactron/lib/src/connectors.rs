//! One-entry buffers and direct connections between methods.
use transactron_core::{Endpoint, Method, Priority, TModule, Transaction};
use transactron_ir::{Expr, Layout, Value};
use transactron_utils::TransactronResult;

/// A one-entry buffer that passes a value from `write` to `read` in the
/// same cycle when both run.
///
/// If `write` runs without `read`, the value is kept and `write` stays
/// blocked until it is read. `clear` drops the stored value.
#[derive(Debug, Clone)]
pub struct Forwarder {
    pub read: Method,
    pub write: Method,
    pub clear: Method,
}

impl Forwarder {
    #[track_caller]
    pub fn new<L: Into<Layout>>(m: &mut TModule, layout: L) -> TransactronResult<Self> {
        let layout = layout.into();
        let width = layout.width();
        let mut m = m.child("forwarder");
        let m = &mut m;

        let read = Method::build("read").o(layout.clone()).create(m)?;
        let write = Method::build("write").i(layout.clone()).create(m)?;
        let clear = Method::build("clear").create(m)?;
        clear.add_conflict(m, &read, Priority::Left)?;
        clear.add_conflict(m, &write, Priority::Left)?;
        write.schedule_before(m, &read)?;

        let reg = m.register("reg", width, 0);
        let reg_valid = m.register("reg_valid", 1, 0);
        let read_value = m.signal("read_value", width);

        write.define(m, !reg_valid, |m, arg| {
            m.av_comb(read_value, arg.expr().clone());
            m.sync(reg, arg);
            m.sync(reg_valid, true);
            Ok(Value::empty())
        })?;

        // A stored value takes precedence over the forwarded one.
        m.if_(reg_valid, |m| {
            m.av_comb(read_value, reg);
            Ok(())
        })?;

        read.define(m, Expr::from(reg_valid) | write.run, |m, _| {
            m.sync(reg_valid, false);
            Ok(Value::of(read_value, layout.clone()))
        })?;

        clear.define(m, true, |m, _| {
            m.sync(reg_valid, false);
            Ok(Value::empty())
        })?;

        Ok(Forwarder { read, write, clear })
    }
}

/// A one-entry buffer that delays values by a cycle.
///
/// `write` may store a new value in the cycle in which the old one is read,
/// so a full pipe does not lose throughput.
#[derive(Debug, Clone)]
pub struct Pipe {
    pub read: Method,
    pub write: Method,
    pub clear: Method,
}

impl Pipe {
    #[track_caller]
    pub fn new<L: Into<Layout>>(m: &mut TModule, layout: L) -> TransactronResult<Self> {
        let layout = layout.into();
        let width = layout.width();
        let mut m = m.child("pipe");
        let m = &mut m;

        let read = Method::build("read").o(layout.clone()).create(m)?;
        let write = Method::build("write").i(layout.clone()).create(m)?;
        let clear = Method::build("clear").create(m)?;
        clear.add_conflict(m, &read, Priority::Left)?;
        clear.add_conflict(m, &write, Priority::Left)?;
        read.schedule_before(m, &write)?;

        let reg = m.register("reg", width, 0);
        let reg_valid = m.register("reg_valid", 1, 0);

        read.define(m, reg_valid, |m, _| {
            m.sync(reg_valid, false);
            Ok(Value::of(reg, layout.clone()))
        })?;

        write.define(m, !reg_valid | read.run, |m, arg| {
            m.sync(reg, arg);
            m.sync(reg_valid, true);
            Ok(Value::empty())
        })?;

        clear.define(m, true, |m, _| {
            m.sync(reg_valid, false);
            Ok(Value::empty())
        })?;

        Ok(Pipe { read, write, clear })
    }
}

/// A bidirectional, unbuffered connection. `write` and `read` always run
/// together: `write` passes its argument to `read`, and `read` passes its
/// argument back as the output of `write`.
#[derive(Debug, Clone)]
pub struct Connect {
    pub read: Method,
    pub write: Method,
}

impl Connect {
    #[track_caller]
    pub fn new<L, R>(m: &mut TModule, layout: L, rev_layout: R) -> TransactronResult<Self>
    where
        L: Into<Layout>,
        R: Into<Layout>,
    {
        let (layout, rev_layout) = (layout.into(), rev_layout.into());
        let mut m = m.child("connect");
        let m = &mut m;

        let read = Method::build("read")
            .i(rev_layout.clone())
            .o(layout.clone())
            .create(m)?;
        let write = Method::build("write")
            .i(layout.clone())
            .o(rev_layout.clone())
            .create(m)?;
        write.simultaneous(m, &[&read])?;

        let read_value = m.signal("read_value", layout.width());
        let rev_read_value = m.signal("rev_read_value", rev_layout.width());

        write.define(m, true, |m, arg| {
            m.av_comb(read_value, arg);
            Ok(Value::of(rev_read_value, rev_layout.clone()))
        })?;
        read.define(m, true, |m, arg| {
            m.av_comb(rev_read_value, arg);
            Ok(Value::of(read_value, layout.clone()))
        })?;

        Ok(Connect { read, write })
    }
}

/// A transaction that calls two methods, passing the output of each as
/// the argument of the other.
#[derive(Debug, Clone, Copy)]
pub struct ConnectTrans {
    pub transaction: Transaction,
}

impl ConnectTrans {
    #[track_caller]
    pub fn new(m: &mut TModule, method1: &Method, method2: &Method) -> TransactronResult<Self> {
        let name = format!("connect_{}_{}", method1.name(), method2.name());
        let mut m = m.child(name.as_str());
        let m = &mut m;
        let data1 = m.signal("data1", method1.layout_out().width());
        let data2 = m.signal("data2", method2.layout_out().width());

        let transaction = Transaction::new(m, name)?;
        transaction.body(m, true, |m| {
            let ret1 = method1.call(m, Value::bits(data2.into()))?;
            m.top_comb(data1, ret1);
            let ret2 = method2.call(m, Value::bits(data1.into()))?;
            m.top_comb(data2, ret2);
            Ok(())
        })?;
        Ok(ConnectTrans { transaction })
    }
}

/// Connects each of `sources` to `sink` with a [ConnectTrans]. The
/// transactions conflict on `sink`, so at most one value is passed per
/// cycle.
#[derive(Debug, Clone)]
pub struct ManyToOneConnectTrans {
    pub transactions: Vec<ConnectTrans>,
}

impl ManyToOneConnectTrans {
    #[track_caller]
    pub fn new(m: &mut TModule, sources: &[&Method], sink: &Method) -> TransactronResult<Self> {
        let transactions = sources
            .iter()
            .map(|source| ConnectTrans::new(m, sink, source))
            .collect::<TransactronResult<Vec<_>>>()?;
        Ok(ManyToOneConnectTrans { transactions })
    }
}
