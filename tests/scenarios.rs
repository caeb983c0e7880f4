//! End-to-end behavior of small designs, checked cycle by cycle.
use transactron::designs::{self, SharedCounter};
use transactron::prelude::*;
use transactron::{Elaborated, ir::Simulator};

fn signal(elab: &Elaborated, path: &[&str]) -> Signal {
    elab.design
        .find(path)
        .unwrap_or_else(|| panic!("no signal {}", path.join(".")))
}

/// Grants of `a` and `b` over `cycles` cycles of a shared counter design.
fn counter_grants(priority: bool, cycles: usize) -> (Vec<(u64, u64)>, u64) {
    let elab = elaborate("top", &SharedCounter { priority }, ElaborationConfig::default()).unwrap();
    let a = signal(&elab, &["top", "a_grant"]);
    let b = signal(&elab, &["top", "b_grant"]);
    let count = signal(&elab, &["top", "count"]);
    let mut sim = elab.simulator().unwrap();
    let mut grants = vec![];
    for _ in 0..cycles {
        grants.push((sim.get(a), sim.get(b)));
        sim.step().unwrap();
    }
    (grants, sim.get(count))
}

#[test]
fn conflicting_transactions_alternate() {
    let (grants, count) = counter_grants(false, 10);
    let expected: Vec<_> = (0..10)
        .map(|i| if i % 2 == 0 { (1, 0) } else { (0, 1) })
        .collect();
    assert_eq!(grants, expected);
    assert_eq!(count, 10);
}

#[test]
fn priority_always_picks_the_same_transaction() {
    let (grants, count) = counter_grants(true, 10);
    assert_eq!(grants, vec![(1, 0); 10]);
    assert_eq!(count, 10);
}

#[test]
fn connected_transactions_fire_together() {
    let mut ctx = Context::new("top", ElaborationConfig::default());
    let mut m = ctx.top();
    let conn = Connect::new(&mut m, 8, 0).unwrap();
    let req_p = m.signal("req_p", 1);
    let req_c = m.signal("req_c", 1);
    let seen = m.signal("seen", 8);
    let p = Transaction::new(&mut m, "p").unwrap();
    p.body(&mut m, req_p, |m| {
        conn.write.call(m, Expr::constant(7, 8)).map(|_| ())
    })
    .unwrap();
    let c = Transaction::new(&mut m, "c").unwrap();
    c.body(&mut m, req_c, |m| {
        let value = conn.read.call(m, ())?;
        m.top_comb(seen, value);
        Ok(())
    })
    .unwrap();
    drop(m);
    let elab = ctx.finish().unwrap();
    let mut sim = elab.simulator().unwrap();

    let check = |sim: &mut Simulator, rp: u64, rc: u64| {
        sim.set(req_p, rp).unwrap();
        sim.set(req_c, rc).unwrap();
        (sim.get(p.grant), sim.get(c.grant))
    };
    assert_eq!(check(&mut sim, 1, 1), (1, 1));
    assert_eq!(sim.get(seen), 7);
    assert_eq!(check(&mut sim, 1, 0), (0, 0));
    assert_eq!(check(&mut sim, 0, 1), (0, 0));
    assert_eq!(check(&mut sim, 0, 0), (0, 0));
}

#[test]
fn forwarder_holds_a_value_nobody_read() {
    let mut ctx = Context::new("top", ElaborationConfig::default());
    let mut m = ctx.top();
    let fwd = Forwarder::new(&mut m, 8).unwrap();
    let do_write = m.signal("do_write", 1);
    let do_read = m.signal("do_read", 1);
    let value = m.signal("value", 8);
    let out = m.signal("out", 8);
    let writer = Transaction::new(&mut m, "writer").unwrap();
    writer
        .body(&mut m, do_write, |m| fwd.write.call(m, value).map(|_| ()))
        .unwrap();
    let reader = Transaction::new(&mut m, "reader").unwrap();
    reader
        .body(&mut m, do_read, |m| {
            let v = fwd.read.call(m, ())?;
            m.top_comb(out, v);
            Ok(())
        })
        .unwrap();
    drop(m);
    let elab = ctx.finish().unwrap();
    let mut sim = elab.simulator().unwrap();

    sim.set(do_write, 1).unwrap();
    sim.set(value, 3).unwrap();
    assert_eq!(sim.get(writer.grant), 1);
    assert_eq!(sim.get(reader.grant), 0);
    sim.step().unwrap();

    // The value is held, so another write has to wait.
    sim.set(value, 5).unwrap();
    assert_eq!(sim.get(fwd.write.ready), 0);
    assert_eq!(sim.get(writer.grant), 0);

    sim.set(do_write, 0).unwrap();
    sim.set(do_read, 1).unwrap();
    assert_eq!(sim.get(reader.grant), 1);
    assert_eq!(sim.get(out), 3);
    sim.step().unwrap();

    sim.set(do_read, 0).unwrap();
    sim.set(do_write, 1).unwrap();
    assert_eq!(sim.get(writer.grant), 1);
}

#[test]
fn exclusive_branches_may_call_the_same_method() {
    let mut ctx = Context::new("top", ElaborationConfig::default());
    let mut m = ctx.top();
    let count = m.register("count", 4, 0);
    let cond = m.register("cond", 1, 0);
    m.sync(cond, !cond);
    let meth = Method::build("m").i(1).create(&mut m).unwrap();
    def_method!(&mut m, meth, |m, _arg| {
        m.sync(count, Expr::from(count) + Expr::constant(1, 4));
        Ok(Value::empty())
    })
    .unwrap();
    let t = Transaction::new(&mut m, "t").unwrap();
    body!(&mut m, t, |m| {
        m.if_(cond, |m| meth.call(m, Expr::constant(1, 1)).map(|_| ()))?;
        m.else_(|m| meth.call(m, Expr::constant(0, 1)).map(|_| ()))
    })
    .unwrap();
    drop(m);
    let elab = ctx.finish().unwrap();
    let mut sim = elab.simulator().unwrap();
    for _ in 0..6 {
        assert_eq!(sim.get(t.grant), 1);
        sim.step().unwrap();
    }
    assert_eq!(sim.get(count), 6);
}

#[test]
fn a_method_that_is_never_ready_blocks_only_its_callers() {
    let mut ctx = Context::new("top", ElaborationConfig::default());
    let mut m = ctx.top();
    let never = Method::build("never").create(&mut m).unwrap();
    never.define(&mut m, false, |_, _| Ok(Value::empty())).unwrap();
    let always = Method::build("always").create(&mut m).unwrap();
    always.define(&mut m, true, |_, _| Ok(Value::empty())).unwrap();
    let blocked = Transaction::new(&mut m, "blocked").unwrap();
    body!(&mut m, blocked, |m| never.call(m, ()).map(|_| ())).unwrap();
    let free = Transaction::new(&mut m, "free").unwrap();
    body!(&mut m, free, |m| always.call(m, ()).map(|_| ())).unwrap();
    drop(m);
    let elab = ctx.finish().unwrap();
    let mut sim = elab.simulator().unwrap();
    for _ in 0..5 {
        assert_eq!(sim.get(blocked.runnable), 0);
        assert_eq!(sim.get(blocked.grant), 0);
        assert_eq!(sim.get(free.grant), 1);
        sim.step().unwrap();
    }
}

#[test]
fn every_demo_design_elaborates_and_runs() {
    for name in designs::NAMES {
        let design = designs::by_name(name).unwrap();
        let elab = transactron::driver::elaborate_design(
            name,
            design.as_ref(),
            ElaborationConfig::default().metrics(true),
        )
        .unwrap();
        let run = transactron::driver::simulate(&elab, 16, transactron::LogLevel::Error, "")
            .unwrap();
        assert_eq!(run.profile.cycles.len(), 16, "{name}");
    }
}

#[test]
fn pipeline_consumes_every_other_cycle() {
    let design = designs::by_name("pipeline").unwrap();
    let elab = transactron::driver::elaborate_design(
        "pipeline",
        design.as_ref(),
        ElaborationConfig::default().metrics(true),
    )
    .unwrap();
    let run = transactron::driver::simulate(&elab, 20, transactron::LogLevel::Error, "").unwrap();
    assert_eq!(run.metrics.get("pipeline.consumed.count"), Some(&10));
}
