//! Elaboration errors reported for malformed designs.
use transactron::prelude::*;
use transactron::utils::{ErrorKind, MultiError};

fn finish(build: impl FnOnce(&mut TModule) -> TransactronResult<()>) -> Result<(), MultiError> {
    let mut ctx = Context::new("top", ElaborationConfig::default());
    build(&mut ctx.top())?;
    ctx.finish().map(|_| ())
}

fn first_kind(res: Result<(), MultiError>) -> ErrorKind {
    res.err()
        .and_then(|errs| errs.first().map(|e| e.kind().clone()))
        .expect("elaboration should fail")
}

#[test]
fn mutually_recursive_methods_form_a_call_cycle() {
    let res = finish(|m| {
        let ping = Method::build("ping").create(m)?;
        let pong = Method::build("pong").create(m)?;
        def_method!(m, ping, |m, _| pong.call(m, ()))?;
        def_method!(m, pong, |m, _| ping.call(m, ()))?;
        let t = Transaction::new(m, "t")?;
        body!(m, t, |m| ping.call(m, ()).map(|_| ()))
    });
    let kind = first_kind(res);
    let ErrorKind::CycleInCallGraph(cycle) = &kind else {
        panic!("unexpected error: {kind}");
    };
    assert!(cycle.iter().any(|id| id.to_string() == "ping"));
    assert!(cycle.iter().any(|id| id.to_string() == "pong"));
}

#[test]
fn cyclic_priorities_are_rejected() {
    let res = finish(|m| {
        let shared = Method::build("shared").create(m)?;
        def_method!(m, shared, |_, _| Ok(Value::empty()))?;
        let ts = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let t = Transaction::new(m, name)?;
                body!(m, t, |m| shared.call(m, ()).map(|_| ()))?;
                Ok(t)
            })
            .collect::<TransactronResult<Vec<_>>>()?;
        ts[0].schedule_before(m, &ts[1])?;
        ts[1].schedule_before(m, &ts[2])?;
        ts[2].schedule_before(m, &ts[0])
    });
    assert!(matches!(first_kind(res), ErrorKind::PriorityCycle(_)));
}

#[test]
fn methods_are_called_inside_bodies_only() {
    let res = finish(|m| {
        let meth = Method::build("meth").create(m)?;
        def_method!(m, meth, |_, _| Ok(Value::empty()))?;
        meth.call(m, ()).map(|_| ())
    });
    assert!(matches!(first_kind(res), ErrorKind::NoCurrentBody));
}

#[test]
fn argument_layouts_are_checked() {
    let res = finish(|m| {
        let meth = Method::build("meth").i(4).create(m)?;
        def_method!(m, meth, |_, _| Ok(Value::empty()))?;
        let t = Transaction::new(m, "t")?;
        body!(m, t, |m| meth.call(m, Expr::constant(1, 3)).map(|_| ()))
    });
    assert!(matches!(first_kind(res), ErrorKind::LayoutMismatch { .. }));
}

#[test]
fn errors_point_at_the_offending_call() {
    let res = finish(|m| {
        let meth = Method::build("meth").create(m)?;
        def_method!(m, meth, |_, _| Ok(Value::empty()))?;
        meth.call(m, ()).map(|_| ())
    });
    let errs = res.unwrap_err();
    let (file, line) = errs.first().unwrap().location();
    assert!(file.ends_with("errors.rs"), "{file}");
    assert!(line > 0);
}

#[test]
fn all_undefined_endpoints_are_reported_together() {
    let res = finish(|m| {
        Method::build("one").create(m)?;
        Method::build("two").create(m)?;
        Transaction::new(m, "three")?;
        Ok(())
    });
    let errs = res.unwrap_err();
    assert_eq!(errs.errors().len(), 3);
    assert!(errs.to_string().contains("`two`"));
}
