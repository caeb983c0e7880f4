//! Mutually exclusive branches inside a body.
//!
//! A plain `if` inside a body cannot call the same method on two branches,
//! and the body needs every method it calls to be ready, whichever branch is
//! taken. [condition] instead turns each branch into an inner transaction
//! that runs together with the enclosing body, so each branch only needs the
//! methods it calls itself.
use transactron_core::{Endpoint, EndpointIdx, TModule, Transaction};
use transactron_ir::{Expr, Signal};
use transactron_utils::{Error, GPosIdx, Id, TransactronResult};

#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionOptions {
    /// Let the enclosing body run when no branch is selected.
    pub nonblocking: bool,
    /// When several branches are selected, the earliest one wins.
    pub priority: bool,
}

impl ConditionOptions {
    pub fn nonblocking(mut self) -> Self {
        self.nonblocking = true;
        self
    }

    pub fn priority(mut self) -> Self {
        self.priority = true;
        self
    }
}

/// The branches of a [condition], added in order.
pub struct Branches {
    name: Id,
    priority: bool,
    requests: Vec<Signal>,
    transactions: Vec<Transaction>,
    catch_all: bool,
}

impl Branches {
    /// A branch selected when `cond` holds.
    #[track_caller]
    pub fn branch<E, F>(&mut self, m: &mut TModule, cond: E, body: F) -> TransactronResult<()>
    where
        E: Into<Expr>,
        F: FnOnce(&mut TModule) -> TransactronResult<()>,
    {
        self.add(m, Some(cond.into()), body)
    }

    /// A branch selected when no earlier branch is. It must be the last one.
    #[track_caller]
    pub fn otherwise<F>(&mut self, m: &mut TModule, body: F) -> TransactronResult<()>
    where
        F: FnOnce(&mut TModule) -> TransactronResult<()>,
    {
        self.add(m, None, body)
    }

    #[track_caller]
    fn add<F>(&mut self, m: &mut TModule, cond: Option<Expr>, body: F) -> TransactronResult<()>
    where
        F: FnOnce(&mut TModule) -> TransactronResult<()>,
    {
        let pos = GPosIdx::caller();
        if self.catch_all {
            return Err(Error::malformed_condition(format!(
                "branch of a condition in `{}` follows its catch-all branch",
                self.name
            ))
            .with_pos(&pos));
        }
        let i = self.transactions.len();
        let name = format!("{}_cond{i}", self.name);
        let request = m.signal(format!("{name}_request"), 1);
        match cond {
            Some(cond) => m.top_comb(request, cond),
            None => {
                let taken = Expr::or_all(self.requests.iter().map(|r| Expr::from(*r)));
                m.top_comb(request, !taken);
                self.catch_all = true;
            }
        }
        self.requests.push(request);

        let transaction = Transaction::inner(m, name)?;
        if self.priority {
            if let Some(prev) = self.transactions.last() {
                prev.schedule_before(m, &transaction)?;
            }
        }
        transaction.body(m, request, body)?;
        self.transactions.push(transaction);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// Splits the current body into branches, added by `body`. In every cycle
/// in which the enclosing body runs, at most one branch runs.
///
/// Unless `opts.nonblocking` is set, the enclosing body does not run in
/// cycles in which no branch can.
#[track_caller]
pub fn condition<F>(m: &mut TModule, opts: ConditionOptions, body: F) -> TransactronResult<()>
where
    F: FnOnce(&mut TModule, &mut Branches) -> TransactronResult<()>,
{
    let pos = GPosIdx::caller();
    let this: EndpointIdx = m
        .registry()
        .current()
        .ok_or_else(|| Error::no_current_body().with_pos(&pos))?;
    let name = m.registry().name(this);
    let mut branches = Branches {
        name,
        priority: opts.priority,
        requests: vec![],
        transactions: vec![],
        catch_all: false,
    };
    body(m, &mut branches)?;
    if opts.nonblocking && !branches.catch_all {
        branches.add(m, None, |_| Ok(()))?;
    }
    if branches.is_empty() {
        return Err(
            Error::malformed_condition(format!("condition in `{name}` has no branches"))
                .with_pos(&pos),
        );
    }
    log::debug!("condition in `{name}' with {} branches", branches.len());
    let others: Vec<&dyn Endpoint> = branches
        .transactions
        .iter()
        .map(|t| t as &dyn Endpoint)
        .collect();
    this.simultaneous_alternatives(m, &others)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Adapter;
    use transactron_core::{Context, Elaborated, ElaborationConfig, Method};
    use transactron_utils::ErrorKind;

    struct Setup {
        en: Signal,
        sel: Signal,
        sel_b: Signal,
        ran: Signal,
        a: Adapter,
        b: Adapter,
        elab: Elaborated,
    }

    /// A transaction that calls `a` when `sel` is set and `b` when `sel_b`
    /// is. With `overlap` the second branch is always selected and calls
    /// both methods.
    fn setup(opts: ConditionOptions, overlap: bool) -> Setup {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let a = Adapter::new(&mut m, Method::build("a").o(4)).unwrap();
        let b = Adapter::new(&mut m, Method::build("b").o(4)).unwrap();
        let en = m.signal("en", 1);
        let sel = m.signal("sel", 1);
        let sel_b = m.signal("sel_b", 1);
        let ran = m.signal("ran", 1);
        let t = Transaction::new(&mut m, "t").unwrap();
        t.body(&mut m, en, |m| {
            m.comb(ran, true);
            condition(m, opts, |m, c| {
                c.branch(m, sel, |m| a.iface.call(m, ()).map(|_| ()))?;
                let other = if overlap { Expr::one() } else { sel_b.into() };
                c.branch(m, other, |m| {
                    b.iface.call(m, ())?;
                    if overlap {
                        a.iface.call(m, ())?;
                    }
                    Ok(())
                })
            })
        })
        .unwrap();
        drop(m);
        let elab = ctx.finish().unwrap();
        Setup {
            en,
            sel,
            sel_b,
            ran,
            a,
            b,
            elab,
        }
    }

    #[test]
    fn branches_need_only_their_own_methods() {
        let s = setup(ConditionOptions::default(), false);
        let mut sim = s.elab.simulator().unwrap();
        sim.set(s.en, 1).unwrap();
        sim.set(s.sel, 1).unwrap();
        sim.set(s.b.en, 1).unwrap();
        assert_eq!(sim.get(s.ran), 0);

        sim.set(s.a.en, 1).unwrap();
        assert_eq!(sim.get(s.ran), 1);
        assert_eq!(sim.get(s.a.done), 1);
        assert_eq!(sim.get(s.b.done), 0);

        sim.set(s.sel, 0).unwrap();
        sim.set(s.sel_b, 1).unwrap();
        sim.set(s.a.en, 0).unwrap();
        assert_eq!(sim.get(s.ran), 1);
        assert_eq!(sim.get(s.b.done), 1);
        assert_eq!(sim.get(s.a.done), 0);

        sim.set(s.en, 0).unwrap();
        assert_eq!(sim.get(s.b.done), 0);
    }

    #[test]
    fn nonblocking_conditions_let_the_body_run() {
        let s = setup(ConditionOptions::default().nonblocking(), false);
        let mut sim = s.elab.simulator().unwrap();
        sim.set(s.en, 1).unwrap();
        assert_eq!(sim.get(s.ran), 1);
        assert_eq!(sim.get(s.a.done), 0);
        assert_eq!(sim.get(s.b.done), 0);

        // A selected branch that cannot run still blocks the body.
        sim.set(s.sel, 1).unwrap();
        assert_eq!(sim.get(s.ran), 0);
        sim.set(s.a.en, 1).unwrap();
        assert_eq!(sim.get(s.ran), 1);
        assert_eq!(sim.get(s.a.done), 1);
    }

    #[test]
    fn priority_picks_the_first_branch() {
        let s = setup(ConditionOptions::default().priority(), true);
        let mut sim = s.elab.simulator().unwrap();
        sim.set(s.en, 1).unwrap();
        sim.set(s.sel, 1).unwrap();
        sim.set(s.a.en, 1).unwrap();
        sim.set(s.b.en, 1).unwrap();
        for _ in 0..3 {
            assert_eq!(sim.get(s.ran), 1);
            assert_eq!(sim.get(s.b.done), 0);
            sim.step().unwrap();
        }
        sim.set(s.sel, 0).unwrap();
        assert_eq!(sim.get(s.b.done), 1);
        assert_eq!(sim.get(s.a.done), 1);
    }

    #[test]
    fn malformed_conditions_are_rejected() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let err = condition(&mut m, ConditionOptions::default(), |_, _| Ok(())).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::NoCurrentBody));

        let t = Transaction::new(&mut m, "empty").unwrap();
        let err = t
            .body(&mut m, true, |m| {
                condition(m, ConditionOptions::default(), |_, _| Ok(()))
            })
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MalformedCondition(_)));

        let t = Transaction::new(&mut m, "late").unwrap();
        let err = t
            .body(&mut m, true, |m| {
                condition(m, ConditionOptions::default(), |m, c| {
                    c.otherwise(m, |_| Ok(()))?;
                    c.branch(m, true, |_| Ok(()))
                })
            })
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MalformedCondition(_)));
    }
}
