use crate::context::TModule;
use crate::endpoint::{EndpointIdx, Priority};
use crate::method::Method;
use transactron_ir::{Expr, Signal};
use transactron_utils::{Error, GPosIdx, Id, TransactronResult};

/// Anything that takes part in scheduling relations: transactions, methods
/// and raw registry indices.
pub trait Endpoint {
    fn endpoint(&self) -> EndpointIdx;

    /// Record that `self` and `end` never run in the same cycle, typically
    /// because they use a common resource.
    #[track_caller]
    fn add_conflict(
        &self,
        m: &mut TModule,
        end: &dyn Endpoint,
        priority: Priority,
    ) -> TransactronResult<()> {
        let pos = GPosIdx::caller();
        m.registry_mut()
            .declare_conflict(self.endpoint(), end.endpoint(), priority, pos)
    }

    /// Schedule `self` before `end` without adding a conflict, e.g. when
    /// `end` reads a value that `self` forwards in the same cycle.
    #[track_caller]
    fn schedule_before(&self, m: &mut TModule, end: &dyn Endpoint) -> TransactronResult<()> {
        let pos = GPosIdx::caller();
        m.registry_mut()
            .schedule_before(self.endpoint(), end.endpoint(), pos)
    }

    /// `self` runs in exactly the cycles in which `others` run.
    #[track_caller]
    fn simultaneous(&self, m: &mut TModule, others: &[&dyn Endpoint]) -> TransactronResult<()> {
        let pos = GPosIdx::caller();
        let others: Vec<_> = others.iter().map(|e| e.endpoint()).collect();
        m.registry_mut().simultaneous(self.endpoint(), &others, pos)
    }

    /// `self` runs together with one of `others`; the alternatives are
    /// considered separately.
    #[track_caller]
    fn simultaneous_alternatives(
        &self,
        m: &mut TModule,
        others: &[&dyn Endpoint],
    ) -> TransactronResult<()> {
        let pos = GPosIdx::caller();
        let others: Vec<_> = others.iter().map(|e| e.endpoint()).collect();
        m.registry_mut()
            .simultaneous_alternatives(self.endpoint(), &others, pos)
    }
}

impl Endpoint for EndpointIdx {
    fn endpoint(&self) -> EndpointIdx {
        *self
    }
}

/// A root of the call graph. In every cycle a transaction is granted only if
/// it is requested and every method it calls is ready, and the scheduler
/// never grants two conflicting transactions together.
#[derive(Debug, Clone, Copy)]
pub struct Transaction {
    idx: EndpointIdx,
    pub request: Signal,
    pub runnable: Signal,
    pub grant: Signal,
}

impl Transaction {
    #[track_caller]
    pub fn new<S: Into<Id>>(m: &mut TModule, name: S) -> TransactronResult<Self> {
        Self::create(m, name.into(), false, GPosIdx::caller())
    }

    /// A transaction whose body may be opened inside the body of another
    /// transaction or method.
    #[track_caller]
    pub fn inner<S: Into<Id>>(m: &mut TModule, name: S) -> TransactronResult<Self> {
        Self::create(m, name.into(), true, GPosIdx::caller())
    }

    fn create(m: &mut TModule, name: Id, inner: bool, pos: GPosIdx) -> TransactronResult<Self> {
        let (registry, ir) = m.parts();
        let idx = registry.register_transaction(ir, name, pos, inner)?;
        let info = registry.endpoint(idx);
        Ok(Transaction {
            idx,
            request: info.ready,
            runnable: info.runnable,
            grant: info.run,
        })
    }

    /// Define the body of the transaction. Assignments made with `comb` and
    /// `sync` inside `body` take effect only in cycles in which the
    /// transaction is granted.
    #[track_caller]
    pub fn body<E, F>(&self, m: &mut TModule, request: E, body: F) -> TransactronResult<()>
    where
        E: Into<Expr>,
        F: FnOnce(&mut TModule) -> TransactronResult<()>,
    {
        m.av_comb(self.request, request);
        let (registry, ir) = m.parts();
        registry.push_body(self.idx, ir.ctrl_path(), ir.predicate())?;
        run_body(m, self.idx, self.grant, body)
    }

    pub fn name(&self, m: &TModule) -> Id {
        m.registry().name(self.idx)
    }
}

/// Runs `body` guarded by `guard` and closes the body of `idx`, which must
/// already be open.
pub(crate) fn run_body<T, F>(
    m: &mut TModule,
    idx: EndpointIdx,
    guard: Signal,
    body: F,
) -> TransactronResult<T>
where
    F: FnOnce(&mut TModule) -> TransactronResult<T>,
{
    m.builder().enter_avoided_if(guard);
    let depth = m.builder().depth();
    let res = body(m);
    let balanced = if m.builder().depth() == depth {
        Ok(())
    } else {
        Err(Error::malformed_control(format!(
            "control blocks left open in the body of `{}`",
            m.registry().name(idx)
        )))
    };
    let left = m.builder().leave();
    let popped = m.registry_mut().pop_body(idx);
    let ret = res?;
    balanced.and(left).and(popped)?;
    Ok(ret)
}

impl Endpoint for Transaction {
    fn endpoint(&self) -> EndpointIdx {
        self.idx
    }
}

impl Endpoint for Method {
    fn endpoint(&self) -> EndpointIdx {
        self.idx()
    }
}

impl From<&Transaction> for EndpointIdx {
    fn from(t: &Transaction) -> Self {
        t.idx
    }
}

impl From<&Method> for EndpointIdx {
    fn from(m: &Method) -> Self {
        m.idx()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Context;
    use crate::config::ElaborationConfig;
    use transactron_utils::ErrorKind;

    #[test]
    fn bodies_guard_comb_with_grant() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let out = m.signal("out", 1);
        let t = Transaction::new(&mut m, "t").unwrap();
        t.body(&mut m, true, |m| {
            m.comb(out, true);
            Ok(())
        })
        .unwrap();
        let assign = m
            .design()
            .assignments()
            .iter()
            .find(|a| a.dst == out)
            .cloned()
            .unwrap();
        assert_eq!(assign.guard, Expr::from(t.grant));
        assert!(m.registry().endpoint(t.endpoint()).defined);
    }

    #[test]
    fn body_errors_close_the_body() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let t = Transaction::new(&mut m, "t").unwrap();
        let err = t
            .body(&mut m, true, |_| Err(Error::misc("boom")))
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Misc(_)));
        assert_eq!(m.registry().current(), None);
        assert_eq!(m.builder().depth(), 0);
    }
}
