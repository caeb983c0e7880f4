//! Methods: guarded interfaces that transactions and other methods call.
use crate::context::TModule;
use crate::endpoint::{EndpointIdx, MethodFlags};
use crate::transaction::run_body;
use transactron_ir::{Expr, Layout, Signal, Value};
use transactron_utils::{Error, GPosIdx, Id, TransactronResult};

/// One caller's contribution to the input of a nonexclusive method.
#[derive(Debug, Clone)]
pub struct CombineInput {
    pub arg: Value,
    /// High when this caller runs the method in the current cycle.
    pub run: Expr,
}

/// Merges the arguments of every caller that runs a nonexclusive method in
/// the same cycle into a single input.
pub trait Combine {
    fn combine(&self, inputs: &[CombineInput]) -> Expr;
}

impl<F> Combine for F
where
    F: Fn(&[CombineInput]) -> Expr,
{
    fn combine(&self, inputs: &[CombineInput]) -> Expr {
        self(inputs)
    }
}

/// Selects the argument of the running caller. Correct only when at most
/// one caller runs in each cycle.
pub struct OneHotCombiner;

impl Combine for OneHotCombiner {
    fn combine(&self, inputs: &[CombineInput]) -> Expr {
        let width = inputs.first().map_or(0, |i| i.arg.width());
        Expr::one_hot_mux(
            width,
            inputs.iter().map(|i| (i.run.clone(), i.arg.expr().clone())),
        )
    }
}

/// Bitwise OR of the arguments of every running caller.
pub struct OrCombiner;

impl Combine for OrCombiner {
    fn combine(&self, inputs: &[CombineInput]) -> Expr {
        let width = inputs.first().map_or(0, |i| i.arg.width());
        inputs.iter().fold(Expr::constant(0, width), |acc, i| {
            acc | i
                .run
                .clone()
                .mux(i.arg.expr().clone(), Expr::constant(0, width))
        })
    }
}

/// The argument of a method call.
#[derive(Debug, Clone)]
pub enum CallArg {
    Value(Value),
    /// Struct fields by name; every field of the method's input layout must
    /// be given.
    Fields(Vec<(Id, Expr)>),
}

impl CallArg {
    pub fn into_value(self, layout: &Layout) -> TransactronResult<Value> {
        match self {
            CallArg::Value(v) => Ok(v),
            CallArg::Fields(fields) => Value::from_fields(layout, fields),
        }
    }
}

impl From<Value> for CallArg {
    fn from(v: Value) -> Self {
        CallArg::Value(v)
    }
}

impl From<&Value> for CallArg {
    fn from(v: &Value) -> Self {
        CallArg::Value(v.clone())
    }
}

impl From<Expr> for CallArg {
    fn from(e: Expr) -> Self {
        CallArg::Value(Value::bits(e))
    }
}

impl From<Signal> for CallArg {
    fn from(s: Signal) -> Self {
        CallArg::Value(Value::from(s))
    }
}

impl From<()> for CallArg {
    fn from(_: ()) -> Self {
        CallArg::Value(Value::empty())
    }
}

impl<N, E, const K: usize> From<[(N, E); K]> for CallArg
where
    N: Into<Id>,
    E: Into<Expr>,
{
    fn from(fields: [(N, E); K]) -> Self {
        CallArg::Fields(
            fields
                .into_iter()
                .map(|(n, e)| (n.into(), e.into()))
                .collect(),
        )
    }
}

/// Handle to a method.
///
/// A method is defined once with [define](Method::define) and may be called
/// from the bodies of transactions and other methods. It runs in a cycle
/// exactly when one of its callers runs and calls it.
#[derive(Debug, Clone)]
pub struct Method {
    idx: EndpointIdx,
    name: Id,
    pub ready: Signal,
    pub run: Signal,
    data_in: Signal,
    data_out: Signal,
    layout_in: Layout,
    layout_out: Layout,
}

/// Options of a method that is about to be declared.
pub struct MethodBuilder {
    name: Id,
    layout_in: Layout,
    layout_out: Layout,
    flags: MethodFlags,
    combiner: Option<Box<dyn Combine>>,
    validator: Option<crate::endpoint::Validator>,
}

impl MethodBuilder {
    /// Input layout.
    pub fn i<L: Into<Layout>>(mut self, layout: L) -> Self {
        self.layout_in = layout.into();
        self
    }

    /// Output layout.
    pub fn o<L: Into<Layout>>(mut self, layout: L) -> Self {
        self.layout_out = layout.into();
        self
    }

    /// Allow several callers to run the method in the same cycle.
    pub fn nonexclusive(mut self) -> Self {
        self.flags.nonexclusive = true;
        self
    }

    pub fn single_caller(mut self) -> Self {
        self.flags.single_caller = true;
        self
    }

    /// The method is implemented outside of the design.
    pub fn external(mut self) -> Self {
        self.flags.external = true;
        self
    }

    /// How the arguments of concurrent callers of a nonexclusive method are
    /// merged.
    pub fn combiner<C: Combine + 'static>(mut self, combiner: C) -> Self {
        self.combiner = Some(Box::new(combiner));
        self
    }

    /// An extra readiness condition that depends on the caller's argument.
    pub fn validate_arguments<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> Expr + 'static,
    {
        self.validator = Some(Box::new(validator));
        self
    }

    #[track_caller]
    pub fn create(self, m: &mut TModule) -> TransactronResult<Method> {
        let pos = GPosIdx::caller();
        let (registry, ir) = m.parts();
        let idx = registry.register_method(
            ir,
            self.name,
            self.layout_in,
            self.layout_out,
            self.flags,
            pos,
        )?;
        let info = registry.endpoint_mut(idx);
        info.combiner = self.combiner;
        info.validator = self.validator;
        Ok(Method {
            idx,
            name: info.name,
            ready: info.ready,
            run: info.run,
            data_in: info.data_in,
            data_out: info.data_out,
            layout_in: info.layout_in.clone(),
            layout_out: info.layout_out.clone(),
        })
    }
}

impl Method {
    pub fn build<S: Into<Id>>(name: S) -> MethodBuilder {
        MethodBuilder {
            name: name.into(),
            layout_in: Layout::empty(),
            layout_out: Layout::empty(),
            flags: MethodFlags::default(),
            combiner: None,
            validator: None,
        }
    }

    /// An exclusive method with the layouts of `other`.
    #[track_caller]
    pub fn like<S: Into<Id>>(m: &mut TModule, name: S, other: &Method) -> TransactronResult<Self> {
        Method::build(name)
            .i(other.layout_in.clone())
            .o(other.layout_out.clone())
            .create(m)
    }

    pub(crate) fn idx(&self) -> EndpointIdx {
        self.idx
    }

    pub fn name(&self) -> Id {
        self.name
    }

    pub fn layout_in(&self) -> &Layout {
        &self.layout_in
    }

    pub fn layout_out(&self) -> &Layout {
        &self.layout_out
    }

    /// The merged argument, as seen inside the body.
    pub fn data_in(&self) -> Value {
        Value::of(self.data_in, self.layout_in.clone())
    }

    pub fn data_out(&self) -> Value {
        Value::of(self.data_out, self.layout_out.clone())
    }

    /// Define the body of the method. `body` receives the argument and
    /// returns the output; `ready` states when the method may run.
    #[track_caller]
    pub fn define<E, F>(&self, m: &mut TModule, ready: E, body: F) -> TransactronResult<()>
    where
        E: Into<Expr>,
        F: FnOnce(&mut TModule, Value) -> TransactronResult<Value>,
    {
        let pos = GPosIdx::caller();
        if m.registry().endpoint(self.idx).flags.external {
            return Err(Error::misc(format!(
                "external method `{}` cannot be given a body",
                self.name
            ))
            .with_pos(&pos));
        }
        m.av_comb(self.ready, ready);
        let (registry, ir) = m.parts();
        registry.push_body(self.idx, ir.ctrl_path(), ir.predicate())?;
        let arg = self.data_in();
        let ret = run_body(m, self.idx, self.run, |m| body(m, arg))?;
        let matches = ret.layout() == &self.layout_out
            || (matches!(ret.layout(), Layout::Bits(_)) && ret.width() == self.layout_out.width());
        if !matches {
            return Err(Error::layout_mismatch(
                format!("output of `{}`", self.name),
                &self.layout_out,
                ret.layout(),
            )
            .with_pos(&pos));
        }
        m.top_comb(self.data_out, ret.into_expr());
        Ok(())
    }

    /// Call the method from the current body and return its output.
    #[track_caller]
    pub fn call<A: Into<CallArg>>(&self, m: &mut TModule, arg: A) -> TransactronResult<Value> {
        self.call_if(m, true, arg)
    }

    /// Call the method when `enable` holds, in addition to the conditions of
    /// the enclosing control blocks.
    #[track_caller]
    pub fn call_if<E, A>(&self, m: &mut TModule, enable: E, arg: A) -> TransactronResult<Value>
    where
        E: Into<Expr>,
        A: Into<CallArg>,
    {
        let pos = GPosIdx::caller();
        let arg = arg.into().into_value(&self.layout_in).map_err(|e| e.with_pos(&pos))?;
        let (registry, ir) = m.parts();
        registry.record_call(ir, self.idx, arg, enable.into(), pos)
    }

    /// Define this method as forwarding every call to `target`.
    #[track_caller]
    pub fn proxy(&self, m: &mut TModule, target: &Method) -> TransactronResult<()> {
        self.define(m, target.ready, |m, arg| target.call(m, arg))
    }
}
