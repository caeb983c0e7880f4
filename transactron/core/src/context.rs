//! The builder context threaded through elaboration.
use crate::config::ElaborationConfig;
use crate::registry::Registry;
use transactron_ir::{CtrlPath, Design, Expr, ModuleBuilder, ModuleIdx, PathPredicate, Signal};
use transactron_utils::{Id, TransactronResult};

/// Something that can be elaborated into a module of a design.
pub trait Elaboratable {
    fn elaborate(&self, m: &mut TModule) -> TransactronResult<()>;
}

/// A module under construction together with the registry of the design.
///
/// Control blocks take closures that receive the same module:
/// ```ignore
/// m.if_(cond, |m| {
///     m.comb(out, 1);
///     Ok(())
/// })?;
/// m.else_(|m| {
///     m.comb(out, 2);
///     Ok(())
/// })?;
/// ```
pub struct TModule<'a> {
    registry: &'a mut Registry,
    ir: ModuleBuilder<'a>,
}

impl<'a> TModule<'a> {
    pub fn new(registry: &'a mut Registry, ir: ModuleBuilder<'a>) -> Self {
        TModule { registry, ir }
    }

    pub fn registry(&self) -> &Registry {
        &*self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut *self.registry
    }

    pub fn builder(&mut self) -> &mut ModuleBuilder<'a> {
        &mut self.ir
    }

    /// Registry and builder at once, for operations that need both.
    pub fn parts(&mut self) -> (&mut Registry, &mut ModuleBuilder<'a>) {
        (&mut *self.registry, &mut self.ir)
    }

    pub fn design(&self) -> &Design {
        self.ir.design()
    }

    pub fn module(&self) -> ModuleIdx {
        self.ir.module()
    }

    pub fn config(&self) -> &ElaborationConfig {
        self.registry.config()
    }

    pub fn ctrl_path(&self) -> CtrlPath {
        self.ir.ctrl_path()
    }

    pub fn predicate(&self) -> PathPredicate {
        self.ir.predicate()
    }

    /// A new submodule named `name`.
    pub fn child<S: Into<Id>>(&mut self, name: S) -> TModule<'_> {
        TModule {
            registry: &mut *self.registry,
            ir: self.ir.child(name),
        }
    }

    /// Elaborate `elab` in a new submodule named `name`.
    pub fn submodule<S, E>(&mut self, name: S, elab: &E) -> TransactronResult<()>
    where
        S: Into<Id>,
        E: Elaboratable + ?Sized,
    {
        let name = name.into();
        log::debug!("elaborating submodule `{name}' of `{}'", self.ir.name());
        let mut child = self.child(name);
        elab.elaborate(&mut child)
    }

    /////////////// Signals ///////////////

    pub fn signal<S: Into<Id>>(&mut self, name: S, width: u32) -> Signal {
        self.ir.signal(name, width)
    }

    pub fn signal_init<S: Into<Id>>(&mut self, name: S, width: u32, init: u64) -> Signal {
        self.ir.signal_init(name, width, init)
    }

    pub fn register<S: Into<Id>>(&mut self, name: S, width: u32, reset: u64) -> Signal {
        self.ir.register(name, width, reset)
    }

    /////////////// Assignments ///////////////

    #[track_caller]
    pub fn comb<E: Into<Expr>>(&mut self, dst: Signal, src: E) {
        self.ir.comb(dst, src)
    }

    #[track_caller]
    pub fn av_comb<E: Into<Expr>>(&mut self, dst: Signal, src: E) {
        self.ir.av_comb(dst, src)
    }

    #[track_caller]
    pub fn top_comb<E: Into<Expr>>(&mut self, dst: Signal, src: E) {
        self.ir.top_comb(dst, src)
    }

    #[track_caller]
    pub fn sync<E: Into<Expr>>(&mut self, dst: Signal, src: E) {
        self.ir.sync(dst, src)
    }

    /////////////// Control blocks ///////////////

    /// Runs `body` and leaves the block opened before it, also when `body`
    /// fails.
    fn scoped<F>(&mut self, body: F) -> TransactronResult<()>
    where
        F: FnOnce(&mut Self) -> TransactronResult<()>,
    {
        let res = body(self);
        let left = self.ir.leave();
        res.and(left)
    }

    pub fn if_<E, F>(&mut self, cond: E, body: F) -> TransactronResult<()>
    where
        E: Into<Expr>,
        F: FnOnce(&mut Self) -> TransactronResult<()>,
    {
        self.ir.enter_if(cond);
        self.scoped(body)
    }

    /// Must directly follow an `if_` or `elif`.
    pub fn elif<E, F>(&mut self, cond: E, body: F) -> TransactronResult<()>
    where
        E: Into<Expr>,
        F: FnOnce(&mut Self) -> TransactronResult<()>,
    {
        self.ir.enter_elif(cond)?;
        self.scoped(body)
    }

    /// Must directly follow an `if_` or `elif`.
    pub fn else_<F>(&mut self, body: F) -> TransactronResult<()>
    where
        F: FnOnce(&mut Self) -> TransactronResult<()>,
    {
        self.ir.enter_else()?;
        self.scoped(body)
    }

    /// A `switch` on `test`; `body` adds the cases with
    /// [case](TModule::case) and [default](TModule::default).
    pub fn switch<E, F>(&mut self, test: E, body: F) -> TransactronResult<()>
    where
        E: Into<Expr>,
        F: FnOnce(&mut Self) -> TransactronResult<()>,
    {
        self.ir.enter_switch(test);
        self.scoped(body)
    }

    pub fn case<F>(&mut self, values: &[u64], body: F) -> TransactronResult<()>
    where
        F: FnOnce(&mut Self) -> TransactronResult<()>,
    {
        self.ir.enter_case(values)?;
        self.scoped(body)
    }

    pub fn default<F>(&mut self, body: F) -> TransactronResult<()>
    where
        F: FnOnce(&mut Self) -> TransactronResult<()>,
    {
        self.ir.enter_default()?;
        self.scoped(body)
    }
}
