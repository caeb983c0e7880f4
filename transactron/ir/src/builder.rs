use crate::{
    Assignment, CtrlPath, CtrlPathBuilder, Design, Domain, EnterType, Expr,
    ModuleIdx, PathPredicate, Signal,
};
use transactron_utils::{Error, GPosIdx, Id, IndexRef, TransactronResult};

/// A condition contributed by an enclosing control block.
#[derive(Debug, Clone)]
struct GuardEntry {
    cond: Expr,
    /// Body guards (`run`/`grant`) guard `comb` but not `av_comb`, and are not
    /// part of path predicates.
    avoided: bool,
    literals: Vec<Expr>,
}

#[derive(Debug, Clone)]
enum Frame {
    If {
        /// Conditions of the chain so far, this branch included.
        conds: Vec<Expr>,
        enter: EnterType,
        is_else: bool,
    },
    Avoided,
    Switch {
        test: Expr,
        covered: Vec<u64>,
    },
    Case,
}

/// Builds the contents of one module of a [Design].
///
/// Assignments go to one of three combinational domains or to the
/// synchronous domain:
/// * `comb` is guarded by every enclosing condition, including the `run`
///   or `grant` guard of the enclosing method or transaction body;
/// * `av_comb` is guarded by control conditions only, skipping body guards;
/// * `top_comb` is unguarded;
/// * `sync` sets the next value of a register, guarded like `comb`.
pub struct ModuleBuilder<'a> {
    design: &'a mut Design,
    module: ModuleIdx,
    path_builder: CtrlPathBuilder,
    guards: Vec<GuardEntry>,
    frames: Vec<Frame>,
    /// The `if` chain that was just left, which `elif`/`else` may continue.
    closed_chain: Option<Vec<Expr>>,
}

impl<'a> ModuleBuilder<'a> {
    pub fn new(design: &'a mut Design, module: ModuleIdx) -> Self {
        ModuleBuilder {
            design,
            module,
            path_builder: CtrlPathBuilder::new(module.index() as u32),
            guards: vec![],
            frames: vec![],
            closed_chain: None,
        }
    }

    /// Builder for a new submodule named `name`. Control blocks of this
    /// module do not extend into the submodule.
    pub fn child<S: Into<Id>>(&mut self, name: S) -> ModuleBuilder<'_> {
        let idx = self.design.add_module(self.module, name);
        ModuleBuilder::new(self.design, idx)
    }

    pub fn design(&self) -> &Design {
        self.design
    }

    pub fn design_mut(&mut self) -> &mut Design {
        self.design
    }

    pub fn module(&self) -> ModuleIdx {
        self.module
    }

    /// Hierarchical name of this module.
    pub fn name(&self) -> String {
        self.design
            .module_path(self.module)
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    /////////////// Signals ///////////////

    /// A combinational wire that is zero when not driven.
    pub fn signal<S: Into<Id>>(&mut self, name: S, width: u32) -> Signal {
        self.design.fresh_signal(self.module, name, width, 0)
    }

    pub fn signal_init<S: Into<Id>>(&mut self, name: S, width: u32, init: u64) -> Signal {
        self.design.fresh_signal(self.module, name, width, init)
    }

    pub fn register<S: Into<Id>>(&mut self, name: S, width: u32, reset: u64) -> Signal {
        self.design.fresh_register(self.module, name, width, reset)
    }

    /////////////// Assignments ///////////////

    #[track_caller]
    pub fn comb<E: Into<Expr>>(&mut self, dst: Signal, src: E) {
        let guard = self.guard();
        self.push(dst, src.into(), guard, Domain::Comb, GPosIdx::caller());
    }

    #[track_caller]
    pub fn av_comb<E: Into<Expr>>(&mut self, dst: Signal, src: E) {
        let guard = self.av_guard();
        self.push(dst, src.into(), guard, Domain::Comb, GPosIdx::caller());
    }

    #[track_caller]
    pub fn top_comb<E: Into<Expr>>(&mut self, dst: Signal, src: E) {
        self.push(dst, src.into(), Expr::one(), Domain::Comb, GPosIdx::caller());
    }

    #[track_caller]
    pub fn sync<E: Into<Expr>>(&mut self, dst: Signal, src: E) {
        let guard = self.guard();
        self.push(dst, src.into(), guard, Domain::Sync, GPosIdx::caller());
    }

    fn push(&mut self, dst: Signal, src: Expr, guard: Expr, domain: Domain, pos: GPosIdx) {
        if guard.is_false() {
            return;
        }
        self.design.assign(Assignment {
            dst,
            src: src.resize(dst.width),
            guard,
            domain,
            pos,
        });
    }

    /// Conjunction of all enclosing conditions.
    pub fn guard(&self) -> Expr {
        Expr::and_all(self.guards.iter().map(|g| g.cond.clone()))
    }

    /// Conjunction of the enclosing control conditions, skipping body guards.
    pub fn av_guard(&self) -> Expr {
        Expr::and_all(
            self.guards
                .iter()
                .filter(|g| !g.avoided)
                .map(|g| g.cond.clone()),
        )
    }

    /////////////// Control blocks ///////////////

    pub fn enter_if<E: Into<Expr>>(&mut self, cond: E) {
        let cond = cond.into();
        self.path_builder.enter(EnterType::Push);
        self.guards.push(GuardEntry {
            cond: cond.clone(),
            avoided: false,
            literals: vec![cond.clone()],
        });
        self.frames.push(Frame::If {
            conds: vec![cond],
            enter: EnterType::Push,
            is_else: false,
        });
        self.closed_chain = None;
    }

    /// Continue the `if` chain that was just left.
    pub fn enter_elif<E: Into<Expr>>(&mut self, cond: E) -> TransactronResult<()> {
        self.continue_chain(Some(cond.into()))
    }

    /// Close the `if` chain that was just left.
    pub fn enter_else(&mut self) -> TransactronResult<()> {
        self.continue_chain(None)
    }

    fn continue_chain(&mut self, cond: Option<Expr>) -> TransactronResult<()> {
        let mut conds = self.closed_chain.take().ok_or_else(|| {
            Error::malformed_control("`elif`/`else` must follow an `if` or `elif`")
        })?;
        if !self.path_builder.enter(EnterType::Add) {
            return Err(Error::malformed_control("no control structure to continue"));
        }
        let mut literals: Vec<Expr> = conds.iter().map(|c| !c.clone()).collect();
        let not_before = Expr::and_all(literals.clone());
        let is_else = cond.is_none();
        let effective = match cond {
            Some(c) => {
                literals.push(c.clone());
                conds.push(c.clone());
                not_before & c
            }
            None => not_before,
        };
        self.guards.push(GuardEntry {
            cond: effective,
            avoided: false,
            literals,
        });
        self.frames.push(Frame::If {
            conds,
            enter: EnterType::Add,
            is_else,
        });
        Ok(())
    }

    /// A condition that guards `comb` and `sync` but not `av_comb`. Used for
    /// method and transaction bodies.
    pub fn enter_avoided_if<E: Into<Expr>>(&mut self, cond: E) {
        self.path_builder.enter(EnterType::Push);
        self.guards.push(GuardEntry {
            cond: cond.into(),
            avoided: true,
            literals: vec![],
        });
        self.frames.push(Frame::Avoided);
        self.closed_chain = None;
    }

    pub fn enter_switch<E: Into<Expr>>(&mut self, test: E) {
        self.path_builder.enter(EnterType::Push);
        self.frames.push(Frame::Switch {
            test: test.into(),
            covered: vec![],
        });
        self.closed_chain = None;
    }

    /// A case matching any of `values`.
    pub fn enter_case(&mut self, values: &[u64]) -> TransactronResult<()> {
        let Some(Frame::Switch { test, covered }) = self.frames.last_mut() else {
            return Err(Error::malformed_control("`case` outside of a `switch`"));
        };
        let test = test.clone();
        covered.extend_from_slice(values);
        let matches = values
            .iter()
            .map(|v| test.clone().eq_const(*v))
            .collect::<Vec<_>>();
        let literals = if matches.len() == 1 { matches.clone() } else { vec![] };
        self.enter_case_with(Expr::or_all(matches), literals);
        Ok(())
    }

    /// The case taken when no previous case matched.
    pub fn enter_default(&mut self) -> TransactronResult<()> {
        let Some(Frame::Switch { test, covered }) = self.frames.last() else {
            return Err(Error::malformed_control("`default` outside of a `switch`"));
        };
        let literals = covered
            .iter()
            .map(|v| !test.clone().eq_const(*v))
            .collect::<Vec<_>>();
        let cond = Expr::and_all(literals.clone());
        self.enter_case_with(cond, literals);
        Ok(())
    }

    fn enter_case_with(&mut self, cond: Expr, literals: Vec<Expr>) {
        self.path_builder.enter(EnterType::Entry);
        self.guards.push(GuardEntry {
            cond,
            avoided: false,
            literals,
        });
        self.frames.push(Frame::Case);
        self.closed_chain = None;
    }

    /// Leave the innermost control block.
    pub fn leave(&mut self) -> TransactronResult<()> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| Error::malformed_control("no control block to leave"))?;
        self.closed_chain = None;
        match frame {
            Frame::If {
                conds,
                enter,
                is_else,
            } => {
                self.guards.pop();
                self.path_builder.leave(enter);
                if !is_else {
                    self.closed_chain = Some(conds);
                }
            }
            Frame::Avoided => {
                self.guards.pop();
                self.path_builder.leave(EnterType::Push);
            }
            Frame::Switch { .. } => self.path_builder.leave(EnterType::Push),
            Frame::Case => {
                self.guards.pop();
                self.path_builder.leave(EnterType::Entry);
            }
        }
        Ok(())
    }

    /// Number of open control blocks.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn ctrl_path(&self) -> CtrlPath {
        self.path_builder.build_ctrl_path()
    }

    /// Literal conditions of the enclosing control blocks.
    pub fn predicate(&self) -> PathPredicate {
        PathPredicate::new(
            self.guards
                .iter()
                .filter(|g| !g.avoided)
                .flat_map(|g| g.literals.iter().cloned())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elif_excludes_previous_branches() {
        let mut design = Design::new("top");
        let top = design.top();
        let mut m = ModuleBuilder::new(&mut design, top);
        let a = m.signal("a", 1);
        let b = m.signal("b", 1);
        let out = m.signal("out", 2);
        m.enter_if(a);
        m.comb(out, Expr::constant(1, 2));
        let first = m.predicate();
        m.leave().unwrap();
        m.enter_elif(b).unwrap();
        m.comb(out, Expr::constant(2, 2));
        let second = m.predicate();
        assert_eq!(m.guard(), !Expr::from(a) & b);
        m.leave().unwrap();
        m.enter_else().unwrap();
        m.comb(out, Expr::constant(3, 2));
        m.leave().unwrap();
        assert!(m.enter_else().is_err());

        assert!(first.exclusive_with(&second));
        assert_eq!(design.assignments().len(), 3);
    }

    #[test]
    fn avoided_guards_skip_av_comb() {
        let mut design = Design::new("top");
        let top = design.top();
        let mut m = ModuleBuilder::new(&mut design, top);
        let run = m.signal("run", 1);
        let c = m.signal("c", 1);
        m.enter_if(c);
        m.enter_avoided_if(run);
        assert_eq!(m.av_guard(), Expr::from(c));
        assert_eq!(m.guard(), c & run);
        assert_eq!(m.predicate().literals(), &[Expr::from(c)]);
        m.leave().unwrap();
        m.leave().unwrap();
        assert!(m.leave().is_err());
    }

    #[test]
    fn switch_cases() {
        let mut design = Design::new("top");
        let top = design.top();
        let mut m = ModuleBuilder::new(&mut design, top);
        let sel = m.signal("sel", 2);
        assert!(m.enter_case(&[0]).is_err());
        m.enter_switch(sel);
        m.enter_case(&[1]).unwrap();
        let p1 = m.predicate();
        let c1 = m.ctrl_path();
        m.leave().unwrap();
        m.enter_default().unwrap();
        let pd = m.predicate();
        let cd = m.ctrl_path();
        m.leave().unwrap();
        m.leave().unwrap();
        assert!(p1.exclusive_with(&pd));
        assert!(c1.exclusive_with(&cd));
    }
}
