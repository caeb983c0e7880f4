//! Control paths and path predicates.
//!
//! Every call site remembers where in the control tree of its module it was
//! made. Two sites whose control paths diverge on different alternatives of
//! the same `if`/`switch` can never be active in the same cycle. Independently
//! of the tree shape, the literal conditions that guard each site are kept as
//! a [PathPredicate] so that contradictory conditions in unrelated blocks are
//! also recognised.

use crate::Expr;
use smallvec::SmallVec;

/// An edge in the control tree of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PathEdge {
    /// Which alternative (branch of an `if` chain, case of a `switch`).
    pub alt: u32,
    /// Which of the sibling control structures at the same level.
    pub par: u32,
}

/// A path in the control tree of one module, starting from the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CtrlPath {
    pub module: u32,
    pub path: SmallVec<[PathEdge; 4]>,
}

impl CtrlPath {
    /// Paths are exclusive if they belong to the same module and diverge on
    /// different alternatives of the same control structure.
    pub fn exclusive_with(&self, other: &CtrlPath) -> bool {
        let mut common = 0;
        for (a, b) in self.path.iter().zip(other.path.iter()) {
            if a == b {
                common += 1;
            } else if a.par != b.par {
                return false;
            } else {
                break;
            }
        }
        self.module == other.module
            && common != self.path.len()
            && common != other.path.len()
    }
}

/// How entering a control block changes the control path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterType {
    /// `if`, `switch` and body scopes start a new structure.
    Push,
    /// `elif` and `else` continue the structure that was just left.
    Add,
    /// `case` and `default` select the next alternative of the enclosing
    /// `switch`.
    Entry,
}

/// Tracks the control path while control blocks are entered and left.
#[derive(Debug, Clone)]
pub struct CtrlPathBuilder {
    module: u32,
    ctrl_path: SmallVec<[PathEdge; 4]>,
    previous: Option<PathEdge>,
}

impl CtrlPathBuilder {
    pub fn new(module: u32) -> Self {
        Self {
            module,
            ctrl_path: SmallVec::new(),
            previous: None,
        }
    }

    /// Returns `false` if the control path cannot be extended this way,
    /// e.g. an `else` that follows nothing.
    pub fn enter(&mut self, enter_type: EnterType) -> bool {
        match enter_type {
            EnterType::Add => {
                let Some(prev) = self.previous else {
                    return false;
                };
                self.ctrl_path.push(PathEdge {
                    alt: prev.alt + 1,
                    ..prev
                });
            }
            EnterType::Entry => {
                let Some(last) = self.ctrl_path.last_mut() else {
                    return false;
                };
                last.alt += 1;
            }
            EnterType::Push => {
                let edge = match self.previous {
                    Some(prev) => PathEdge {
                        alt: 0,
                        par: prev.par + 1,
                    },
                    None => PathEdge::default(),
                };
                self.ctrl_path.push(edge);
            }
        }
        self.previous = None;
        true
    }

    pub fn leave(&mut self, enter_type: EnterType) {
        if matches!(enter_type, EnterType::Push | EnterType::Add) {
            self.previous = self.ctrl_path.pop();
        }
    }

    /// The current control path.
    pub fn build_ctrl_path(&self) -> CtrlPath {
        CtrlPath {
            module: self.module,
            path: self.ctrl_path.clone(),
        }
    }
}

/// Conjunction of literal conditions under which a call site is reachable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathPredicate {
    literals: Vec<Expr>,
}

impl PathPredicate {
    pub fn new(literals: Vec<Expr>) -> Self {
        Self { literals }
    }

    pub fn literals(&self) -> &[Expr] {
        &self.literals
    }

    /// Sound but incomplete disjointness check: true only if some pair of
    /// literals can never hold together.
    pub fn exclusive_with(&self, other: &PathPredicate) -> bool {
        if self
            .literals
            .iter()
            .chain(other.literals.iter())
            .any(|l| l.is_false())
        {
            return true;
        }
        self.literals
            .iter()
            .any(|a| other.literals.iter().any(|b| contradicts(a, b)))
    }
}

fn contradicts(a: &Expr, b: &Expr) -> bool {
    if !a.clone() == *b {
        return true;
    }
    match (a.as_eq_const(), b.as_eq_const()) {
        (Some((x, k1)), Some((y, k2))) if x == y && k1 != k2 => return true,
        _ => (),
    }
    // `x == k` against `x != k`, in either order, is caught by the negation
    // check above.
    false
}
