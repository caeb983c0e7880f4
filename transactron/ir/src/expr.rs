use crate::{Signal, SignalIdx};
use itertools::Itertools;
use std::fmt;
use std::mem;
use std::ops::{Add, BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, Not, Sub};
use transactron_utils::math::mask;

/// Bitwise and arithmetic operators. Arithmetic wraps at the operand width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    And,
    Or,
    Xor,
    Add,
    Sub,
}

/// Unsigned comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
}

impl CmpOp {
    /// The comparison that holds exactly when `self` does not.
    pub fn negate(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Neq,
            CmpOp::Neq => CmpOp::Eq,
            CmpOp::Lt => CmpOp::Geq,
            CmpOp::Leq => CmpOp::Gt,
            CmpOp::Gt => CmpOp::Leq,
            CmpOp::Geq => CmpOp::Lt,
        }
    }

    fn apply(self, l: u64, r: u64) -> bool {
        match self {
            CmpOp::Eq => l == r,
            CmpOp::Neq => l != r,
            CmpOp::Lt => l < r,
            CmpOp::Leq => l <= r,
            CmpOp::Gt => l > r,
            CmpOp::Geq => l >= r,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Neq => "!=",
            CmpOp::Lt => "<",
            CmpOp::Leq => "<=",
            CmpOp::Gt => ">",
            CmpOp::Geq => ">=",
        }
    }
}

/// Reductions of a vector to a single bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Any,
    All,
}

/// A combinational expression over signals.
///
/// One-bit expressions double as guards: an assignment fires when its guard
/// is non-zero. The constructors below fold constants so that guards built
/// from `true`/`false` stay small.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Const { value: u64, width: u32 },
    Sig(Signal),
    Slice { expr: Box<Expr>, lo: u32, width: u32 },
    /// Concatenation; the first part occupies the least significant bits.
    Cat(Vec<Expr>),
    Not(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    /// `Mux(cond, on_true, on_false)`
    Mux(Box<Expr>, Box<Expr>, Box<Expr>),
    Reduce(ReduceOp, Box<Expr>),
}

/// Defaults to the always-true guard.
impl Default for Expr {
    fn default() -> Self {
        Expr::one()
    }
}

impl From<Signal> for Expr {
    fn from(sig: Signal) -> Self {
        Expr::Sig(sig)
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::bit(b)
    }
}

impl Expr {
    pub fn constant(value: u64, width: u32) -> Self {
        Expr::Const {
            value: value & mask(width),
            width,
        }
    }

    pub fn bit(b: bool) -> Self {
        Expr::constant(b as u64, 1)
    }

    pub fn one() -> Self {
        Expr::bit(true)
    }

    pub fn zero() -> Self {
        Expr::bit(false)
    }

    /// The zero-width value.
    pub fn empty() -> Self {
        Expr::constant(0, 0)
    }

    pub fn width(&self) -> u32 {
        match self {
            Expr::Const { width, .. } | Expr::Slice { width, .. } => *width,
            Expr::Sig(sig) => sig.width,
            Expr::Cat(parts) => parts.iter().map(|p| p.width()).sum(),
            Expr::Not(e) => e.width(),
            Expr::Bin(_, l, r) => std::cmp::max(l.width(), r.width()),
            Expr::Cmp(..) | Expr::Reduce(..) => 1,
            Expr::Mux(_, t, f) => std::cmp::max(t.width(), f.width()),
        }
    }

    fn as_const(&self) -> Option<u64> {
        match self {
            Expr::Const { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Statically known to be non-zero.
    pub fn is_true(&self) -> bool {
        matches!(self.as_const(), Some(v) if v != 0)
    }

    /// Statically known to be zero.
    pub fn is_false(&self) -> bool {
        self.as_const() == Some(0)
    }

    /// If this is `x == k` for a constant `k`, returns `(x, k)`.
    pub fn as_eq_const(&self) -> Option<(&Expr, u64)> {
        self.as_cmp_const(CmpOp::Eq)
    }

    /// If this is `x != k` for a constant `k`, returns `(x, k)`.
    pub fn as_neq_const(&self) -> Option<(&Expr, u64)> {
        self.as_cmp_const(CmpOp::Neq)
    }

    fn as_cmp_const(&self, want: CmpOp) -> Option<(&Expr, u64)> {
        match self {
            Expr::Cmp(op, l, r) if *op == want => {
                match (l.as_const(), r.as_const()) {
                    (None, Some(k)) => Some((l.as_ref(), k)),
                    (Some(k), None) => Some((r.as_ref(), k)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    ////////////// Constructors ////////////////

    pub fn and<E: Into<Expr>>(self, rhs: E) -> Self {
        let rhs = rhs.into();
        if self.width() == 1 && rhs.width() == 1 {
            if self.is_false() || rhs.is_false() {
                return Expr::zero();
            } else if self.is_true() {
                return rhs;
            } else if rhs.is_true() {
                return self;
            }
        }
        self.bin(BinOp::And, rhs)
    }

    pub fn or<E: Into<Expr>>(self, rhs: E) -> Self {
        let rhs = rhs.into();
        if self.width() == 1 && rhs.width() == 1 {
            if self.is_true() || rhs.is_true() {
                return Expr::one();
            } else if self.is_false() {
                return rhs;
            } else if rhs.is_false() {
                return self;
            }
        }
        self.bin(BinOp::Or, rhs)
    }

    pub fn xor<E: Into<Expr>>(self, rhs: E) -> Self {
        self.bin(BinOp::Xor, rhs.into())
    }

    pub fn add<E: Into<Expr>>(self, rhs: E) -> Self {
        self.bin(BinOp::Add, rhs.into())
    }

    pub fn sub<E: Into<Expr>>(self, rhs: E) -> Self {
        self.bin(BinOp::Sub, rhs.into())
    }

    fn bin(self, op: BinOp, rhs: Expr) -> Self {
        let width = std::cmp::max(self.width(), rhs.width());
        match (self.as_const(), rhs.as_const()) {
            (Some(l), Some(r)) => {
                let value = match op {
                    BinOp::And => l & r,
                    BinOp::Or => l | r,
                    BinOp::Xor => l ^ r,
                    BinOp::Add => l.wrapping_add(r),
                    BinOp::Sub => l.wrapping_sub(r),
                };
                Expr::constant(value, width)
            }
            _ => Expr::Bin(op, Box::new(self), Box::new(rhs)),
        }
    }

    pub fn cmp<E: Into<Expr>>(self, op: CmpOp, rhs: E) -> Self {
        let rhs = rhs.into();
        match (self.as_const(), rhs.as_const()) {
            (Some(l), Some(r)) => Expr::bit(op.apply(l, r)),
            _ => Expr::Cmp(op, Box::new(self), Box::new(rhs)),
        }
    }

    pub fn eq<E: Into<Expr>>(self, rhs: E) -> Self {
        self.cmp(CmpOp::Eq, rhs)
    }

    pub fn neq<E: Into<Expr>>(self, rhs: E) -> Self {
        self.cmp(CmpOp::Neq, rhs)
    }

    pub fn lt<E: Into<Expr>>(self, rhs: E) -> Self {
        self.cmp(CmpOp::Lt, rhs)
    }

    pub fn geq<E: Into<Expr>>(self, rhs: E) -> Self {
        self.cmp(CmpOp::Geq, rhs)
    }

    /// Compare against a constant of the same width as `self`.
    pub fn eq_const(self, value: u64) -> Self {
        let width = self.width();
        self.eq(Expr::constant(value, width))
    }

    pub fn mux<T: Into<Expr>, F: Into<Expr>>(self, on_true: T, on_false: F) -> Self {
        let (on_true, on_false) = (on_true.into(), on_false.into());
        if self.is_true() {
            on_true
        } else if self.is_false() {
            on_false
        } else if on_true == on_false {
            on_true
        } else {
            Expr::Mux(Box::new(self), Box::new(on_true), Box::new(on_false))
        }
    }

    pub fn slice(self, lo: u32, width: u32) -> Self {
        if lo == 0 && width == self.width() {
            return self;
        }
        match self {
            Expr::Const { value, .. } => {
                let shifted = if lo >= 64 { 0 } else { value >> lo };
                Expr::constant(shifted, width)
            }
            Expr::Slice { expr, lo: inner, .. } => Expr::Slice {
                expr,
                lo: inner + lo,
                width,
            },
            expr => Expr::Slice {
                expr: Box::new(expr),
                lo,
                width,
            },
        }
    }

    /// Single bit `idx`.
    pub fn get_bit(self, idx: u32) -> Self {
        self.slice(idx, 1)
    }

    pub fn cat<I: IntoIterator<Item = Expr>>(parts: I) -> Self {
        let parts = parts.into_iter().filter(|p| p.width() > 0).collect_vec();
        match parts.len() {
            0 => Expr::empty(),
            1 => parts.into_iter().next().unwrap_or_else(Expr::empty),
            _ if parts.iter().all(|p| p.as_const().is_some()) => {
                let mut value = 0u64;
                let mut offset = 0u32;
                for part in &parts {
                    if offset < 64 {
                        value |= part.as_const().unwrap_or(0) << offset;
                    }
                    offset += part.width();
                }
                Expr::constant(value, offset)
            }
            _ => Expr::Cat(parts),
        }
    }

    /// Zero-extend or truncate to `width` bits.
    pub fn resize(self, width: u32) -> Self {
        let cur = self.width();
        if cur == width {
            self
        } else if cur > width {
            self.slice(0, width)
        } else {
            Expr::cat([self, Expr::constant(0, width - cur)])
        }
    }

    /// One if any bit is set.
    pub fn any(self) -> Self {
        match self.as_const() {
            Some(v) => Expr::bit(v != 0),
            None if self.width() == 1 => self,
            None => Expr::Reduce(ReduceOp::Any, Box::new(self)),
        }
    }

    /// One if all bits are set.
    pub fn all(self) -> Self {
        let width = self.width();
        match self.as_const() {
            Some(v) => Expr::bit(v == mask(width)),
            None if width == 1 => self,
            None => Expr::Reduce(ReduceOp::All, Box::new(self)),
        }
    }

    /// Disjunction of one-bit expressions; `false` for an empty iterator.
    pub fn or_all<I: IntoIterator<Item = Expr>>(items: I) -> Self {
        items.into_iter().fold(Expr::zero(), |acc, e| acc.or(e))
    }

    /// Conjunction of one-bit expressions; `true` for an empty iterator.
    pub fn and_all<I: IntoIterator<Item = Expr>>(items: I) -> Self {
        items.into_iter().fold(Expr::one(), |acc, e| acc.and(e))
    }

    /// Selects the value whose condition is high, assuming at most one
    /// condition holds. Yields zero when none does.
    pub fn one_hot_mux<I>(width: u32, cases: I) -> Self
    where
        I: IntoIterator<Item = (Expr, Expr)>,
    {
        cases
            .into_iter()
            .fold(Expr::constant(0, width), |acc, (cond, value)| {
                cond.mux(value.resize(width), acc)
            })
    }

    /// Keeps the first of the one-bit conditions that holds and clears the
    /// rest, so at most one result is high.
    pub fn priority<I: IntoIterator<Item = Expr>>(conds: I) -> Vec<Expr> {
        let mut none_before = Expr::one();
        conds
            .into_iter()
            .map(|cond| {
                let hit = none_before.clone() & cond.clone();
                none_before = none_before.clone() & !cond;
                hit
            })
            .collect()
    }

    ////////////// Queries ////////////////

    /// Calls `f` on every signal the expression reads.
    pub fn for_each_signal<F: FnMut(Signal)>(&self, f: &mut F) {
        match self {
            Expr::Const { .. } => {}
            Expr::Sig(sig) => f(*sig),
            Expr::Slice { expr, .. } | Expr::Not(expr) | Expr::Reduce(_, expr) => {
                expr.for_each_signal(f)
            }
            Expr::Cat(parts) => parts.iter().for_each(|p| p.for_each_signal(f)),
            Expr::Bin(_, l, r) | Expr::Cmp(_, l, r) => {
                l.for_each_signal(f);
                r.for_each_signal(f);
            }
            Expr::Mux(c, t, e) => {
                c.for_each_signal(f);
                t.for_each_signal(f);
                e.for_each_signal(f);
            }
        }
    }

    pub fn signals(&self) -> Vec<Signal> {
        let mut sigs = vec![];
        self.for_each_signal(&mut |s| sigs.push(s));
        sigs
    }

    /// Evaluate the expression, reading signal values from `env`. The result
    /// is masked to the expression's width.
    pub fn eval(&self, env: &dyn Fn(SignalIdx) -> u64) -> u64 {
        let width = self.width();
        let value = match self {
            Expr::Const { value, .. } => *value,
            Expr::Sig(sig) => env(sig.idx),
            Expr::Slice { expr, lo, .. } => {
                let v = expr.eval(env);
                if *lo >= 64 { 0 } else { v >> lo }
            }
            Expr::Cat(parts) => {
                let mut value = 0u64;
                let mut offset = 0u32;
                for part in parts {
                    if offset < 64 {
                        value |= part.eval(env) << offset;
                    }
                    offset += part.width();
                }
                value
            }
            Expr::Not(e) => !e.eval(env),
            Expr::Bin(op, l, r) => {
                let (l, r) = (l.eval(env), r.eval(env));
                match op {
                    BinOp::And => l & r,
                    BinOp::Or => l | r,
                    BinOp::Xor => l ^ r,
                    BinOp::Add => l.wrapping_add(r),
                    BinOp::Sub => l.wrapping_sub(r),
                }
            }
            Expr::Cmp(op, l, r) => op.apply(l.eval(env), r.eval(env)) as u64,
            Expr::Mux(c, t, f) => {
                if c.eval(env) != 0 {
                    t.eval(env)
                } else {
                    f.eval(env)
                }
            }
            Expr::Reduce(ReduceOp::Any, e) => (e.eval(env) != 0) as u64,
            Expr::Reduce(ReduceOp::All, e) => {
                (e.eval(env) == mask(e.width())) as u64
            }
        };
        value & mask(width)
    }

    /// Render the expression, naming signals with `name`.
    pub fn render(&self, name: &dyn Fn(Signal) -> String) -> String {
        match self {
            Expr::Const { value, width } => format!("{width}'d{value}"),
            Expr::Sig(sig) => name(*sig),
            Expr::Slice { expr, lo, width } => {
                format!("{}[{}:{}]", expr.render(name), lo + width, lo)
            }
            Expr::Cat(parts) => format!(
                "{{{}}}",
                parts.iter().rev().map(|p| p.render(name)).join(", ")
            ),
            Expr::Not(e) => format!("!{}", e.render(name)),
            Expr::Bin(op, l, r) => {
                let sym = match op {
                    BinOp::And => "&",
                    BinOp::Or => "|",
                    BinOp::Xor => "^",
                    BinOp::Add => "+",
                    BinOp::Sub => "-",
                };
                format!("({} {sym} {})", l.render(name), r.render(name))
            }
            Expr::Cmp(op, l, r) => {
                format!("({} {} {})", l.render(name), op.symbol(), r.render(name))
            }
            Expr::Mux(c, t, f) => format!(
                "({} ? {} : {})",
                c.render(name),
                t.render(name),
                f.render(name)
            ),
            Expr::Reduce(ReduceOp::Any, e) => format!("|{}", e.render(name)),
            Expr::Reduce(ReduceOp::All, e) => format!("&{}", e.render(name)),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(&|s| format!("%{}", s.idx.0)))
    }
}

/////////////// Sugar for convience constructors /////////////

/// Construct a Expr::Not, flipping comparisons instead of wrapping them.
impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Self {
        match self {
            Expr::Const { value, width } => Expr::constant(!value, width),
            Expr::Not(e) => *e,
            Expr::Cmp(op, l, r) => Expr::Cmp(op.negate(), l, r),
            e => Expr::Not(Box::new(e)),
        }
    }
}

impl<T: Into<Expr>> BitAnd<T> for Expr {
    type Output = Expr;

    fn bitand(self, rhs: T) -> Self::Output {
        self.and(rhs)
    }
}

impl<T: Into<Expr>> BitOr<T> for Expr {
    type Output = Expr;

    fn bitor(self, rhs: T) -> Self::Output {
        self.or(rhs)
    }
}

impl<T: Into<Expr>> BitXor<T> for Expr {
    type Output = Expr;

    fn bitxor(self, rhs: T) -> Self::Output {
        self.xor(rhs)
    }
}

impl<T: Into<Expr>> Add<T> for Expr {
    type Output = Expr;

    fn add(self, rhs: T) -> Self::Output {
        Expr::add(self, rhs)
    }
}

impl<T: Into<Expr>> Sub<T> for Expr {
    type Output = Expr;

    fn sub(self, rhs: T) -> Self::Output {
        Expr::sub(self, rhs)
    }
}

/// Update an expression such that it includes an additional disjunction.
impl<T: Into<Expr>> BitOrAssign<T> for Expr {
    fn bitor_assign(&mut self, other: T) {
        self.update(|old| old | other)
    }
}

/// Update an expression such that it includes an additional conjunction.
impl<T: Into<Expr>> BitAndAssign<T> for Expr {
    fn bitand_assign(&mut self, other: T) {
        self.update(|old| old & other)
    }
}

impl Expr {
    /// Mutates an expression in place using `upd`.
    pub fn update<F>(&mut self, upd: F)
    where
        F: FnOnce(Expr) -> Expr,
    {
        let old = mem::take(self);
        let new = upd(old);
        *self = new;
    }
}

macro_rules! signal_ops {
    ($($trait:ident :: $fn:ident),*) => {
        $(
            impl<T: Into<Expr>> $trait<T> for Signal {
                type Output = Expr;

                fn $fn(self, rhs: T) -> Self::Output {
                    $trait::$fn(Expr::from(self), rhs)
                }
            }
        )*
    };
}

signal_ops!(BitAnd::bitand, BitOr::bitor, BitXor::bitxor, Add::add, Sub::sub);

impl Not for Signal {
    type Output = Expr;

    fn not(self) -> Self::Output {
        !Expr::from(self)
    }
}
