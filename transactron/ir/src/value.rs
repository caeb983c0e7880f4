use crate::{Expr, Layout, Signal};
use itertools::Itertools;
use transactron_utils::{Error, Id, TransactronResult};

/// An expression interpreted through a [Layout].
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    expr: Expr,
    layout: Layout,
}

impl Value {
    /// Wrap `expr` with `layout`, resizing the expression to the layout width.
    pub fn new(expr: Expr, layout: Layout) -> Self {
        let expr = expr.resize(layout.width());
        Value { expr, layout }
    }

    /// The empty value, passed to and returned from methods without data.
    pub fn empty() -> Self {
        Value {
            expr: Expr::empty(),
            layout: Layout::empty(),
        }
    }

    /// A value whose layout is plain bits of the expression's width.
    pub fn bits(expr: Expr) -> Self {
        let layout = Layout::Bits(expr.width());
        Value { expr, layout }
    }

    pub fn of(sig: Signal, layout: Layout) -> Self {
        Value::new(sig.into(), layout)
    }

    /// Build a struct value from named fields. Every field of `layout` must be
    /// given exactly once.
    pub fn from_fields<I, N>(layout: &Layout, fields: I) -> TransactronResult<Self>
    where
        I: IntoIterator<Item = (N, Expr)>,
        N: Into<Id>,
    {
        let mut given = fields
            .into_iter()
            .map(|(n, e)| (n.into(), e))
            .collect_vec();
        let mut parts = Vec::with_capacity(layout.fields().len());
        for field in layout.fields() {
            let Some(pos) = given.iter().position(|(n, _)| *n == field.name)
            else {
                return Err(Error::layout_mismatch(
                    format!("missing field `{}`", field.name),
                    layout,
                    given.iter().map(|(n, _)| n).join(", "),
                ));
            };
            let (_, expr) = given.swap_remove(pos);
            parts.push(expr.resize(field.layout.width()));
        }
        if let Some((extra, _)) = given.first() {
            return Err(Error::undefined_field(*extra, layout));
        }
        Ok(Value {
            expr: Expr::cat(parts),
            layout: layout.clone(),
        })
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn into_expr(self) -> Expr {
        self.expr
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn width(&self) -> u32 {
        self.layout.width()
    }

    /// Projection onto the field `name` of a struct value.
    pub fn field<N: Into<Id>>(&self, name: N) -> TransactronResult<Value> {
        let name = name.into();
        let (offset, layout) = self
            .layout
            .field(name)
            .ok_or_else(|| Error::undefined_field(name, &self.layout))?;
        Ok(Value::new(
            self.expr.clone().slice(offset, layout.width()),
            layout.clone(),
        ))
    }

    /// Shorthand for the expression of field `name`.
    pub fn get<N: Into<Id>>(&self, name: N) -> TransactronResult<Expr> {
        self.field(name).map(Value::into_expr)
    }

    /// Element `idx` of an array value.
    pub fn index(&self, idx: u32) -> TransactronResult<Value> {
        let (offset, layout) = self.layout.element(idx).ok_or_else(|| {
            Error::misc(format!("index {idx} out of range for {}", self.layout))
        })?;
        Ok(Value::new(
            self.expr.clone().slice(offset, layout.width()),
            layout.clone(),
        ))
    }
}

impl From<Expr> for Value {
    fn from(expr: Expr) -> Self {
        Value::bits(expr)
    }
}

impl From<Signal> for Value {
    fn from(sig: Signal) -> Self {
        Value::bits(sig.into())
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        value.expr
    }
}

impl From<&Value> for Expr {
    fn from(value: &Value) -> Self {
        value.expr.clone()
    }
}
