//! Errors generated during elaboration.
use crate::{GPosIdx, Id, WithPos};
use itertools::Itertools;

/// Convinience wrapper to represent success or meaningul elaboration error.
pub type TransactronResult<T> = std::result::Result<T, Error>;

/// Errors generated while building and elaborating a design.
#[derive(Clone)]
pub struct Error {
    kind: Box<ErrorKind>,
    pos: GPosIdx,
    annotations: Vec<(GPosIdx, String)>,
    post_msg: Option<String>,
}

/// Standard error type for elaboration errors.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ErrorKind {
    /// A method transitively calls itself.
    #[error("Cycle in the call graph: {}", .0.iter().join(" -> "))]
    CycleInCallGraph(Vec<Id>),
    /// A call site names a transaction as its callee.
    #[error("Transaction `{0}` cannot be called")]
    CallToTransaction(Id),
    /// A method was declared but never given a body.
    #[error("Method `{0}` is not defined")]
    UndefinedMethod(Id),
    /// A transaction was declared but never given a body.
    #[error("Transaction `{0}` has no body")]
    UndefinedTransaction(Id),
    /// A body was opened twice for the same endpoint.
    #[error("`{0}` already defined")]
    DoubleDefinition(Id),
    /// Layouts of a value and its destination differ.
    #[error("Layout mismatch in {context}: expected {expected}, found {found}")]
    LayoutMismatch {
        context: String,
        expected: String,
        found: String,
    },
    /// A single-caller method is used by more than one caller.
    #[error("Single-caller method `{0}` is called by {1} callers")]
    ExclusiveMethodOverused(Id, usize),
    /// Priorities form a cycle.
    #[error("Priority cycle: {}", .0.iter().join(" -> "))]
    PriorityCycle(Vec<Id>),
    /// Two endpoints must run together but are also declared independent.
    #[error("Unsatisfiable simultaneity constraints for `{0}` and `{1}`")]
    UnsatisfiableSimultaneity(Id, Id),
    /// Simultaneous endpoints are scheduled by different conflict components.
    #[error("Simultaneous `{0}` and `{1}` belong to different conflict components")]
    SimultaneityAcrossComponents(Id, Id),
    /// A nonexclusive method with inputs has several callers.
    #[error("Nonexclusive method `{0}` has {1} callers but no combiner")]
    MissingCombiner(Id, usize),
    /// A method was called outside of any body.
    #[error("No current body")]
    NoCurrentBody,
    /// Bodies were nested in an unsupported way.
    #[error("Nesting violation: {0}")]
    NestingViolation(String),
    /// A method was called twice from the same caller.
    #[error("Method `{method}` can't be called twice from the same caller `{caller}`")]
    RepeatedCall { method: Id, caller: Id },
    /// Registration was attempted after the registry was finalized.
    #[error("Cannot register {0} after finalization")]
    Finalized(String),
    /// A `condition` block was malformed.
    #[error("Malformed condition: {0}")]
    MalformedCondition(String),
    /// A control block was entered or left out of order.
    #[error("Malformed control: {0}")]
    MalformedControl(String),
    /// The value does not exist in the layout.
    #[error("Undefined field `{0}` in {1}")]
    UndefinedField(Id, String),
    /// Miscellaneous error message
    #[error("{0}")]
    Misc(String),
}

impl Error {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
            pos: GPosIdx::UNKNOWN,
            annotations: vec![],
            post_msg: None,
        }
    }

    pub fn with_pos<T: WithPos>(mut self, pos: &T) -> Self {
        self.pos = pos.copy_span();
        self
    }

    /// Attach a note that points at another position involved in the error.
    pub fn with_annotation<T: WithPos, S: ToString>(
        mut self,
        pos: &T,
        msg: S,
    ) -> Self {
        self.annotations.push((pos.copy_span(), msg.to_string()));
        self
    }

    pub fn with_post_msg(mut self, msg: Option<String>) -> Self {
        self.post_msg = msg;
        self
    }

    pub fn cycle_in_call_graph(cycle: Vec<Id>) -> Self {
        Self::new(ErrorKind::CycleInCallGraph(cycle))
    }
    pub fn call_to_transaction(name: Id) -> Self {
        Self::new(ErrorKind::CallToTransaction(name))
    }
    pub fn undefined_method(name: Id) -> Self {
        Self::new(ErrorKind::UndefinedMethod(name))
    }
    pub fn undefined_transaction(name: Id) -> Self {
        Self::new(ErrorKind::UndefinedTransaction(name))
    }
    pub fn double_definition(name: Id) -> Self {
        Self::new(ErrorKind::DoubleDefinition(name))
    }
    pub fn layout_mismatch<C, E, F>(context: C, expected: E, found: F) -> Self
    where
        C: ToString,
        E: ToString,
        F: ToString,
    {
        Self::new(ErrorKind::LayoutMismatch {
            context: context.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        })
    }
    pub fn exclusive_method_overused(name: Id, callers: usize) -> Self {
        Self::new(ErrorKind::ExclusiveMethodOverused(name, callers))
    }
    pub fn priority_cycle(cycle: Vec<Id>) -> Self {
        Self::new(ErrorKind::PriorityCycle(cycle))
    }
    pub fn unsatisfiable_simultaneity(a: Id, b: Id) -> Self {
        Self::new(ErrorKind::UnsatisfiableSimultaneity(a, b))
    }
    pub fn simultaneity_across_components(a: Id, b: Id) -> Self {
        Self::new(ErrorKind::SimultaneityAcrossComponents(a, b))
    }
    pub fn missing_combiner(name: Id, callers: usize) -> Self {
        Self::new(ErrorKind::MissingCombiner(name, callers))
    }
    pub fn no_current_body() -> Self {
        Self::new(ErrorKind::NoCurrentBody)
    }
    pub fn nesting_violation<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::NestingViolation(msg.to_string()))
    }
    pub fn repeated_call(method: Id, caller: Id) -> Self {
        Self::new(ErrorKind::RepeatedCall { method, caller })
    }
    pub fn finalized<S: ToString>(what: S) -> Self {
        Self::new(ErrorKind::Finalized(what.to_string()))
    }
    pub fn malformed_condition<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::MalformedCondition(msg.to_string()))
    }
    pub fn malformed_control<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::MalformedControl(msg.to_string()))
    }
    pub fn undefined_field<S: ToString>(name: Id, layout: S) -> Self {
        Self::new(ErrorKind::UndefinedField(name, layout.to_string()))
    }
    pub fn misc<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::Misc(msg.to_string()))
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    /// Primary position of the error.
    pub fn pos(&self) -> GPosIdx {
        self.pos
    }

    pub fn annotations(&self) -> &[(GPosIdx, String)] {
        &self.annotations
    }

    pub fn location(&self) -> (&str, u32) {
        let (file, line, _) = self.pos.get_location();
        (file, line)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.pos == GPosIdx::UNKNOWN {
            write!(f, "{}", self.kind)?
        } else {
            write!(f, "{}", self.pos.format(self.kind.to_string()))?
        }
        for (pos, note) in &self.annotations {
            write!(f, "\n  note: {}", pos.format(note))?;
        }
        if let Some(post) = &self.post_msg {
            write!(f, "\n{post}")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for Error {}

/// A collection of errors reported together, e.g. every undefined method of a
/// design.
#[derive(Clone, Default)]
pub struct MultiError {
    errors: Vec<Error>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: Error) {
        self.errors.push(err)
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// The first reported error.
    pub fn first(&self) -> Option<&Error> {
        self.errors.first()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &ErrorKind> {
        self.errors.iter().map(|e| e.kind())
    }

    /// `Ok(())` if no error was collected.
    pub fn into_result(self) -> Result<(), MultiError> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl From<Error> for MultiError {
    fn from(err: Error) -> Self {
        Self { errors: vec![err] }
    }
}

impl std::fmt::Debug for MultiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.errors.iter().map(|e| format!("{e:?}")).join("\n"))
    }
}

impl std::fmt::Display for MultiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for MultiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_positions_and_notes() {
        let pos = GPosIdx::caller();
        let other = GPosIdx::caller();
        let err = Error::call_to_transaction(Id::new("t"))
            .with_pos(&pos)
            .with_annotation(&other, "declared here");
        let rendered = format!("{err:?}");
        assert!(rendered.contains("Transaction `t` cannot be called"));
        assert!(rendered.contains("note:"));
        assert!(matches!(err.kind(), ErrorKind::CallToTransaction(_)));
    }

    #[test]
    fn multi_error_collects() {
        let mut errs = MultiError::new();
        assert!(errs.clone().into_result().is_ok());
        errs.push(Error::undefined_method(Id::new("a")));
        errs.push(Error::undefined_method(Id::new("b")));
        assert_eq!(errs.errors().len(), 2);
        assert!(errs.into_result().is_err());
    }
}
