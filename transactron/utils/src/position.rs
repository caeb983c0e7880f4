//! Definitions for tracking the source positions of declarations.
//!
//! Transactions, methods and call sites record where in the Rust source they
//! were declared. Positions are captured with `#[track_caller]` and stored in
//! a process-wide append-only table so that they can be referred to with a
//! small copyable handle.

use std::panic::Location;
use std::sync::LazyLock;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
/// Handle to a position in a [PositionTable]
pub struct PosIdx(u32);

struct PosData {
    /// Path of the source file
    file: &'static str,
    line: u32,
    column: u32,
}

/// Source position information of a design.
pub struct PositionTable {
    /// Mapping from indexes to position data
    indices: boxcar::Vec<PosData>,
}

impl Default for PositionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionTable {
    /// The unknown position
    pub const UNKNOWN: PosIdx = PosIdx(0);

    /// Create a new position table where the first position is unknown
    pub fn new() -> Self {
        let table = PositionTable {
            indices: boxcar::Vec::new(),
        };
        table.indices.push(PosData {
            file: "<unknown>",
            line: 0,
            column: 0,
        });
        table
    }

    /// Add a new position to the table
    pub fn add_pos(&self, file: &'static str, line: u32, column: u32) -> PosIdx {
        let idx = self.indices.push(PosData { file, line, column });
        PosIdx(idx as u32)
    }

    fn get_pos(&self, pos: PosIdx) -> &PosData {
        &self.indices[pos.0 as usize]
    }
}

static GPOS_TABLE: LazyLock<PositionTable> = LazyLock::new(PositionTable::new);

/// The global position table
pub struct GlobalPositionTable;

impl GlobalPositionTable {
    /// Return reference to a global [PositionTable]
    pub fn get() -> &'static PositionTable {
        &GPOS_TABLE
    }
}

/// A position index backed by a global [PositionTable]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub struct GPosIdx(pub PosIdx);

impl Default for GPosIdx {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl GPosIdx {
    /// Symbol for the unknown position
    pub const UNKNOWN: GPosIdx = GPosIdx(PositionTable::UNKNOWN);

    /// Position of the caller of the enclosing `#[track_caller]` function.
    #[track_caller]
    pub fn caller() -> Self {
        Self::from_location(Location::caller())
    }

    pub fn from_location(loc: &'static Location<'static>) -> Self {
        GPosIdx(GlobalPositionTable::get().add_pos(
            loc.file(),
            loc.line(),
            loc.column(),
        ))
    }

    /// Convert the position into an optional.
    /// Returns `None` if the position is the unknown position.
    pub fn into_option(self) -> Option<Self> {
        if self == Self::UNKNOWN {
            None
        } else {
            Some(self)
        }
    }

    /// The file, line and column of this position
    pub fn get_location(&self) -> (&'static str, u32, u32) {
        let pos = GlobalPositionTable::get().get_pos(self.0);
        (pos.file, pos.line, pos.column)
    }

    pub fn file(&self) -> &'static str {
        self.get_location().0
    }

    pub fn line(&self) -> u32 {
        self.get_location().1
    }

    /// Format this position with the error message `err_msg`
    pub fn format<S: AsRef<str>>(&self, err_msg: S) -> String {
        let (file, line, column) = self.get_location();
        format!("{file}:{line}:{column}: {}", err_msg.as_ref())
    }
}

impl std::fmt::Display for GPosIdx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (file, line, _) = self.get_location();
        write!(f, "{file}:{line}")
    }
}

/// An IR node that may contain position information.
pub trait WithPos {
    /// Copy the span associated with this node.
    fn copy_span(&self) -> GPosIdx;
}

impl WithPos for GPosIdx {
    fn copy_span(&self) -> GPosIdx {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_position_is_recorded() {
        let pos = GPosIdx::caller();
        assert!(pos.into_option().is_some());
        assert!(pos.file().ends_with("position.rs"));
        assert!(pos.format("oops").ends_with(": oops"));
        assert_eq!(GPosIdx::UNKNOWN.line(), 0);
    }
}
