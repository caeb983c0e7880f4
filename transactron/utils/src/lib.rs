//! Shared utilities for the Transactron crates.
mod errors;
mod id;
mod idx;
mod namegenerator;
mod position;
mod weight_graph;

pub mod math;

pub use errors::{Error, ErrorKind, MultiError, TransactronResult};
pub use id::{GSym, GetName, Id};
pub use idx::{IndexRef, IndexedMap};
pub use math::{bits_for, ceil_log2};
pub use namegenerator::NameGenerator;
pub use position::{GPosIdx, GlobalPositionTable, PosIdx, PositionTable, WithPos};
pub use weight_graph::{BoolIdx, Idx, WeightGraph};
