//! # Transactron
//!
//! This crate plumbs together the Transactron crates and provides a driver
//! that elaborates and simulates demo designs.
//! Designs written with Transactron should depend on the crates this crate
//! re-exports: [`transactron_core`] for transactions, methods and
//! elaboration, [`transactron_lib`] for the standard building blocks and
//! [`transactron_ir`] for the circuit representation and simulator.
pub mod cmdline;
pub mod designs;
pub mod driver;

pub use transactron_core::*;
pub use transactron_lib as lib;

/// Everything needed to write a design.
pub mod prelude {
    pub use transactron_core::hw_log::HardwareLogger;
    pub use transactron_core::{
        Context, Elaboratable, ElaborationConfig, Endpoint, HwCounter, Method, Priority,
        SchedulerKind, TModule, Transaction, body, def_method, elaborate,
    };
    pub use transactron_ir::{Expr, Layout, Signal, Value};
    pub use transactron_lib::{
        Adapter, AdapterTrans, ConditionOptions, Connect, Fifo, Forwarder, Pipe, condition,
    };
    pub use transactron_utils::{Error, TransactronResult};
}
