//! Guarded atomic transactions and their elaboration-time scheduler.
//!
//! A design is described as a set of [Transaction]s that call [Method]s.
//! During elaboration every transaction, method and call is recorded in a
//! [Registry]. [Context::finish] then analyzes which transactions conflict
//! and synthesizes a scheduler that grants, in every cycle, a conflict-free
//! set of requested transactions whose methods are all ready.
mod config;
mod conflicts;
mod context;
mod elaborate;
mod endpoint;
mod generation;
mod macros;
mod method;
mod method_map;
mod registry;
mod schedulers;
mod simultaneous;
mod transaction;

pub mod hw_log;
pub mod metrics;
pub mod profiler;

pub use config::{ElaborationConfig, SchedulerKind, VERBOSE_ENV};
pub use conflicts::ConflictGraph;
pub use context::{Elaboratable, TModule};
pub use elaborate::{Context, Elaborated, MANAGER_MODULE, elaborate};
pub use endpoint::{
    CallRecord, EndpointIdx, EndpointInfo, EndpointKind, MethodFlags, MethodUse, Priority,
    Relation,
};
pub use generation::{
    GENERATION_INFO_VERSION, GenerationInfo, LogRecordInfo, MethodSignalsLocation,
    MetricLocation, SignalPath, TransactionSignalsLocation,
};
pub use hw_log::{HardwareLogger, LogLevel, LogPrinter};
pub use method::{CallArg, Combine, CombineInput, Method, MethodBuilder, OneHotCombiner, OrCombiner};
pub use method_map::{MethodMap, check_call_graph};
pub use metrics::{HistogramRegs, HwCounter, HwExpHistogram, TaggedCounter};
pub use profiler::{Profile, ProfileCollector, ProfileData};
pub use registry::Registry;
pub use schedulers::{ComponentInput, eager, round_robin, schedule};
pub use simultaneous::{MERGE_MODULE, check_components, merge};
pub use transaction::{Endpoint, Transaction};

pub use transactron_ir as ir;
pub use transactron_utils as utils;
