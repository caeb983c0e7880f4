//! Reusable building blocks written with transactions and methods: queues,
//! connectors, storage, method transformers, conditional branches and
//! adapters.
pub mod adapters;
pub mod condition;
pub mod connectors;
mod fifo;
pub mod metrics;
pub mod reqres;
pub mod storage;
pub mod transformers;

pub use adapters::{Adapter, AdapterTrans};
pub use condition::{Branches, ConditionOptions, condition};
pub use connectors::{Connect, ConnectTrans, Forwarder, ManyToOneConnectTrans, Pipe};
pub use fifo::{Fifo, Semaphore};
pub use metrics::LatencyMeasurer;
pub use reqres::{ArgumentsToResultsZipper, Serializer};
pub use storage::{AsyncMemoryBank, ContentAddressableMemory, MemoryBank};
pub use transformers::{
    CatTrans, Collector, ConnectAndMapTrans, MethodFilter, MethodMapper, MethodProduct,
    MethodTryProduct,
};
