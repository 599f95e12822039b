//! Worker 层：任务注册表、执行引擎、执行事件与各 Worker 的结构化输出

pub mod events;
pub mod executor;
pub mod registry;
pub mod reports;
pub mod types;

pub use events::{BroadcastObserver, ExecutionEvent, ExecutionObserver};
pub use executor::ExecutionEngine;
pub use registry::{Worker, WorkerRegistry, WorkerTask};
pub use reports::WorkerKind;
pub use types::{
    ExecutionOptions, ExecutionResults, ExecutionStrategy, WorkerContext, WorkerOutcome,
    WorkerResult, WorkerState,
};
