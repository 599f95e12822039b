//! CartPilot - 购物车准备的 Worker 编排核心
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、错误分类与重试策略、会话状态机
//! - **observability**: tracing 初始化
//! - **persistence**: 会话序列化、校验、文件存储与过期清理
//! - **session**: 会话模型、Review Pack 组装、协调器（run / resume）
//! - **workers**: Worker 注册表、执行引擎、执行事件、Worker 输出类型
//!
//! 本 crate 只决定 Worker 是否、何时、按什么顺序运行，从不执行任何下单或结账动作。

pub mod config;
pub mod core;
pub mod observability;
pub mod persistence;
pub mod session;
pub mod workers;

pub use crate::config::{load_config, AppConfig};
pub use crate::core::{is_retryable_error, RetryPolicy, SessionError, SessionStatus};
pub use crate::persistence::SessionStore;
pub use crate::session::{Coordinator, CoordinatorSession, LoginProvider, ReviewPack, RunOutcome};
pub use crate::workers::{
    ExecutionEngine, ExecutionOptions, ExecutionStrategy, Worker, WorkerContext, WorkerOutcome,
    WorkerRegistry, WorkerTask,
};
