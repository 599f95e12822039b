//! 核心层：错误类型、错误分类与重试策略、会话状态机

pub mod classifier;
pub mod error;
pub mod state;

pub use classifier::{classify, is_retryable_error, ErrorClass, RetryPolicy};
pub use error::{PersistenceError, RegistryError, SessionError, TransitionError};
pub use state::SessionStatus;
