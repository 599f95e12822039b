//! 核心错误类型
//!
//! 注册表、状态机、会话运行与持久化各自一个错误枚举；Worker 自身的失败不走这里，
//! 而是以消息字符串形式交给分类器（见 classifier）。

use thiserror::Error;

use crate::core::SessionStatus;

/// Worker 注册表错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Worker already registered: {0}")]
    DuplicateWorker(String),

    #[error("Worker not found: {0}")]
    WorkerNotFound(String),
}

/// 非法的会话状态迁移（状态只能前进或跳到 cancelled）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid session transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: SessionStatus,
    pub to: SessionStatus,
}

/// 一次购物会话运行失败的原因（run / resume 的类型化错误）
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Mandatory worker not registered or disabled: {0}")]
    MandatoryWorkerMissing(String),

    #[error("Mandatory worker '{worker}' failed: {message}")]
    MandatoryWorkerFailed { worker: String, message: String },

    #[error("Review pack assembly failed: {0}")]
    ReviewAssembly(String),

    #[error("Run cancelled before {0}")]
    Cancelled(SessionStatus),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl SessionError {
    /// 记录到会话错误列表时使用的错误码
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::AuthenticationFailed(_) => "AUTH_FAILED",
            SessionError::MandatoryWorkerMissing(_) => "MANDATORY_WORKER_MISSING",
            SessionError::MandatoryWorkerFailed { .. } => "MANDATORY_WORKER_FAILED",
            SessionError::ReviewAssembly(_) => "REVIEW_ASSEMBLY_FAILED",
            SessionError::Cancelled(_) => "RUN_CANCELLED",
            SessionError::Transition(_) => "INVALID_TRANSITION",
            SessionError::Persistence(_) => "PERSISTENCE_FAILED",
        }
    }
}

/// 会话持久化错误
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Session I/O error ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt session file {id}: {source}")]
    Corrupt {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Session {id} failed validation: {}", issues.join("; "))]
    Invalid { id: String, issues: Vec<String> },

    #[error("Failed to encode session {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Session {id} cannot be resumed (status {status})")]
    NotResumable { id: String, status: SessionStatus },
}

impl PersistenceError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
