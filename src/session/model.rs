//! 会话数据模型
//!
//! CoordinatorSession 由一次运行独占并原地修改；状态到达 completed / cancelled 后不再变化。
//! CoordinatorError 只追加。

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::core::{SessionStatus, TransitionError};
use crate::session::ReviewPack;
use crate::workers::{WorkerKind, WorkerResult};

/// 错误严重级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    /// 终止本次运行，且会话不可恢复
    Fatal,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "info",
            ErrorSeverity::Warning => "warning",
            ErrorSeverity::Error => "error",
            ErrorSeverity::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(ErrorSeverity::Info),
            "warning" => Ok(ErrorSeverity::Warning),
            "error" => Ok(ErrorSeverity::Error),
            "fatal" => Ok(ErrorSeverity::Fatal),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// 会话中记录的一条错误
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorError {
    pub code: String,
    pub message: String,
    pub severity: ErrorSeverity,
    /// 产生错误的组件（worker 名、"login"、"coordinator"）
    pub source: String,
    pub recovery_attempted: bool,
    pub recovery_successful: Option<bool>,
    pub timestamp: DateTime<Utc>,
    pub context: HashMap<String, Value>,
}

impl CoordinatorError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        severity: ErrorSeverity,
        source: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            severity,
            source: source.into(),
            recovery_attempted: false,
            recovery_successful: None,
            timestamp: Utc::now(),
            context: HashMap::new(),
        }
    }

    pub fn with_recovery(mut self, successful: bool) -> Self {
        self.recovery_attempted = true;
        self.recovery_successful = Some(successful);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// 每种已知 Worker 一个槽位，保存其最近一次结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerSlots {
    pub cart_builder: Option<WorkerResult>,
    pub substitution: Option<WorkerResult>,
    pub stock_pruner: Option<WorkerResult>,
    pub slot_scout: Option<WorkerResult>,
}

impl WorkerSlots {
    pub fn get(&self, kind: WorkerKind) -> Option<&WorkerResult> {
        match kind {
            WorkerKind::CartBuilder => self.cart_builder.as_ref(),
            WorkerKind::Substitution => self.substitution.as_ref(),
            WorkerKind::StockPruner => self.stock_pruner.as_ref(),
            WorkerKind::SlotScout => self.slot_scout.as_ref(),
        }
    }

    pub fn set(&mut self, kind: WorkerKind, result: WorkerResult) {
        let slot = match kind {
            WorkerKind::CartBuilder => &mut self.cart_builder,
            WorkerKind::Substitution => &mut self.substitution,
            WorkerKind::StockPruner => &mut self.stock_pruner,
            WorkerKind::SlotScout => &mut self.slot_scout,
        };
        *slot = Some(result);
    }

    /// 该槽位已有成功结果（恢复时据此跳过）
    pub fn succeeded(&self, kind: WorkerKind) -> bool {
        self.get(kind).is_some_and(|r| r.success)
    }
}

/// 一次购物运行的完整状态
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSession {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub user_id: String,
    pub household_id: String,
    pub status: SessionStatus,
    pub workers: WorkerSlots,
    pub review_pack: Option<ReviewPack>,
    pub errors: Vec<CoordinatorError>,
    pub screenshots: Vec<String>,
}

impl CoordinatorSession {
    pub fn new(user_id: impl Into<String>, household_id: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            start_time: Utc::now(),
            end_time: None,
            user_id: user_id.into(),
            household_id: household_id.into(),
            status: SessionStatus::Initializing,
            workers: WorkerSlots::default(),
            review_pack: None,
            errors: Vec::new(),
            screenshots: Vec::new(),
        }
    }

    pub fn with_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// 推进状态；只允许沿状态链前进一步或跳到 cancelled
    pub fn transition(&mut self, to: SessionStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        tracing::debug!(session_id = %self.session_id, from = %self.status, to = %to, "session transition");
        self.status = to;
        if to.is_terminal() || to == SessionStatus::ReviewReady {
            self.end_time = Some(Utc::now());
        }
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.transition(SessionStatus::Cancelled)
    }

    /// 人工审核通过后由外部调用
    pub fn complete(&mut self) -> Result<(), TransitionError> {
        self.transition(SessionStatus::Completed)
    }

    pub fn record_error(&mut self, error: CoordinatorError) {
        tracing::warn!(
            session_id = %self.session_id,
            code = %error.code,
            severity = %error.severity,
            source = %error.source,
            "{}",
            error.message
        );
        self.errors.push(error);
    }

    pub fn add_screenshot(&mut self, reference: impl Into<String>) {
        self.screenshots.push(reference.into());
    }

    pub fn has_fatal_error(&self) -> bool {
        self.errors.iter().any(|e| e.severity == ErrorSeverity::Fatal)
    }

    pub fn warnings(&self) -> Vec<CoordinatorError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ErrorSeverity::Warning)
            .cloned()
            .collect()
    }
}
