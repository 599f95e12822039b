//! Worker 执行相关的数据类型
//!
//! WorkerOutcome 是 Worker 返回给引擎的原始结果；WorkerResult 是引擎加上耗时、尝试次数、
//! 时间戳和日志之后的最终记录；ExecutionResults 是一次 execute_workers 调用的汇总。

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::RetryPolicy;
use crate::workers::events::ExecutionObserver;

/// Worker 单次执行的返回值：success + 可选数据 / 错误
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerOutcome {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    /// Worker 自己产生的日志行（按顺序并入最终结果）
    pub logs: Vec<String>,
    /// 截图引用（路径或 URL）
    pub screenshots: Vec<String>,
}

impl WorkerOutcome {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn empty_success() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_log(mut self, line: impl Into<String>) -> Self {
        self.logs.push(line.into());
        self
    }

    pub fn with_screenshot(mut self, reference: impl Into<String>) -> Self {
        self.screenshots.push(reference.into());
        self
    }
}

/// 传给每次尝试的共享环境
///
/// `environment` 承载页面句柄等协作方资源，引擎不关心其类型。每次尝试拿到一个新的子取消令牌，
/// 超时后该令牌被取消；Worker 内部另起的任务需要自行监听它。
#[derive(Clone, Default)]
pub struct WorkerContext {
    pub session_id: String,
    pub user_id: String,
    pub household_id: String,
    pub worker_name: String,
    pub config: Value,
    /// 从 1 开始
    pub attempt: u32,
    pub cancel: CancellationToken,
    pub environment: Option<Arc<dyn Any + Send + Sync>>,
}

impl WorkerContext {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        household_id: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            household_id: household_id.into(),
            ..Self::default()
        }
    }

    pub fn with_environment(mut self, environment: Arc<dyn Any + Send + Sync>) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 按类型取共享环境
    pub fn environment<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.environment.as_ref()?.downcast_ref::<T>()
    }

    pub(crate) fn for_attempt(&self, worker_name: &str, config: &Value, attempt: u32) -> Self {
        Self {
            worker_name: worker_name.to_string(),
            config: config.clone(),
            attempt,
            cancel: self.cancel.child_token(),
            ..self.clone()
        }
    }
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id)
            .field("household_id", &self.household_id)
            .field("worker_name", &self.worker_name)
            .field("attempt", &self.attempt)
            .field("has_environment", &self.environment.is_some())
            .finish()
    }
}

/// Worker 最终状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Success,
    Failed,
    /// 因前面的任务/批次失败且 continue_on_failure = false 而未执行
    Blocked,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Success => "success",
            WorkerState::Failed => "failed",
            WorkerState::Blocked => "blocked",
        }
    }
}

impl FromStr for WorkerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(WorkerState::Success),
            "failed" => Ok(WorkerState::Failed),
            "blocked" => Ok(WorkerState::Blocked),
            other => Err(format!("unknown worker state '{other}'")),
        }
    }
}

/// 一个 Worker 的执行记录，由引擎创建，之后只读
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerResult {
    pub name: String,
    pub success: bool,
    pub state: WorkerState,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub logs: Vec<String>,
    pub screenshots: Vec<String>,
}

impl WorkerResult {
    /// 未执行、被前序失败阻断的结果
    pub fn blocked(name: &str, blocked_by: &str) -> Self {
        let now = Utc::now();
        let message = format!("Blocked by failed worker '{blocked_by}'");
        Self {
            name: name.to_string(),
            success: false,
            state: WorkerState::Blocked,
            data: None,
            error: Some(message.clone()),
            duration_ms: 0,
            attempts: 0,
            started_at: now,
            ended_at: now,
            logs: vec![message],
            screenshots: Vec::new(),
        }
    }
}

/// 调度策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStrategy {
    #[default]
    Sequential,
    Parallel,
    ParallelLimited,
}

impl ExecutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStrategy::Sequential => "sequential",
            ExecutionStrategy::Parallel => "parallel",
            ExecutionStrategy::ParallelLimited => "parallel-limited",
        }
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" => Ok(ExecutionStrategy::Sequential),
            "parallel" => Ok(ExecutionStrategy::Parallel),
            "parallel-limited" | "parallel_limited" => Ok(ExecutionStrategy::ParallelLimited),
            other => Err(format!("unknown execution strategy '{other}'")),
        }
    }
}

/// 执行选项
#[derive(Clone)]
pub struct ExecutionOptions {
    /// parallel-limited 的批大小
    pub max_concurrency: usize,
    pub worker_timeout: Duration,
    pub retry: RetryPolicy,
    pub continue_on_failure: bool,
    pub observers: Vec<Arc<dyn ExecutionObserver>>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 2,
            worker_timeout: Duration::from_millis(300_000),
            retry: RetryPolicy::default(),
            continue_on_failure: true,
            observers: Vec::new(),
        }
    }
}

impl ExecutionOptions {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_continue_on_failure(mut self, continue_on_failure: bool) -> Self {
        self.continue_on_failure = continue_on_failure;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl fmt::Debug for ExecutionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionOptions")
            .field("max_concurrency", &self.max_concurrency)
            .field("worker_timeout", &self.worker_timeout)
            .field("retry", &self.retry)
            .field("continue_on_failure", &self.continue_on_failure)
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// 一次 execute_workers 调用的汇总（返回后不可变）
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResults {
    pub results: HashMap<String, WorkerResult>,
    /// 失败与被阻断都算失败
    pub all_succeeded: bool,
    /// 至少一个成功
    pub partial_success: bool,
    /// 整个调用的墙钟耗时，不是各任务耗时之和
    pub total_duration_ms: u64,
    pub success_count: usize,
    pub failure_count: usize,
    pub failed_workers: Vec<String>,
    pub strategy: ExecutionStrategy,
}

impl ExecutionResults {
    pub(crate) fn aggregate(
        ordered: Vec<WorkerResult>,
        strategy: ExecutionStrategy,
        total_duration: Duration,
    ) -> Self {
        let failed_workers: Vec<String> = ordered
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.name.clone())
            .collect();
        let success_count = ordered.len() - failed_workers.len();
        let failure_count = failed_workers.len();
        Self {
            results: ordered.into_iter().map(|r| (r.name.clone(), r)).collect(),
            all_succeeded: failure_count == 0,
            partial_success: success_count > 0,
            total_duration_ms: total_duration.as_millis() as u64,
            success_count,
            failure_count,
            failed_workers,
            strategy,
        }
    }

    pub fn get(&self, name: &str) -> Option<&WorkerResult> {
        self.results.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parse() {
        assert_eq!(
            "parallel-limited".parse::<ExecutionStrategy>().unwrap(),
            ExecutionStrategy::ParallelLimited
        );
        assert_eq!("Sequential".parse::<ExecutionStrategy>().unwrap(), ExecutionStrategy::Sequential);
        assert!("round-robin".parse::<ExecutionStrategy>().is_err());
        assert_eq!(ExecutionStrategy::ParallelLimited.to_string(), "parallel-limited");
    }

    #[test]
    fn test_default_options() {
        let options = ExecutionOptions::default();
        assert_eq!(options.max_concurrency, 2);
        assert_eq!(options.worker_timeout, Duration::from_millis(300_000));
        assert_eq!(options.retry.max_retries, 2);
        assert!(options.continue_on_failure);
    }

    #[test]
    fn test_blocked_result() {
        let result = WorkerResult::blocked("stock_pruner", "cart_builder");
        assert_eq!(result.state, WorkerState::Blocked);
        assert_eq!(result.attempts, 0);
        assert!(result.error.unwrap().contains("cart_builder"));
    }

    #[test]
    fn test_context_environment_downcast() {
        let ctx = WorkerContext::new("s1", "u1", "h1").with_environment(Arc::new(42_u32));
        assert_eq!(ctx.environment::<u32>(), Some(&42));
        assert!(ctx.environment::<String>().is_none());
    }
}
