//! Worker 执行引擎
//!
//! 每次尝试都与计时器赛跑：超时记为一次失败，取消该次尝试的子令牌并丢弃其 future
//! （future 在下一个 await 点停止；Worker 自己 spawn 的任务需监听令牌）。失败后交给 RetryPolicy
//! 判断是否立即重试。三种调度策略都在调用方的单个任务上协作式交错执行，不额外 spawn。

use std::collections::HashSet;
use std::time::Instant;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::time::timeout;

use crate::workers::{
    ExecutionOptions, ExecutionResults, ExecutionStrategy, WorkerContext, WorkerOutcome,
    WorkerResult, WorkerState, WorkerTask,
};

/// 执行引擎：持有执行选项，按策略运行一组任务并汇总结果
#[derive(Debug, Clone, Default)]
pub struct ExecutionEngine {
    options: ExecutionOptions,
}

impl ExecutionEngine {
    pub fn new(options: ExecutionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// 复制一个只改变 continue_on_failure 的引擎（观察者共享）
    pub fn with_continue_on_failure(&self, continue_on_failure: bool) -> Self {
        Self::new(self.options.clone().with_continue_on_failure(continue_on_failure))
    }

    /// 运行启用的任务；任务顺序应当已按优先级排序（见 WorkerRegistry::get_enabled_workers）。
    /// 同名任务只运行第一个，结果按名字汇总。
    pub async fn execute_workers(
        &self,
        tasks: &[WorkerTask],
        ctx: &WorkerContext,
        strategy: ExecutionStrategy,
    ) -> ExecutionResults {
        let start = Instant::now();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut enabled: Vec<&WorkerTask> = Vec::with_capacity(tasks.len());
        for task in tasks.iter().filter(|t| t.enabled) {
            if seen.insert(task.name.as_str()) {
                enabled.push(task);
            } else {
                tracing::warn!(worker = %task.name, "duplicate worker name, later task skipped");
            }
        }
        let tasks = enabled;
        if tasks.is_empty() {
            return ExecutionResults::aggregate(Vec::new(), strategy, start.elapsed());
        }

        tracing::info!(
            strategy = %strategy,
            workers = tasks.len(),
            continue_on_failure = self.options.continue_on_failure,
            "executing workers"
        );

        let results = match strategy {
            ExecutionStrategy::Sequential => self.run_sequential(&tasks, ctx).await,
            ExecutionStrategy::Parallel => join_all(tasks.iter().map(|t| self.run_task(t, ctx))).await,
            ExecutionStrategy::ParallelLimited => self.run_parallel_limited(&tasks, ctx).await,
        };

        let aggregated = ExecutionResults::aggregate(results, strategy, start.elapsed());
        tracing::info!(
            strategy = %strategy,
            success = aggregated.success_count,
            failed = aggregated.failure_count,
            duration_ms = aggregated.total_duration_ms,
            "workers finished"
        );
        aggregated
    }

    async fn run_sequential(&self, tasks: &[&WorkerTask], ctx: &WorkerContext) -> Vec<WorkerResult> {
        let mut results = Vec::with_capacity(tasks.len());
        let mut blocker: Option<String> = None;
        for task in tasks {
            if let Some(failed) = &blocker {
                results.push(self.block(task, failed));
                continue;
            }
            let result = self.run_task(task, ctx).await;
            if !result.success && !self.options.continue_on_failure {
                blocker = Some(task.name.clone());
            }
            results.push(result);
        }
        results
    }

    /// 固定大小分批：一批全部结束后才放行下一批
    async fn run_parallel_limited(
        &self,
        tasks: &[&WorkerTask],
        ctx: &WorkerContext,
    ) -> Vec<WorkerResult> {
        let batch_size = self.options.max_concurrency.max(1);
        let mut results = Vec::with_capacity(tasks.len());
        let mut blocker: Option<String> = None;
        for batch in tasks.chunks(batch_size) {
            if let Some(failed) = &blocker {
                results.extend(batch.iter().map(|t| self.block(t, failed)));
                continue;
            }
            let settled = join_all(batch.iter().map(|t| self.run_task(t, ctx))).await;
            if !self.options.continue_on_failure {
                blocker = settled.iter().find(|r| !r.success).map(|r| r.name.clone());
            }
            results.extend(settled);
        }
        results
    }

    fn block(&self, task: &WorkerTask, blocked_by: &str) -> WorkerResult {
        tracing::warn!(worker = %task.name, blocked_by = %blocked_by, "worker blocked");
        let result = WorkerResult::blocked(&task.name, blocked_by);
        for observer in &self.options.observers {
            observer.on_worker_complete(&result);
        }
        result
    }

    /// 单个任务：超时 + 重试循环
    async fn run_task(&self, task: &WorkerTask, base: &WorkerContext) -> WorkerResult {
        for observer in &self.options.observers {
            observer.on_worker_start(&task.name);
        }

        let started_at = Utc::now();
        let start = Instant::now();
        let policy = self.options.retry;
        let timeout_ms = self.options.worker_timeout.as_millis() as u64;
        let mut logs = Vec::new();
        let mut screenshots = Vec::new();
        let mut attempt = 0;

        let (state, data, error) = loop {
            attempt += 1;
            let ctx = base.for_attempt(&task.name, &task.config, attempt);
            let attempt_start = Instant::now();

            let outcome = match timeout(self.options.worker_timeout, task.worker.execute(&ctx)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    ctx.cancel.cancel();
                    WorkerOutcome::failure(format!("Timed out after {timeout_ms} ms"))
                }
            };

            let audit = serde_json::json!({
                "event": "worker_audit",
                "worker": task.name,
                "attempt": attempt,
                "ok": outcome.success,
                "duration_ms": attempt_start.elapsed().as_millis() as u64,
                "error": outcome.error,
            });
            tracing::info!(audit = %audit, "worker");

            logs.extend(outcome.logs);
            screenshots.extend(outcome.screenshots);

            if outcome.success {
                logs.push(format!("[{}] succeeded on attempt {attempt}", task.name));
                break (WorkerState::Success, outcome.data, None);
            }

            let error = outcome
                .error
                .unwrap_or_else(|| "Worker reported failure without an error message".to_string());
            if policy.should_retry(&error, attempt) {
                logs.push(format!("[{}] attempt {attempt} failed, retrying: {error}", task.name));
                tracing::warn!(worker = %task.name, attempt, error = %error, "retrying worker");
                for observer in &self.options.observers {
                    observer.on_worker_retry(&task.name, attempt, &error);
                }
                let delay = policy.delay_after(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                continue;
            }

            logs.push(format!("[{}] failed after {attempt} attempt(s): {error}", task.name));
            break (WorkerState::Failed, None, Some(error));
        };

        let result = WorkerResult {
            name: task.name.clone(),
            success: state == WorkerState::Success,
            state,
            data,
            error,
            duration_ms: start.elapsed().as_millis() as u64,
            attempts: attempt,
            started_at,
            ended_at: Utc::now(),
            logs,
            screenshots,
        };
        for observer in &self.options.observers {
            observer.on_worker_complete(&result);
        }
        result
    }
}
