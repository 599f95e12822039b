//! 会话协调器：驱动一次购物运行从登录到 Review Pack
//!
//! 状态链 initializing → authenticating → loading_cart → generating_review → review_ready。
//! 登录失败与必选 Worker（cart_builder）失败都是 fatal：记录错误、会话进入 cancelled。
//! 可选 Worker 的失败只记一条 warning，运行继续。`run()` 返回自己持有的会话，协调器本身不保存任何会话状态。

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{SessionError, SessionStatus};
use crate::persistence::{get_resume_point, SessionStore};
use crate::session::{assemble_review_pack, CoordinatorError, CoordinatorSession, ErrorSeverity, ReviewPack};
use crate::workers::{
    ExecutionEngine, ExecutionStrategy, WorkerContext, WorkerKind, WorkerRegistry, WorkerResult,
    WorkerTask,
};

const LOGIN_SOURCE: &str = "login";
const COORDINATOR_SOURCE: &str = "coordinator";

/// 登录协作方；重试策略（如有）由实现自己负责，协调器只调用一次
#[async_trait]
pub trait LoginProvider: Send + Sync {
    async fn login(&self, ctx: &WorkerContext) -> anyhow::Result<()>;
}

/// 一次 run / resume 的最终结果
#[derive(Debug)]
pub struct RunOutcome {
    pub success: bool,
    pub session: CoordinatorSession,
    pub review_pack: Option<ReviewPack>,
    /// 失败时的类型化原因
    pub error: Option<SessionError>,
    pub warnings: Vec<CoordinatorError>,
    /// 按时间排序的可读日志
    pub logs: Vec<String>,
}

pub struct Coordinator {
    registry: WorkerRegistry,
    login: Arc<dyn LoginProvider>,
    engine: ExecutionEngine,
    optional_strategy: ExecutionStrategy,
    store: Option<SessionStore>,
    checkpoint: bool,
    environment: Option<Arc<dyn Any + Send + Sync>>,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(registry: WorkerRegistry, login: Arc<dyn LoginProvider>) -> Self {
        Self {
            registry,
            login,
            engine: ExecutionEngine::default(),
            optional_strategy: ExecutionStrategy::Sequential,
            store: None,
            checkpoint: true,
            environment: None,
            cancel: CancellationToken::new(),
        }
    }

    /// 按配置构造：引擎选项、可选 Worker 策略、会话目录与是否落盘
    pub fn from_config(registry: WorkerRegistry, login: Arc<dyn LoginProvider>, config: &AppConfig) -> Self {
        let mut coordinator = Self::new(registry, login)
            .with_engine(ExecutionEngine::new(config.engine.execution_options()))
            .with_optional_strategy(config.session.optional_strategy)
            .with_store(SessionStore::from_config(&config.persistence));
        coordinator.checkpoint = config.session.checkpoint;
        coordinator
    }

    pub fn with_engine(mut self, engine: ExecutionEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_optional_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.optional_strategy = strategy;
        self
    }

    pub fn with_store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: bool) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    /// 传给每个 Worker 与登录方的共享环境（页面句柄等）
    pub fn with_environment(mut self, environment: Arc<dyn Any + Send + Sync>) -> Self {
        self.environment = Some(environment);
        self
    }

    /// 外部取消：令牌触发后，当前尝试的子令牌一并取消，下一次状态推进前运行终止
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn store(&self) -> Option<&SessionStore> {
        self.store.as_ref()
    }

    /// 新建会话并完整运行一次
    pub async fn run(&self, user_id: &str, household_id: &str) -> RunOutcome {
        let session = CoordinatorSession::new(user_id, household_id);
        tracing::info!(session_id = %session.session_id, household_id, "starting session");
        let logs = vec![log_line(format!(
            "Session {} started for household {household_id}",
            session.session_id
        ))];
        self.drive(session, logs).await
    }

    /// 从已持久化的会话继续；不可恢复的会话返回错误且不做任何修改
    pub async fn resume(&self, session: CoordinatorSession) -> Result<RunOutcome, SessionError> {
        let point = get_resume_point(&session)?;
        tracing::info!(session_id = %session.session_id, resume_point = %point, "resuming session");
        let logs = vec![log_line(format!(
            "Session {} resumed at {point}",
            session.session_id
        ))];
        Ok(self.drive(session, logs).await)
    }

    async fn drive(&self, mut session: CoordinatorSession, mut logs: Vec<String>) -> RunOutcome {
        match self.advance(&mut session, &mut logs).await {
            Ok(pack) => {
                logs.push(log_line(format!(
                    "Review pack ready: {} item(s), {} warning(s)",
                    pack.cart.item_count,
                    pack.warnings.len()
                )));
                tracing::info!(session_id = %session.session_id, "session review ready");
                RunOutcome {
                    success: true,
                    review_pack: Some(pack),
                    error: None,
                    warnings: session.warnings(),
                    logs,
                    session,
                }
            }
            Err(error) => self.abort(session, logs, error).await,
        }
    }

    async fn advance(
        &self,
        session: &mut CoordinatorSession,
        logs: &mut Vec<String>,
    ) -> Result<ReviewPack, SessionError> {
        let ctx = self.context(session);

        if session.status == SessionStatus::Initializing {
            self.step(session, logs, SessionStatus::Authenticating).await?;
        }

        if matches!(
            session.status,
            SessionStatus::Authenticating | SessionStatus::LoadingCart
        ) {
            self.authenticate(&ctx, logs).await?;
            if session.status == SessionStatus::Authenticating {
                self.step(session, logs, SessionStatus::LoadingCart).await?;
            }
            self.run_mandatory(session, &ctx, logs).await?;
            self.run_optional(session, &ctx, logs).await;
            self.step(session, logs, SessionStatus::GeneratingReview).await?;
        }

        if session.status == SessionStatus::GeneratingReview {
            let pack = assemble_review_pack(session)?;
            session.review_pack = Some(pack);
            self.step(session, logs, SessionStatus::ReviewReady).await?;
        }

        session.review_pack.clone().ok_or_else(|| {
            SessionError::ReviewAssembly(format!("session is {} without a review pack", session.status))
        })
    }

    fn context(&self, session: &CoordinatorSession) -> WorkerContext {
        let ctx = WorkerContext::new(&session.session_id, &session.user_id, &session.household_id)
            .with_cancel_token(self.cancel.child_token());
        match &self.environment {
            Some(environment) => ctx.with_environment(Arc::clone(environment)),
            None => ctx,
        }
    }

    /// 推进一步状态并落盘
    async fn step(
        &self,
        session: &mut CoordinatorSession,
        logs: &mut Vec<String>,
        to: SessionStatus,
    ) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Cancelled(to));
        }
        let from = session.status;
        session.transition(to)?;
        logs.push(log_line(format!("Status {from} -> {to}")));
        self.save_checkpoint(session).await;
        Ok(())
    }

    async fn save_checkpoint(&self, session: &mut CoordinatorSession) {
        let Some(store) = self.store.as_ref().filter(|_| self.checkpoint) else {
            return;
        };
        if let Err(e) = store.save(session).await {
            session.record_error(
                CoordinatorError::new("CHECKPOINT_FAILED", e.to_string(), ErrorSeverity::Warning, COORDINATOR_SOURCE)
                    .with_context("status", session.status.as_str()),
            );
        }
    }

    /// 登录只尝试一次，失败即 fatal；超时沿用引擎的单次超时
    async fn authenticate(&self, ctx: &WorkerContext, logs: &mut Vec<String>) -> Result<(), SessionError> {
        let ctx = ctx.for_attempt(LOGIN_SOURCE, &Value::Null, 1);
        let limit = self.engine.options().worker_timeout;
        match timeout(limit, self.login.login(&ctx)).await {
            Ok(Ok(())) => {
                logs.push(log_line("Authenticated"));
                Ok(())
            }
            Ok(Err(e)) => Err(SessionError::AuthenticationFailed(format!("{e:#}"))),
            Err(_) => {
                ctx.cancel.cancel();
                Err(SessionError::AuthenticationFailed(format!(
                    "Login timed out after {} ms",
                    limit.as_millis()
                )))
            }
        }
    }

    async fn run_mandatory(
        &self,
        session: &mut CoordinatorSession,
        ctx: &WorkerContext,
        logs: &mut Vec<String>,
    ) -> Result<(), SessionError> {
        let kind = WorkerKind::CartBuilder;
        let name = kind.task_name();
        if session.workers.succeeded(kind) {
            logs.push(log_line(format!("[{name}] already succeeded, skipping")));
            return Ok(());
        }

        let task = self
            .registry
            .get(name)
            .filter(|t| t.enabled)
            .cloned()
            .ok_or_else(|| SessionError::MandatoryWorkerMissing(name.to_string()))?;

        let mut results = self
            .engine
            .with_continue_on_failure(false)
            .execute_workers(std::slice::from_ref(&task), ctx, ExecutionStrategy::Sequential)
            .await;
        let result = results
            .results
            .remove(name)
            .ok_or_else(|| SessionError::MandatoryWorkerFailed {
                worker: name.to_string(),
                message: "no result recorded".to_string(),
            })?;

        let failure = (!result.success).then(|| result.error.clone().unwrap_or_default());
        self.absorb(session, kind, result, logs);
        match failure {
            Some(message) => Err(SessionError::MandatoryWorkerFailed {
                worker: name.to_string(),
                message,
            }),
            None => Ok(()),
        }
    }

    /// 已启用、属于可选种类且尚无成功结果的任务；失败只记 warning
    async fn run_optional(&self, session: &mut CoordinatorSession, ctx: &WorkerContext, logs: &mut Vec<String>) {
        let tasks: Vec<WorkerTask> = self
            .registry
            .get_enabled_workers()
            .into_iter()
            .filter(|t| {
                WorkerKind::from_task_name(&t.name)
                    .is_some_and(|k| !k.is_mandatory() && !session.workers.succeeded(k))
            })
            .collect();
        if tasks.is_empty() {
            logs.push(log_line("No optional workers to run"));
            return;
        }

        let mut results = self
            .engine
            .with_continue_on_failure(true)
            .execute_workers(&tasks, ctx, self.optional_strategy)
            .await;

        for task in &tasks {
            let (Some(kind), Some(result)) = (
                WorkerKind::from_task_name(&task.name),
                results.results.remove(&task.name),
            ) else {
                continue;
            };
            if !result.success {
                session.record_error(
                    CoordinatorError::new(
                        "OPTIONAL_WORKER_FAILED",
                        result.error.clone().unwrap_or_default(),
                        ErrorSeverity::Warning,
                        task.name.as_str(),
                    )
                    .with_context("state", result.state.as_str())
                    .with_context("attempts", result.attempts),
                );
            }
            self.absorb(session, kind, result, logs);
        }
    }

    /// 把 Worker 结果写入会话槽位，合并日志与截图
    fn absorb(&self, session: &mut CoordinatorSession, kind: WorkerKind, result: WorkerResult, logs: &mut Vec<String>) {
        logs.extend(result.logs.iter().map(log_line));
        for shot in &result.screenshots {
            session.add_screenshot(shot.as_str());
        }
        if result.success && result.attempts > 1 {
            session.record_error(
                CoordinatorError::new(
                    "WORKER_RETRIED",
                    format!("{} succeeded after {} attempts", result.name, result.attempts),
                    ErrorSeverity::Warning,
                    result.name.as_str(),
                )
                .with_recovery(true)
                .with_context("attempts", result.attempts),
            );
        }
        session.workers.set(kind, result);
    }

    async fn abort(&self, mut session: CoordinatorSession, mut logs: Vec<String>, error: SessionError) -> RunOutcome {
        let source = match &error {
            SessionError::AuthenticationFailed(_) => LOGIN_SOURCE.to_string(),
            SessionError::MandatoryWorkerMissing(worker)
            | SessionError::MandatoryWorkerFailed { worker, .. } => worker.clone(),
            _ => COORDINATOR_SOURCE.to_string(),
        };
        tracing::error!(session_id = %session.session_id, code = error.code(), error = %error, "session aborted");
        session.record_error(
            CoordinatorError::new(error.code(), error.to_string(), ErrorSeverity::Fatal, source)
                .with_context("status", session.status.as_str()),
        );
        logs.push(log_line(format!("Aborted at {}: {error}", session.status)));

        if !session.status.is_terminal() {
            let from = session.status;
            if session.cancel().is_ok() {
                logs.push(log_line(format!("Status {from} -> {}", SessionStatus::Cancelled)));
            }
        }
        self.save_checkpoint(&mut session).await;

        RunOutcome {
            success: false,
            review_pack: None,
            error: Some(error),
            warnings: session.warnings(),
            logs,
            session,
        }
    }
}

fn log_line(message: impl AsRef<str>) -> String {
    format!(
        "[{}] {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        message.as_ref()
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::json;

    use super::*;
    use crate::workers::{WorkerOutcome, WorkerState};

    /// 前 `fail_first` 次失败，之后返回 data
    struct MockWorker {
        fail_first: u32,
        error: &'static str,
        data: Value,
        calls: Arc<AtomicU32>,
    }

    impl MockWorker {
        fn ok(data: Value) -> Self {
            Self {
                fail_first: 0,
                error: "",
                data,
                calls: Arc::new(AtomicU32::new(0)),
            }
        }

        fn failing(error: &'static str) -> Self {
            Self {
                fail_first: u32::MAX,
                error,
                data: Value::Null,
                calls: Arc::new(AtomicU32::new(0)),
            }
        }

        fn flaky(fail_first: u32, error: &'static str, data: Value) -> Self {
            Self {
                fail_first,
                error,
                data,
                calls: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl crate::workers::Worker for MockWorker {
        async fn execute(&self, ctx: &WorkerContext) -> WorkerOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_first {
                return WorkerOutcome::failure(self.error);
            }
            WorkerOutcome::success(self.data.clone())
                .with_log(format!("[{}] done", ctx.worker_name))
                .with_screenshot(format!("{}.png", ctx.worker_name))
        }
    }

    struct MockLogin {
        error: Option<&'static str>,
        calls: Arc<AtomicU32>,
    }

    impl MockLogin {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                error: None,
                calls: Arc::new(AtomicU32::new(0)),
            })
        }

        fn failing(error: &'static str) -> Arc<Self> {
            Arc::new(Self {
                error: Some(error),
                calls: Arc::new(AtomicU32::new(0)),
            })
        }
    }

    #[async_trait]
    impl LoginProvider for MockLogin {
        async fn login(&self, _ctx: &WorkerContext) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.error {
                Some(error) => anyhow::bail!(error),
                None => Ok(()),
            }
        }
    }

    fn cart_report() -> Value {
        json!({
            "finalCart": {
                "items": [{ "itemId": "milk", "name": "Milk", "quantity": 2, "unitPrice": 1.25 }]
            },
            "diff": {
                "added": [{ "itemId": "milk", "name": "Milk", "quantity": 2, "sourceOrders": ["o-9"] }]
            },
            "warnings": [{ "kind": "partial_load", "message": "Only 2 of 3 orders loaded" }],
            "confidence": 0.9
        })
    }

    fn substitution_report() -> Value {
        json!({ "summary": { "itemsChecked": 1, "suggestions": [] } })
    }

    fn registry_with(workers: Vec<(WorkerKind, MockWorker)>) -> WorkerRegistry {
        let mut registry = WorkerRegistry::new();
        for (kind, worker) in workers {
            let priority = if kind.is_mandatory() { 100 } else { 10 };
            registry
                .register(WorkerTask::new(kind.task_name(), worker).with_priority(priority))
                .unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_full_run_produces_review_pack() {
        let registry = registry_with(vec![
            (WorkerKind::CartBuilder, MockWorker::ok(cart_report())),
            (WorkerKind::Substitution, MockWorker::ok(substitution_report())),
        ]);
        let coordinator = Coordinator::new(registry, MockLogin::ok());

        let outcome = coordinator.run("user-1", "household-1").await;
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(outcome.session.status, SessionStatus::ReviewReady);
        assert!(outcome.session.end_time.is_some());

        let pack = outcome.review_pack.unwrap();
        assert_eq!(pack.cart.item_count, 2);
        assert!((pack.cart.total - 2.5).abs() < 1e-9);
        assert!(pack.substitutions.is_some());
        assert!(pack.pruning.is_none());
        assert!(pack.delivery_slots.is_none());
        assert_eq!(outcome.session.review_pack.as_ref(), Some(&pack));
        assert_eq!(
            outcome.session.screenshots,
            vec!["cart_builder.png", "substitution.png"]
        );
        assert!(outcome.logs.iter().any(|l| l.ends_with("Status generating_review -> review_ready")));
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_optional_failure_is_warning() {
        let registry = registry_with(vec![
            (WorkerKind::CartBuilder, MockWorker::ok(cart_report())),
            (WorkerKind::SlotScout, MockWorker::failing("element not found: .slot-grid")),
        ]);
        let outcome = Coordinator::new(registry, MockLogin::ok()).run("u", "h").await;

        assert!(outcome.success);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].code, "OPTIONAL_WORKER_FAILED");
        assert_eq!(outcome.warnings[0].source, "slot_scout");
        let slot = outcome.session.workers.get(WorkerKind::SlotScout).unwrap();
        assert_eq!(slot.attempts, 3);
        assert!(outcome.review_pack.unwrap().delivery_slots.is_none());
    }

    #[tokio::test]
    async fn test_mandatory_failure_cancels_session() {
        let registry = registry_with(vec![
            (WorkerKind::CartBuilder, MockWorker::failing("validation failed: empty cart")),
            (WorkerKind::Substitution, MockWorker::ok(substitution_report())),
        ]);
        let outcome = Coordinator::new(registry, MockLogin::ok()).run("u", "h").await;

        assert!(!outcome.success);
        assert!(matches!(
            outcome.error,
            Some(SessionError::MandatoryWorkerFailed { .. })
        ));
        assert_eq!(outcome.session.status, SessionStatus::Cancelled);
        assert!(outcome.session.has_fatal_error());
        let cart = outcome.session.workers.get(WorkerKind::CartBuilder).unwrap();
        assert_eq!(cart.attempts, 1);
        assert_eq!(cart.state, WorkerState::Failed);
        assert!(outcome.session.workers.get(WorkerKind::Substitution).is_none());
        assert!(outcome.review_pack.is_none());
    }

    #[tokio::test]
    async fn test_missing_mandatory_worker() {
        let registry = registry_with(vec![(WorkerKind::Substitution, MockWorker::ok(substitution_report()))]);
        let outcome = Coordinator::new(registry, MockLogin::ok()).run("u", "h").await;
        assert!(matches!(
            outcome.error,
            Some(SessionError::MandatoryWorkerMissing(_))
        ));
        assert_eq!(outcome.session.status, SessionStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_login_failure_is_fatal_and_not_retried() {
        let cart = MockWorker::ok(cart_report());
        let cart_calls = Arc::clone(&cart.calls);
        let login = MockLogin::failing("network timeout");
        let login_calls = Arc::clone(&login.calls);
        let registry = registry_with(vec![(WorkerKind::CartBuilder, cart)]);

        let outcome = Coordinator::new(registry, login).run("u", "h").await;
        assert!(matches!(
            outcome.error,
            Some(SessionError::AuthenticationFailed(_))
        ));
        assert_eq!(login_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cart_calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.session.status, SessionStatus::Cancelled);
        let fatal = outcome.session.errors.last().unwrap();
        assert_eq!(fatal.code, "AUTH_FAILED");
        assert_eq!(fatal.source, "login");
    }

    #[tokio::test]
    async fn test_retried_success_records_warning() {
        let registry = registry_with(vec![(
            WorkerKind::CartBuilder,
            MockWorker::flaky(1, "read ECONNRESET", cart_report()),
        )]);
        let outcome = Coordinator::new(registry, MockLogin::ok()).run("u", "h").await;

        assert!(outcome.success);
        let retried = &outcome.warnings[0];
        assert_eq!(retried.code, "WORKER_RETRIED");
        assert!(retried.recovery_attempted);
        assert_eq!(retried.recovery_successful, Some(true));
    }

    #[tokio::test]
    async fn test_cancel_token_stops_run() {
        let registry = registry_with(vec![(WorkerKind::CartBuilder, MockWorker::ok(cart_report()))]);
        let coordinator = Coordinator::new(registry, MockLogin::ok());
        coordinator.cancel_token().cancel();

        let outcome = coordinator.run("u", "h").await;
        assert!(matches!(outcome.error, Some(SessionError::Cancelled(_))));
        assert_eq!(outcome.session.status, SessionStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_checkpoint_persists_final_state() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(vec![(WorkerKind::CartBuilder, MockWorker::ok(cart_report()))]);
        let coordinator = Coordinator::new(registry, MockLogin::ok()).with_store(SessionStore::new(dir.path()));

        let outcome = coordinator.run("u", "h").await;
        let stored = coordinator
            .store()
            .unwrap()
            .load(&outcome.session.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, SessionStatus::ReviewReady);
        assert!(stored.review_pack.is_some());
    }

    #[tokio::test]
    async fn test_resume_skips_successful_mandatory_worker() {
        let cart = MockWorker::ok(cart_report());
        let cart_calls = Arc::clone(&cart.calls);
        let registry = registry_with(vec![
            (WorkerKind::CartBuilder, cart),
            (WorkerKind::Substitution, MockWorker::ok(substitution_report())),
        ]);
        let login = MockLogin::ok();
        let login_calls = Arc::clone(&login.calls);

        let mut session = CoordinatorSession::new("u", "h");
        session.status = SessionStatus::LoadingCart;
        let now = Utc::now();
        session.workers.set(
            WorkerKind::CartBuilder,
            WorkerResult {
                name: "cart_builder".into(),
                success: true,
                state: WorkerState::Success,
                data: Some(cart_report()),
                error: None,
                duration_ms: 12,
                attempts: 1,
                started_at: now,
                ended_at: now,
                logs: Vec::new(),
                screenshots: Vec::new(),
            },
        );

        let outcome = Coordinator::new(registry, login).resume(session).await.unwrap();
        assert!(outcome.success);
        assert_eq!(cart_calls.load(Ordering::SeqCst), 0);
        assert_eq!(login_calls.load(Ordering::SeqCst), 1);
        assert!(outcome.review_pack.unwrap().substitutions.is_some());
    }

    #[tokio::test]
    async fn test_resume_rejects_terminal_session() {
        let registry = registry_with(vec![(WorkerKind::CartBuilder, MockWorker::ok(cart_report()))]);
        let coordinator = Coordinator::new(registry, MockLogin::ok());
        let mut session = CoordinatorSession::new("u", "h");
        session.cancel().unwrap();
        assert!(matches!(
            coordinator.resume(session).await,
            Err(SessionError::Persistence(_))
        ));
    }

    #[tokio::test]
    async fn test_resume_review_ready_returns_stored_pack() {
        let registry = registry_with(vec![(WorkerKind::CartBuilder, MockWorker::ok(cart_report()))]);
        let login = MockLogin::ok();
        let login_calls = Arc::clone(&login.calls);
        let coordinator = Coordinator::new(registry, login);

        let first = coordinator.run("u", "h").await;
        let pack = first.review_pack.clone().unwrap();
        let again = coordinator.resume(first.session).await.unwrap();
        assert_eq!(again.review_pack, Some(pack));
        assert_eq!(login_calls.load(Ordering::SeqCst), 1);
    }
}
