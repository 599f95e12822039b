//! 执行过程事件：开始 / 重试 / 完成
//!
//! 观察者以 Vec<Arc<dyn ExecutionObserver>> 形式挂在 ExecutionOptions 上，可有零个或多个；
//! BroadcastObserver 把事件转发到 broadcast 通道，供任意数量的订阅方消费。

use serde::Serialize;
use tokio::sync::broadcast;

use crate::workers::{WorkerResult, WorkerState};

/// 单个 Worker 的执行事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    WorkerStarted {
        worker: String,
    },
    WorkerRetrying {
        worker: String,
        attempt: u32,
        error: String,
    },
    WorkerCompleted {
        worker: String,
        state: WorkerState,
        attempts: u32,
        duration_ms: u64,
        error: Option<String>,
    },
}

impl ExecutionEvent {
    pub fn completed(result: &WorkerResult) -> Self {
        ExecutionEvent::WorkerCompleted {
            worker: result.name.clone(),
            state: result.state,
            attempts: result.attempts,
            duration_ms: result.duration_ms,
            error: result.error.clone(),
        }
    }
}

/// 执行观察者；默认实现全部为空
pub trait ExecutionObserver: Send + Sync {
    fn on_worker_start(&self, _worker: &str) {}

    fn on_worker_retry(&self, _worker: &str, _attempt: u32, _error: &str) {}

    fn on_worker_complete(&self, _result: &WorkerResult) {}
}

/// 将事件转发到 broadcast 通道；没有订阅者时事件直接丢弃
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    tx: broadcast::Sender<ExecutionEvent>,
}

impl BroadcastObserver {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.tx.subscribe()
    }

    fn emit(&self, event: ExecutionEvent) {
        let _ = self.tx.send(event);
    }
}

impl ExecutionObserver for BroadcastObserver {
    fn on_worker_start(&self, worker: &str) {
        self.emit(ExecutionEvent::WorkerStarted {
            worker: worker.to_string(),
        });
    }

    fn on_worker_retry(&self, worker: &str, attempt: u32, error: &str) {
        self.emit(ExecutionEvent::WorkerRetrying {
            worker: worker.to_string(),
            attempt,
            error: error.to_string(),
        });
    }

    fn on_worker_complete(&self, result: &WorkerResult) {
        self.emit(ExecutionEvent::completed(result));
    }
}
