//! Worker 注册表
//!
//! 所有 Worker 实现 Worker trait（execute），以 WorkerTask 描述符（名称、开关、配置、优先级）
//! 按名注册；名称唯一。内部用 Vec 保存，保证同优先级时保持注册顺序。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::RegistryError;
use crate::workers::{WorkerContext, WorkerOutcome};

/// Worker trait：引擎只调用 execute，不关心 data 的结构
#[async_trait]
pub trait Worker: Send + Sync {
    async fn execute(&self, ctx: &WorkerContext) -> WorkerOutcome;
}

/// 已注册的任务描述符
#[derive(Clone)]
pub struct WorkerTask {
    pub name: String,
    pub enabled: bool,
    /// 原样传给 Worker（WorkerContext::config）
    pub config: Value,
    /// 越大越先执行，默认 0
    pub priority: i32,
    /// 预留，引擎不据此排序
    pub dependencies: Vec<String>,
    pub worker: Arc<dyn Worker>,
}

impl WorkerTask {
    pub fn new(name: impl Into<String>, worker: impl Worker + 'static) -> Self {
        Self::from_arc(name, Arc::new(worker))
    }

    pub fn from_arc(name: impl Into<String>, worker: Arc<dyn Worker>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            config: Value::Null,
            priority: 0,
            dependencies: Vec::new(),
            worker,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

impl std::fmt::Debug for WorkerTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerTask")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("priority", &self.priority)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

#[derive(Default, Clone, Debug)]
pub struct WorkerRegistry {
    tasks: Vec<WorkerTask>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task: WorkerTask) -> Result<(), RegistryError> {
        if self.has(&task.name) {
            return Err(RegistryError::DuplicateWorker(task.name));
        }
        tracing::debug!(worker = %task.name, priority = task.priority, "worker registered");
        self.tasks.push(task);
        Ok(())
    }

    /// 返回是否确实移除了任务
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.name != name);
        self.tasks.len() != before
    }

    pub fn get(&self, name: &str) -> Option<&WorkerTask> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), RegistryError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| RegistryError::WorkerNotFound(name.to_string()))?;
        task.enabled = enabled;
        Ok(())
    }

    /// 全部任务（含禁用），按注册顺序
    pub fn get_all_workers(&self) -> Vec<WorkerTask> {
        self.tasks.clone()
    }

    /// 启用的任务，按优先级降序；sort_by 是稳定排序，同优先级保持注册顺序
    pub fn get_enabled_workers(&self) -> Vec<WorkerTask> {
        let mut enabled: Vec<WorkerTask> = self.tasks.iter().filter(|t| t.enabled).cloned().collect();
        enabled.sort_by(|a, b| b.priority.cmp(&a.priority));
        enabled
    }

    pub fn get_worker_names(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.name.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
