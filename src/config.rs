//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件（默认文件，再叠加显式指定的文件），再用环境变量 `CARTPILOT__*` 覆盖（双下划线表示嵌套，如 `CARTPILOT__ENGINE__MAX_RETRIES=3`）。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::core::RetryPolicy;
use crate::workers::{ExecutionOptions, ExecutionStrategy};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub persistence: PersistenceSection,
}

/// [engine] 段：并发、超时与重试
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// parallel-limited 的批大小
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// 单次尝试超时（毫秒）
    #[serde(default = "default_worker_timeout_ms")]
    pub worker_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 重试前线性退避的基数（毫秒），0 表示立即重试
    #[serde(default)]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_true")]
    pub continue_on_failure: bool,
}

fn default_max_concurrency() -> usize {
    2
}

fn default_worker_timeout_ms() -> u64 {
    300_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            worker_timeout_ms: default_worker_timeout_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: 0,
            continue_on_failure: true,
        }
    }
}

impl EngineSection {
    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions::default()
            .with_max_concurrency(self.max_concurrency)
            .with_worker_timeout(Duration::from_millis(self.worker_timeout_ms))
            .with_retry_policy(RetryPolicy::new(self.max_retries).with_backoff_ms(self.retry_backoff_ms))
            .with_continue_on_failure(self.continue_on_failure)
    }
}

/// [session] 段：可选 Worker 的调度方式、是否在每次状态变化后落盘
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    /// 可选 Worker 通常共享同一个浏览器页面，默认串行
    #[serde(default)]
    pub optional_strategy: ExecutionStrategy,
    #[serde(default = "default_true")]
    pub checkpoint: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            optional_strategy: ExecutionStrategy::Sequential,
            checkpoint: true,
        }
    }
}

/// [persistence] 段：会话目录与保留天数
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceSection {
    #[serde(default = "default_session_dir")]
    pub session_dir: PathBuf,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_session_dir() -> PathBuf {
    PathBuf::from("./sessions")
}

fn default_retention_days() -> u32 {
    7
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            session_dir: default_session_dir(),
            retention_days: default_retention_days(),
        }
    }
}

impl PersistenceSection {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

/// 默认配置文件的查找位置（相对当前目录），命中第一个即停止
const DEFAULT_CONFIG_FILES: [&str; 2] = ["config/default.toml", "../config/default.toml"];

/// 加载配置：默认文件 → 显式文件 → 环境变量 CARTPILOT__*（双下划线表示嵌套键），后者覆盖前者
///
/// 显式路径不存在时报错；加载后校验取值，非法值（如并发为 0）直接拒绝。
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(found) = DEFAULT_CONFIG_FILES.iter().map(Path::new).find(|p| p.exists()) {
        builder = builder.add_source(config::File::from(found).required(false));
    }
    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }
    builder = builder.add_source(
        config::Environment::with_prefix("CARTPILOT")
            .separator("__")
            .try_parsing(true),
    );

    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.validate()?;
    tracing::debug!(
        session_dir = %cfg.persistence.session_dir.display(),
        retention_days = cfg.persistence.retention_days,
        strategy = %cfg.session.optional_strategy,
        "configuration loaded"
    );
    Ok(cfg)
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let invalid = |key: &str| -> Result<(), config::ConfigError> {
            Err(config::ConfigError::Message(format!("{key} must be greater than 0")))
        };
        if self.engine.max_concurrency == 0 {
            return invalid("engine.max_concurrency");
        }
        if self.engine.worker_timeout_ms == 0 {
            return invalid("engine.worker_timeout_ms");
        }
        if self.persistence.retention_days == 0 {
            return invalid("persistence.retention_days");
        }
        Ok(())
    }
}
