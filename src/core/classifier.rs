//! 错误分类与重试策略
//!
//! 协作方不提供类型化错误，只能按消息关键字分类：先查不可重试集合（命中即返回），
//! 再查可重试集合；都不命中视为不可重试。所有 Worker 委托（必选与可选）共用同一个 RetryPolicy。

use std::time::Duration;

/// 认证、校验、业务规则类：重试无意义，且下单/支付相关绝不重试
const NON_RETRYABLE_PATTERNS: &[&str] = &[
    "authentication",
    "login",
    "unauthorized",
    "forbidden",
    "invalid",
    "validation",
    "not logged in",
    "purchase",
    "order",
    "payment",
];

/// 网络、时序、页面未就绪类
const RETRYABLE_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "network",
    "navigation",
    "econnreset",
    "econnrefused",
    "element not found",
    "waiting for selector",
    "page crashed",
    "context destroyed",
    "target closed",
    "socket hang up",
];

/// 错误分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 瞬时错误，可重试
    Transient,
    /// 命中不可重试关键字
    Fatal,
    /// 无法识别，按不可重试处理
    Unknown,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

/// 按关键字对错误消息分类（大小写不敏感）
pub fn classify(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();
    if NON_RETRYABLE_PATTERNS.iter().any(|p| lower.contains(p)) {
        return ErrorClass::Fatal;
    }
    if RETRYABLE_PATTERNS.iter().any(|p| lower.contains(p)) {
        return ErrorClass::Transient;
    }
    ErrorClass::Unknown
}

pub fn is_retryable_error(message: &str) -> bool {
    classify(message).is_retryable()
}

/// 重试策略：最大重试次数 + 线性退避（默认 0，即立即重试）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_ms: 0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_ms: 0,
        }
    }

    pub fn with_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.backoff_ms = backoff_ms;
        self
    }

    /// 尝试总次数上限（首次 + 重试）
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// 第 `attempt` 次（从 1 计）失败后是否再试
    pub fn should_retry(&self, error: &str, attempt: u32) -> bool {
        attempt < self.max_attempts() && is_retryable_error(error)
    }

    /// 第 `attempt` 次失败后、下一次尝试前的等待时间
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_messages() {
        assert!(is_retryable_error("Navigation timeout of 30000 ms exceeded"));
        assert!(is_retryable_error("net::ERR_NETWORK_CHANGED"));
        assert!(is_retryable_error("read ECONNRESET"));
        assert!(is_retryable_error("Element not found: .cart-row"));
        assert!(is_retryable_error("Target closed"));
        assert!(is_retryable_error("socket hang up"));
    }

    #[test]
    fn test_non_retryable_wins_over_retryable() {
        // "login" 与 "timeout" 同时出现
        assert!(!is_retryable_error("Login page timeout"));
        assert_eq!(classify("payment network error"), ErrorClass::Fatal);
    }

    #[test]
    fn test_unknown_is_not_retryable() {
        assert_eq!(classify("something odd happened"), ErrorClass::Unknown);
        assert!(!is_retryable_error("something odd happened"));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(is_retryable_error("WAITING FOR SELECTOR #basket"));
        assert!(!is_retryable_error("UNAUTHORIZED"));
    }

    #[test]
    fn test_policy_attempts() {
        let policy = RetryPolicy::new(2);
        assert_eq!(policy.max_attempts(), 3);
        assert!(policy.should_retry("network down", 1));
        assert!(policy.should_retry("network down", 2));
        assert!(!policy.should_retry("network down", 3));
        assert!(!policy.should_retry("validation failed", 1));
    }

    #[test]
    fn test_policy_backoff() {
        assert_eq!(RetryPolicy::default().delay_after(2), Duration::ZERO);
        let policy = RetryPolicy::new(3).with_backoff_ms(100);
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
    }
}
