//! 会话状态机
//!
//! initializing → authenticating → loading_cart → generating_review → review_ready → completed，
//! 任意非终态可跳到 cancelled；状态从不回退。review_ready → completed 由人工审核触发，不在本核心内发生。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 一次购物会话的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initializing,
    Authenticating,
    LoadingCart,
    GeneratingReview,
    /// 内部唯一的非错误终点：等待人工审核
    ReviewReady,
    /// 人工确认后由外部设置
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 7] = [
        SessionStatus::Initializing,
        SessionStatus::Authenticating,
        SessionStatus::LoadingCart,
        SessionStatus::GeneratingReview,
        SessionStatus::ReviewReady,
        SessionStatus::Completed,
        SessionStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Initializing => "initializing",
            SessionStatus::Authenticating => "authenticating",
            SessionStatus::LoadingCart => "loading_cart",
            SessionStatus::GeneratingReview => "generating_review",
            SessionStatus::ReviewReady => "review_ready",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    /// completed / cancelled 之后会话在逻辑上不可变
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    /// 状态链上的下一个阶段（cancelled 不在链上）
    pub fn next(&self) -> Option<SessionStatus> {
        match self {
            SessionStatus::Initializing => Some(SessionStatus::Authenticating),
            SessionStatus::Authenticating => Some(SessionStatus::LoadingCart),
            SessionStatus::LoadingCart => Some(SessionStatus::GeneratingReview),
            SessionStatus::GeneratingReview => Some(SessionStatus::ReviewReady),
            SessionStatus::ReviewReady => Some(SessionStatus::Completed),
            SessionStatus::Completed | SessionStatus::Cancelled => None,
        }
    }

    pub fn can_transition_to(&self, to: SessionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == SessionStatus::Cancelled || self.next() == Some(to)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SessionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown session status '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_chain() {
        let mut status = SessionStatus::Initializing;
        let mut seen = vec![status];
        while let Some(next) = status.next() {
            assert!(status.can_transition_to(next));
            status = next;
            seen.push(status);
        }
        assert_eq!(status, SessionStatus::Completed);
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn test_no_regression_or_skip() {
        assert!(!SessionStatus::LoadingCart.can_transition_to(SessionStatus::Authenticating));
        assert!(!SessionStatus::Authenticating.can_transition_to(SessionStatus::GeneratingReview));
        assert!(!SessionStatus::Initializing.can_transition_to(SessionStatus::Completed));
    }

    #[test]
    fn test_cancel_from_any_live_state() {
        for status in SessionStatus::ALL {
            let expected = !status.is_terminal();
            assert_eq!(status.can_transition_to(SessionStatus::Cancelled), expected, "{status}");
        }
    }

    #[test]
    fn test_parse_round_trip() {
        for status in SessionStatus::ALL {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!("checked_out".parse::<SessionStatus>().is_err());
    }
}
