//! 会话可恢复性判断

use crate::core::{PersistenceError, SessionStatus};
use crate::session::CoordinatorSession;

/// 终态或存在 fatal 错误的会话不可恢复
pub fn can_resume(session: &CoordinatorSession) -> bool {
    !session.status.is_terminal() && !session.has_fatal_error()
}

/// 恢复时应从哪个阶段重新开始：即会话当前状态
pub fn get_resume_point(session: &CoordinatorSession) -> Result<SessionStatus, PersistenceError> {
    if !can_resume(session) {
        return Err(PersistenceError::NotResumable {
            id: session.session_id.clone(),
            status: session.status,
        });
    }
    Ok(session.status)
}
