//! 会话持久化：JSON 投影与校验、文件存储、可恢复性判断与过期清理

pub mod recovery;
pub mod serialized;
pub mod store;

pub use recovery::{can_resume, get_resume_point};
pub use serialized::{
    canonicalize_timestamps, format_timestamp, parse_timestamp, SerializedError, SerializedSession,
    SerializedWorkerResult, SerializedWorkerSlots, SessionValidation,
};
pub use store::SessionStore;
