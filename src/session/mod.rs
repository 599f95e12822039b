//! 购物会话：数据模型、Review Pack 组装与协调器

pub mod coordinator;
pub mod model;
pub mod review;

pub use coordinator::{Coordinator, LoginProvider, RunOutcome};
pub use model::{CoordinatorError, CoordinatorSession, ErrorSeverity, WorkerSlots};
pub use review::{
    assemble_review_pack, data_quality_score, CartSummary, ConfidenceScores, ReviewPack,
    ReviewWarning, ReviewWarningKind, UserAction,
};
