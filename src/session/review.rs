//! Review Pack：一次运行交给人工审核的最终产物
//!
//! 组装是纯变换：输入会话中的 Worker 结果，输出 ReviewPack，不做 I/O。
//! 可选段落只有在对应 Worker 运行成功且带 summary 时才出现，否则整个字段缺失。

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::SessionError;
use crate::session::CoordinatorSession;
use crate::workers::reports::{
    CartBuilderReport, CartDiff, CartItem, CartWarning, CartWarningKind, OptionalReport,
    PruningSummary, SlotSummary, SubstitutionSummary,
};
use crate::workers::{WorkerKind, WorkerResult};

/// 数据质量分下限
const MIN_DATA_QUALITY: f64 = 0.5;
/// 每条警告扣减的数据质量分
const WARNING_PENALTY: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewWarningKind {
    OutOfStock,
    PriceChange,
    DataQuality,
    PartialOrderLoad,
    MissingItem,
}

impl From<CartWarningKind> for ReviewWarningKind {
    fn from(kind: CartWarningKind) -> Self {
        match kind {
            CartWarningKind::StockIssue => ReviewWarningKind::OutOfStock,
            CartWarningKind::PriceIssue => ReviewWarningKind::PriceChange,
            CartWarningKind::QuantityAdjustment => ReviewWarningKind::DataQuality,
            CartWarningKind::PartialLoad => ReviewWarningKind::PartialOrderLoad,
            CartWarningKind::ReorderFailure => ReviewWarningKind::MissingItem,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewWarning {
    pub kind: ReviewWarningKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

impl From<&CartWarning> for ReviewWarning {
    fn from(warning: &CartWarning) -> Self {
        Self {
            kind: warning.kind.into(),
            message: warning.message.clone(),
            item_id: warning.item_id.clone(),
        }
    }
}

/// 审核者可执行的动作；不存在任何结账/下单动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    ApproveCart,
    RejectCart,
    EditCart,
    ReviewSubstitutions,
    ReviewPruning,
    ChooseDeliverySlot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub item_count: u32,
    pub total: f64,
    pub items: Vec<CartItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceScores {
    pub cart_accuracy: f64,
    pub data_quality: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPack {
    pub session_id: String,
    pub household_id: String,
    pub generated_at: DateTime<Utc>,
    pub cart: CartSummary,
    pub diff: CartDiff,
    pub warnings: Vec<ReviewWarning>,
    pub actions: Vec<UserAction>,
    pub confidence: ConfidenceScores,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substitutions: Option<SubstitutionSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pruning: Option<PruningSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_slots: Option<SlotSummary>,
}

pub fn data_quality_score(warning_count: usize) -> f64 {
    (1.0 - WARNING_PENALTY * warning_count as f64).max(MIN_DATA_QUALITY)
}

/// 从会话中的 Worker 结果组装 Review Pack
pub fn assemble_review_pack(session: &CoordinatorSession) -> Result<ReviewPack, SessionError> {
    let cart_result = session
        .workers
        .get(WorkerKind::CartBuilder)
        .filter(|r| r.success)
        .ok_or_else(|| SessionError::ReviewAssembly("cart builder has no successful result".to_string()))?;
    let data = cart_result
        .data
        .clone()
        .ok_or_else(|| SessionError::ReviewAssembly("cart builder returned no data".to_string()))?;
    let report: CartBuilderReport = serde_json::from_value(data)
        .map_err(|e| SessionError::ReviewAssembly(format!("malformed cart builder report: {e}")))?;

    let warnings: Vec<ReviewWarning> = report.warnings.iter().map(ReviewWarning::from).collect();
    let confidence = ConfidenceScores {
        cart_accuracy: report.confidence.clamp(0.0, 1.0),
        data_quality: data_quality_score(warnings.len()),
    };

    let substitutions = optional_section::<SubstitutionSummary>(session, WorkerKind::Substitution);
    let pruning = optional_section::<PruningSummary>(session, WorkerKind::StockPruner);
    let delivery_slots = optional_section::<SlotSummary>(session, WorkerKind::SlotScout);

    let mut actions = vec![UserAction::ApproveCart, UserAction::RejectCart];
    if !report.diff.is_empty() {
        actions.push(UserAction::EditCart);
    }
    if substitutions.is_some() {
        actions.push(UserAction::ReviewSubstitutions);
    }
    if pruning.is_some() {
        actions.push(UserAction::ReviewPruning);
    }
    if delivery_slots.is_some() {
        actions.push(UserAction::ChooseDeliverySlot);
    }

    Ok(ReviewPack {
        session_id: session.session_id.clone(),
        household_id: session.household_id.clone(),
        generated_at: Utc::now(),
        cart: CartSummary {
            item_count: report.final_cart.item_count(),
            total: report.final_cart.total(),
            items: report.final_cart.items.clone(),
        },
        diff: report.diff,
        warnings,
        actions,
        confidence,
        substitutions,
        pruning,
        delivery_slots,
    })
}

fn optional_section<S: DeserializeOwned>(session: &CoordinatorSession, kind: WorkerKind) -> Option<S> {
    let result: &WorkerResult = session.workers.get(kind).filter(|r| r.success)?;
    let data = result.data.clone()?;
    match serde_json::from_value::<OptionalReport<S>>(data) {
        Ok(report) => report.summary,
        Err(e) => {
            tracing::warn!(worker = kind.task_name(), error = %e, "ignoring malformed optional report");
            None
        }
    }
}
