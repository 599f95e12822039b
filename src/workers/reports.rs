//! 各协作 Worker 的结构化输出
//!
//! 引擎只把它们当作 serde_json::Value 传递；只有 Review Pack 组装时才解码。
//! 字段名使用 camelCase，与协作方产出的 JSON 保持一致。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 已知的 Worker 种类（会话中每种一个结果槽位）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    /// 必选：组装购物车
    CartBuilder,
    /// 可选：缺货替代品查询
    Substitution,
    /// 可选：按库存裁剪
    StockPruner,
    /// 可选：配送时段发现
    SlotScout,
}

impl WorkerKind {
    pub const OPTIONAL: [WorkerKind; 3] = [
        WorkerKind::Substitution,
        WorkerKind::StockPruner,
        WorkerKind::SlotScout,
    ];

    /// 注册表中使用的任务名
    pub fn task_name(&self) -> &'static str {
        match self {
            WorkerKind::CartBuilder => "cart_builder",
            WorkerKind::Substitution => "substitution",
            WorkerKind::StockPruner => "stock_pruner",
            WorkerKind::SlotScout => "slot_scout",
        }
    }

    pub fn from_task_name(name: &str) -> Option<WorkerKind> {
        [WorkerKind::CartBuilder]
            .into_iter()
            .chain(WorkerKind::OPTIONAL)
            .find(|kind| kind.task_name() == name)
    }

    pub fn is_mandatory(&self) -> bool {
        matches!(self, WorkerKind::CartBuilder)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub item_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
    /// 该商品来自哪些历史订单
    #[serde(default)]
    pub source_orders: Vec<String>,
}

impl CartItem {
    pub fn line_total(&self) -> f64 {
        self.unit_price * f64::from(self.quantity)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    pub items: Vec<CartItem>,
    /// 页面上显示的合计；缺省时按行合计计算
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
}

impl CartSnapshot {
    /// 数量来自页面数据，求和饱和在 u32::MAX
    pub fn item_count(&self) -> u32 {
        self.items.iter().fold(0u32, |acc, i| acc.saturating_add(i.quantity))
    }

    pub fn total(&self) -> f64 {
        self.total
            .unwrap_or_else(|| self.items.iter().map(CartItem::line_total).sum())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffItem {
    pub item_id: String,
    pub name: String,
    pub quantity: u32,
    #[serde(default)]
    pub source_orders: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityChange {
    pub item_id: String,
    pub name: String,
    pub previous_quantity: u32,
    pub new_quantity: u32,
    #[serde(default)]
    pub source_orders: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartDiff {
    #[serde(default)]
    pub added: Vec<DiffItem>,
    #[serde(default)]
    pub removed: Vec<DiffItem>,
    #[serde(default)]
    pub quantity_changed: Vec<QuantityChange>,
}

impl CartDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.quantity_changed.is_empty()
    }
}

/// 购物车组装器上报的问题类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartWarningKind {
    StockIssue,
    PriceIssue,
    QuantityAdjustment,
    PartialLoad,
    ReorderFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartWarning {
    pub kind: CartWarningKind,
    pub message: String,
    #[serde(default)]
    pub item_id: Option<String>,
}

/// 必选 Worker（cart_builder）的输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartBuilderReport {
    pub final_cart: CartSnapshot,
    #[serde(default)]
    pub diff: CartDiff,
    #[serde(default)]
    pub warnings: Vec<CartWarning>,
    /// 0.0 ..= 1.0
    pub confidence: f64,
    #[serde(default)]
    pub source_orders: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstitutionSuggestion {
    pub original_item_id: String,
    pub original_name: String,
    pub substitute_name: String,
    #[serde(default)]
    pub substitute_price: Option<f64>,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstitutionSummary {
    pub items_checked: u32,
    pub suggestions: Vec<SubstitutionSuggestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrunedItem {
    pub item_id: String,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruningSummary {
    pub items_kept: u32,
    pub pruned: Vec<PrunedItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySlot {
    pub slot_id: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub price: Option<f64>,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSummary {
    pub slots: Vec<DeliverySlot>,
    #[serde(default)]
    pub recommended_slot_id: Option<String>,
}

/// 可选 Worker 的输出外壳：summary 缺失时 Review Pack 不包含对应段落
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionalReport<S> {
    #[serde(default = "Option::default")]
    pub summary: Option<S>,
}

pub type SubstitutionReport = OptionalReport<SubstitutionSummary>;
pub type PruningReport = OptionalReport<PruningSummary>;
pub type SlotReport = OptionalReport<SlotSummary>;
