//! SerializedSession：CoordinatorSession 在持久化边界上的 JSON 投影
//!
//! 所有时间戳统一为毫秒精度的 RFC 3339（`2026-01-02T03:04:05.678Z`）。Worker 数据与 Review Pack
//! 是任意 JSON，写出前递归遍历，把其中能解析为 RFC 3339 的时间戳字段也规范化，其余值原样保留。
//! 读回时只校验会话自身的结构（Worker 数据不做形状检查，Review Pack 按类型解码），
//! 校验结果是 SessionValidation，而不是一路 panic / 抛错。

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{PersistenceError, SessionStatus};
use crate::session::{CoordinatorError, CoordinatorSession, ErrorSeverity, ReviewPack, WorkerSlots};
use crate::workers::{WorkerKind, WorkerResult, WorkerState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedWorkerResult {
    pub name: String,
    pub success: bool,
    pub state: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub attempts: u32,
    pub started_at: String,
    pub ended_at: String,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub screenshots: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedWorkerSlots {
    #[serde(default)]
    pub cart_builder: Option<SerializedWorkerResult>,
    #[serde(default)]
    pub substitution: Option<SerializedWorkerResult>,
    #[serde(default)]
    pub stock_pruner: Option<SerializedWorkerResult>,
    #[serde(default)]
    pub slot_scout: Option<SerializedWorkerResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedError {
    pub code: String,
    pub message: String,
    pub severity: String,
    pub source: String,
    pub recovery_attempted: bool,
    #[serde(default)]
    pub recovery_successful: Option<bool>,
    pub timestamp: String,
    #[serde(default)]
    pub context: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedSession {
    pub session_id: String,
    pub start_time: String,
    #[serde(default)]
    pub end_time: Option<String>,
    pub user_id: String,
    pub household_id: String,
    pub status: String,
    #[serde(default)]
    pub workers: SerializedWorkerSlots,
    #[serde(default)]
    pub review_pack: Option<Value>,
    #[serde(default)]
    pub errors: Vec<SerializedError>,
    #[serde(default)]
    pub screenshots: Vec<String>,
}

/// 校验结果：要么得到完整会话，要么得到全部问题列表
#[derive(Debug)]
pub enum SessionValidation {
    Valid(Box<CoordinatorSession>),
    Invalid(Vec<String>),
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|ts| ts.with_timezone(&Utc))
}

/// `createdAt` / `starts_at` / `timestamp` / `startTime` 之类的键
fn is_timestamp_key(key: &str) -> bool {
    key == "timestamp" || key.ends_with("At") || key.ends_with("_at") || key.ends_with("Time")
}

/// 递归把嵌套 JSON 中的时间戳字段规范化为毫秒精度 UTC；解析不了的值不动
pub fn canonicalize_timestamps(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if is_timestamp_key(key) {
                    if let Value::String(raw) = child {
                        if let Ok(ts) = parse_timestamp(raw) {
                            *raw = format_timestamp(&ts);
                            continue;
                        }
                    }
                }
                canonicalize_timestamps(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(canonicalize_timestamps),
        _ => {}
    }
}

fn serialize_worker(result: &WorkerResult) -> SerializedWorkerResult {
    let data = result.data.clone().map(|mut data| {
        canonicalize_timestamps(&mut data);
        data
    });
    SerializedWorkerResult {
        name: result.name.clone(),
        success: result.success,
        state: result.state.as_str().to_string(),
        data,
        error: result.error.clone(),
        duration_ms: result.duration_ms,
        attempts: result.attempts,
        started_at: format_timestamp(&result.started_at),
        ended_at: format_timestamp(&result.ended_at),
        logs: result.logs.clone(),
        screenshots: result.screenshots.clone(),
    }
}

fn serialize_error(error: &CoordinatorError) -> SerializedError {
    SerializedError {
        code: error.code.clone(),
        message: error.message.clone(),
        severity: error.severity.as_str().to_string(),
        source: error.source.clone(),
        recovery_attempted: error.recovery_attempted,
        recovery_successful: error.recovery_successful,
        timestamp: format_timestamp(&error.timestamp),
        context: error.context.clone(),
    }
}

impl SerializedSession {
    pub fn from_session(session: &CoordinatorSession) -> Result<Self, PersistenceError> {
        let review_pack = session
            .review_pack
            .as_ref()
            .map(|pack| {
                serde_json::to_value(pack).map(|mut value| {
                    canonicalize_timestamps(&mut value);
                    value
                })
            })
            .transpose()
            .map_err(|source| PersistenceError::Encode {
                id: session.session_id.clone(),
                source,
            })?;

        let slots = &session.workers;
        Ok(Self {
            session_id: session.session_id.clone(),
            start_time: format_timestamp(&session.start_time),
            end_time: session.end_time.as_ref().map(format_timestamp),
            user_id: session.user_id.clone(),
            household_id: session.household_id.clone(),
            status: session.status.as_str().to_string(),
            workers: SerializedWorkerSlots {
                cart_builder: slots.cart_builder.as_ref().map(serialize_worker),
                substitution: slots.substitution.as_ref().map(serialize_worker),
                stock_pruner: slots.stock_pruner.as_ref().map(serialize_worker),
                slot_scout: slots.slot_scout.as_ref().map(serialize_worker),
            },
            review_pack,
            errors: session.errors.iter().map(serialize_error).collect(),
            screenshots: session.screenshots.clone(),
        })
    }

    /// 按会话模式校验并重建；收集所有问题而不是遇到第一个就返回
    pub fn validate(self) -> SessionValidation {
        let mut v = Validator::default();

        if self.session_id.trim().is_empty() {
            v.issue("sessionId: must not be empty");
        }
        let start_time = v.timestamp("startTime", &self.start_time);
        let end_time = self.end_time.as_deref().and_then(|raw| v.timestamp("endTime", raw));
        if let (Some(start), Some(end)) = (start_time, end_time) {
            if end < start {
                v.issue("endTime: precedes startTime");
            }
        }
        let status = v.parse::<SessionStatus>("status", &self.status);

        let mut workers = WorkerSlots::default();
        let slots = [
            (WorkerKind::CartBuilder, self.workers.cart_builder),
            (WorkerKind::Substitution, self.workers.substitution),
            (WorkerKind::StockPruner, self.workers.stock_pruner),
            (WorkerKind::SlotScout, self.workers.slot_scout),
        ];
        for (kind, slot) in slots {
            if let Some(raw) = slot {
                if let Some(result) = v.worker(kind, raw) {
                    workers.set(kind, result);
                }
            }
        }

        let review_pack = self.review_pack.and_then(|raw| {
            match serde_json::from_value::<ReviewPack>(raw) {
                Ok(pack) => Some(pack),
                Err(e) => {
                    v.issue(format!("reviewPack: {e}"));
                    None
                }
            }
        });

        let errors: Vec<CoordinatorError> = self
            .errors
            .into_iter()
            .enumerate()
            .filter_map(|(i, raw)| v.error(i, raw))
            .collect();

        match (v.issues.is_empty(), start_time, status) {
            (true, Some(start_time), Some(status)) => SessionValidation::Valid(Box::new(CoordinatorSession {
                session_id: self.session_id,
                start_time,
                end_time,
                user_id: self.user_id,
                household_id: self.household_id,
                status,
                workers,
                review_pack,
                errors,
                screenshots: self.screenshots,
            })),
            _ => SessionValidation::Invalid(v.issues),
        }
    }

    pub fn into_session(self) -> Result<CoordinatorSession, PersistenceError> {
        let id = self.session_id.clone();
        match self.validate() {
            SessionValidation::Valid(session) => Ok(*session),
            SessionValidation::Invalid(issues) => Err(PersistenceError::Invalid { id, issues }),
        }
    }
}

#[derive(Default)]
struct Validator {
    issues: Vec<String>,
}

impl Validator {
    fn issue(&mut self, message: impl Into<String>) {
        self.issues.push(message.into());
    }

    fn timestamp(&mut self, field: &str, raw: &str) -> Option<DateTime<Utc>> {
        match parse_timestamp(raw) {
            Ok(ts) => Some(ts),
            Err(e) => {
                self.issue(format!("{field}: invalid timestamp '{raw}' ({e})"));
                None
            }
        }
    }

    fn parse<T: FromStr<Err = String>>(&mut self, field: &str, raw: &str) -> Option<T> {
        match raw.parse::<T>() {
            Ok(value) => Some(value),
            Err(e) => {
                self.issue(format!("{field}: {e}"));
                None
            }
        }
    }

    fn worker(&mut self, kind: WorkerKind, raw: SerializedWorkerResult) -> Option<WorkerResult> {
        let field = format!("workers.{}", kind.task_name());
        if raw.name != kind.task_name() {
            self.issue(format!("{field}.name: expected '{}', found '{}'", kind.task_name(), raw.name));
        }
        let state = self.parse::<WorkerState>(&format!("{field}.state"), &raw.state);
        if let Some(state) = state {
            if (state == WorkerState::Success) != raw.success {
                self.issue(format!("{field}: success flag disagrees with state '{}'", raw.state));
            }
        }
        let started_at = self.timestamp(&format!("{field}.startedAt"), &raw.started_at);
        let ended_at = self.timestamp(&format!("{field}.endedAt"), &raw.ended_at);
        Some(WorkerResult {
            name: raw.name,
            success: raw.success,
            state: state?,
            data: raw.data,
            error: raw.error,
            duration_ms: raw.duration_ms,
            attempts: raw.attempts,
            started_at: started_at?,
            ended_at: ended_at?,
            logs: raw.logs,
            screenshots: raw.screenshots,
        })
    }

    fn error(&mut self, index: usize, raw: SerializedError) -> Option<CoordinatorError> {
        let field = format!("errors[{index}]");
        let severity = self.parse::<ErrorSeverity>(&format!("{field}.severity"), &raw.severity);
        let timestamp = self.timestamp(&format!("{field}.timestamp"), &raw.timestamp);
        Some(CoordinatorError {
            code: raw.code,
            message: raw.message,
            severity: severity?,
            source: raw.source,
            recovery_attempted: raw.recovery_attempted,
            recovery_successful: raw.recovery_successful,
            timestamp: timestamp?,
            context: raw.context,
        })
    }
}
