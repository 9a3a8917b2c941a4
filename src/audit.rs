//! 审计事件
//!
//! 只追加、内核从不读取。默认实现把事件序列化成 JSON 写进 tracing（字段名 `audit`），
//! 也可写入 JSONL 文件或留在内存里（测试用）。

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    /// 技能调用
    Action,
    /// 越权、策略、沙箱拒绝
    Security,
    /// 审批队列
    Approval,
}

/// 结构化审计事件
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub level: AuditLevel,
    pub category: AuditCategory,
    pub event: String,
    pub actor: String,
    pub details: Value,
    /// 毫秒时间戳
    pub timestamp: i64,
}

impl AuditEvent {
    pub fn new(
        level: AuditLevel,
        category: AuditCategory,
        event: impl Into<String>,
        actor: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            level,
            category,
            event: event.into(),
            actor: actor.into(),
            details,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// 审计出口
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// 写入 tracing 日志
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let audit = serde_json::to_string(&event).unwrap_or_default();
        match event.level {
            AuditLevel::Info => tracing::info!(audit = %audit, "audit"),
            AuditLevel::Warn => tracing::warn!(audit = %audit, "audit"),
            AuditLevel::Error => tracing::error!(audit = %audit, "audit"),
        }
    }
}

/// 追加写入 JSONL 文件（每行一个事件）
pub struct JsonlAuditSink {
    file: Mutex<File>,
}

impl JsonlAuditSink {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, event: AuditEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize audit event");
                return;
            }
        };
        match self.file.lock() {
            Ok(mut f) => {
                if let Err(e) = writeln!(f, "{}", line) {
                    tracing::error!(error = %e, "failed to write audit event");
                }
            }
            Err(_) => tracing::error!("audit file lock poisoned"),
        }
    }
}

/// 内存审计（测试与嵌入式调用方检查用）
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.event == event)
            .count()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// 同时写多个出口
pub struct FanoutAuditSink {
    sinks: Vec<std::sync::Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for FanoutAuditSink {
    fn record(&self, event: AuditEvent) {
        for sink in &self.sinks {
            sink.record(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_jsonl_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit/events.jsonl");
        let sink = JsonlAuditSink::open(&path).unwrap();
        sink.record(AuditEvent::new(
            AuditLevel::Info,
            AuditCategory::Action,
            "skill_executed",
            "alice",
            json!({"skill": "fs_read"}),
        ));
        sink.record(AuditEvent::new(
            AuditLevel::Warn,
            AuditCategory::Security,
            "trust_denied",
            "alice",
            json!({}),
        ));
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "skill_executed");
        assert_eq!(first["category"], "action");
    }

    #[test]
    fn test_fanout() {
        let a = std::sync::Arc::new(MemoryAuditSink::new());
        let b = std::sync::Arc::new(MemoryAuditSink::new());
        let fan = FanoutAuditSink::new(vec![a.clone(), b.clone()]);
        fan.record(AuditEvent::new(
            AuditLevel::Info,
            AuditCategory::Approval,
            "approval_enqueued",
            "system",
            json!({}),
        ));
        assert_eq!(a.count("approval_enqueued"), 1);
        assert_eq!(b.count("approval_enqueued"), 1);
    }
}
