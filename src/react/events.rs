//! 推理进度事件：思考、动作、观察、完成、错误
//!
//! 事件经有界 mpsc 通道发出，`try_send` 不阻塞；缓冲区满时丢弃并告警，推理本身不受影响。

use serde::Serialize;
use tokio::sync::mpsc;

/// 单步进度事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// 快捷路径命中（跳过规划）
    FastPath { skill: String },
    /// Planner 的思考内容
    Thought { step: usize, text: String },
    /// 即将执行的技能调用
    Action {
        step: usize,
        skill: String,
        args: serde_json::Value,
    },
    /// 技能返回（预览，避免过长）
    Observation {
        step: usize,
        skill: String,
        success: bool,
        preview: String,
    },
    /// 最终回答
    Completion {
        text: String,
        steps: usize,
        max_steps_reached: bool,
    },
    Error { step: usize, text: String },
}

const PREVIEW_CHARS: usize = 200;

/// 截取观察文本的预览
pub fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        text.to_string()
    } else {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    }
}

/// 进度出口；无通道时所有事件直接丢弃
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// 新建有界通道，返回出口与接收端
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }

    pub fn none() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: ProgressEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(ev)) => {
                tracing::warn!(event = ?ev, "progress buffer full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("progress receiver closed");
            }
        }
    }
}

impl From<mpsc::Sender<ProgressEvent>> for ProgressSink {
    fn from(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self::new(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_buffer_drops_without_blocking() {
        let (sink, mut rx) = ProgressSink::channel(1);
        sink.emit(ProgressEvent::Thought {
            step: 1,
            text: "first".into(),
        });
        sink.emit(ProgressEvent::Thought {
            step: 2,
            text: "second".into(),
        });
        match rx.recv().await {
            Some(ProgressEvent::Thought { step, .. }) => assert_eq!(step, 1),
            other => panic!("unexpected {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let ev = ProgressEvent::Error {
            step: 2,
            text: "boom".into(),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "error");
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(500);
        assert_eq!(preview(&long).chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}
