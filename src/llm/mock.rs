//! 测试用 LLM 客户端（无需 API）
//!
//! MockLlmClient：对 Planner 请求直接给出 respond 计划，对其它请求回显最后一条 User 消息；
//! ScriptedLlmClient：按顺序返回预设回复，用完后重复最后一条，并记录调用次数与收到的消息。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message, Role};

fn last_user(messages: &[Message]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("(no input)")
}

#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let is_planning = messages
            .iter()
            .any(|m| m.role == Role::System && m.content.contains("\"respond\""));
        let input = last_user(messages);
        if is_planning {
            let plan = serde_json::json!({
                "thought": format!("Mock planner answering directly: {}", input.lines().next().unwrap_or("")),
                "respond": true,
                "responseStyle": "default",
            });
            Ok(plan.to_string())
        } else {
            Ok(format!("Echo from Mock: {}", input))
        }
    }
}

/// 脚本化客户端：每次调用弹出下一条回复
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    last: Mutex<Option<Result<String, String>>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|s| Ok(s.into())).collect()),
            ..Self::default()
        }
    }

    /// 追加一条失败回复
    pub fn then_fail(self, error: impl Into<String>) -> Self {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(error.into()));
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 第 n 次调用收到的消息
    pub fn request(&self, n: usize) -> Option<Vec<Message>> {
        self.seen.lock().ok().and_then(|s| s.get(n).cloned())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(messages.to_vec());
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        let mut last = self
            .last
            .lock()
            .map_err(|_| "scripted client lock poisoned".to_string())?;
        match next {
            Some(reply) => {
                *last = Some(reply.clone());
                reply
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err("scripted client has no replies".to_string())),
        }
    }
}
