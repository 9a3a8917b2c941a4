//! LLM 客户端抽象
//!
//! 内核只依赖「消息进、文本出」这一契约；JSON 由调用方（Planner）从文本中提取解析。

use async_trait::async_trait;

use crate::llm::Message;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;
}
