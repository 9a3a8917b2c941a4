//! 推理输入（ReasoningContext）与输出（ReasoningResult）

use serde::Serialize;

use crate::llm::Message;
use crate::react::scratchpad::ScratchpadEntry;
use crate::skills::{ExecutionPolicy, TrustLevel};

#[derive(Debug, Clone, Default)]
pub struct ReasoningContext {
    /// 检索到的相关记忆
    pub memories: Vec<String>,
    pub history: Vec<Message>,
    /// 预先拼好的上下文包（自由文本）
    pub context_package: Option<String>,
    pub user_id: String,
    /// 认知模式标签（如 "focused"、"casual"），拼入 prompt
    pub cognitive_mode: Option<String>,
    /// 输出过滤按此角色脱敏
    pub role: Option<String>,
    pub policy: Option<ExecutionPolicy>,
}

impl ReasoningContext {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// 执行时实际使用的策略：显式策略优先，否则按角色构造
    pub fn effective_policy(&self) -> Option<ExecutionPolicy> {
        match (&self.policy, &self.role) {
            (Some(p), _) => Some(p.clone()),
            (None, Some(role)) => Some(ExecutionPolicy::for_role(role.clone())),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultMetadata {
    pub steps_executed: usize,
    pub fast_path_used: bool,
    pub verbatim_short_circuit: bool,
    pub duration_ms: u64,
    pub llm_calls: usize,
    pub errors: usize,
    pub cancelled: bool,
    pub max_steps_reached: bool,
    pub trust_level: TrustLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReasoningResult {
    pub goal: String,
    pub final_text: String,
    pub scratchpad: Vec<ScratchpadEntry>,
    pub metadata: ResultMetadata,
}
