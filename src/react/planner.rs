//! Planner：给出下一步的思考与动作，或结束信号
//!
//! 一次 LLM 调用（带超时）。prompt 由 system prompt、回复格式的 JSON Schema（schemars 生成）、
//! 可用技能、上下文（记忆/历史/上下文包）与 scratchpad 拼成。
//! parse_plan 从纯文本或 ```json 代码块中提取 JSON 对象；找不到可解析的 JSON 即为 PlanningError。

use std::sync::Arc;
use std::time::Duration;

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::llm::{LlmClient, Message};
use crate::react::context::ReasoningContext;
use crate::react::scratchpad::{PlannedAction, Scratchpad};
use crate::skills::{SkillDescriptor, SkillInputs};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Cortex, a careful assistant that solves the \
user's goal step by step. At each step think briefly, then either call exactly one skill or \
respond. Only call skills from the list below. Respond as soon as you have enough information.";

/// 最终回答的风格
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStyle {
    #[default]
    Default,
    /// 直接返回最后一次成功观察的内容
    Strict,
    Summary,
}

impl ResponseStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStyle::Default => "default",
            ResponseStyle::Strict => "strict",
            ResponseStyle::Summary => "summary",
        }
    }
}

/// 回复格式中的技能调用（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ActionFormat {
    /// 技能 id，必须来自可用技能列表
    skill: String,
    /// 技能参数，键为参数名
    args: std::collections::HashMap<String, serde_json::Value>,
}

/// Planner 的回复格式
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct PlanReply {
    /// 本步的简短推理
    #[serde(default)]
    thought: String,
    /// 要调用的技能；respond 为 true 时省略
    #[serde(default)]
    #[schemars(with = "Option<ActionFormat>")]
    action: Option<PlannedAction>,
    /// 为 true 表示信息已足够，结束并回答
    #[serde(default)]
    respond: Option<bool>,
    #[serde(default)]
    response_style: Option<ResponseStyle>,
}

/// 单步规划结果
#[derive(Debug, Clone)]
pub struct PlanStep {
    pub thought: String,
    pub action: Option<PlannedAction>,
    pub respond: bool,
    pub response_style: ResponseStyle,
}

/// 回复格式的 JSON Schema，拼入 system prompt
pub fn plan_schema_json() -> String {
    let schema = schema_for!(PlanReply);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 解析 Planner 输出；未给出 respond 时，没有动作即视为结束
pub fn parse_plan(output: &str, step: usize) -> Result<PlanStep, AgentError> {
    let json_str = extract_json(output).ok_or_else(|| AgentError::PlanningError {
        step,
        reason: format!("no JSON object in planner output: {}", output.trim()),
    })?;
    let reply: PlanReply =
        serde_json::from_str(json_str).map_err(|e| AgentError::PlanningError {
            step,
            reason: AgentError::JsonParseError(format!("{}: {}", e, json_str)).to_string(),
        })?;
    let action = reply.action.filter(|a| !a.skill.trim().is_empty());
    let respond = reply.respond.unwrap_or(action.is_none());
    Ok(PlanStep {
        thought: reply.thought,
        action,
        respond,
        response_style: reply.response_style.unwrap_or_default(),
    })
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    timeout: Duration,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>, timeout: Duration) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            timeout,
        }
    }

    fn build_system(&self, skills: &[Arc<SkillDescriptor>], identity: &str) -> String {
        let mut system = String::new();
        system.push_str(&self.system_prompt);
        if !identity.trim().is_empty() {
            system.push_str("\n\n");
            system.push_str(identity.trim());
        }
        system.push_str("\n\n## Available skills\n");
        if skills.is_empty() {
            system.push_str("(none; respond directly)\n");
        }
        for s in skills {
            system.push_str(&s.summary());
            system.push('\n');
        }
        system.push_str(
            "\n## Reply format\nReply with a single JSON object matching this schema and nothing else:\n",
        );
        system.push_str(&plan_schema_json());
        system
    }

    fn build_messages(
        &self,
        goal: &str,
        scratchpad: &Scratchpad,
        skills: &[Arc<SkillDescriptor>],
        context: &ReasoningContext,
        identity: &str,
    ) -> Vec<Message> {
        let mut messages = vec![Message::system(self.build_system(skills, identity))];
        messages.extend(context.history.iter().cloned());

        let mut user = String::new();
        if let Some(mode) = &context.cognitive_mode {
            user.push_str(&format!("Mode: {}\n", mode));
        }
        if !context.memories.is_empty() {
            user.push_str("Relevant memories:\n");
            for m in &context.memories {
                user.push_str(&format!("- {}\n", m));
            }
        }
        if let Some(package) = &context.context_package {
            user.push_str(&format!("Context:\n{}\n", package));
        }
        user.push_str(&format!("\nGoal: {}\n\nScratchpad:\n{}", goal, scratchpad.render()));
        messages.push(Message::user(user));
        messages
    }

    /// 规划第 step 步
    pub async fn plan(
        &self,
        step: usize,
        goal: &str,
        scratchpad: &Scratchpad,
        skills: &[Arc<SkillDescriptor>],
        context: &ReasoningContext,
        identity: &str,
    ) -> Result<PlanStep, AgentError> {
        let messages = self.build_messages(goal, scratchpad, skills, context, identity);
        let output = match tokio::time::timeout(self.timeout, self.llm.complete(&messages)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                return Err(AgentError::PlanningError {
                    step,
                    reason: AgentError::LlmError(e).to_string(),
                })
            }
            Err(_) => {
                return Err(AgentError::PlannerTimeout {
                    step,
                    secs: self.timeout.as_secs(),
                })
            }
        };
        tracing::debug!(step, output = %output, "planner output");
        parse_plan(&output, step)
    }
}

/// 把技能参数转成 JSON 值（事件与日志用）
pub fn args_value(args: &SkillInputs) -> serde_json::Value {
    serde_json::Value::Object(args.clone())
}
