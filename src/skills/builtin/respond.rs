//! conversational_response：用语言模型把推理结果整理成给用户的最终回答

use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message};
use crate::skills::{
    CostTier, ParamType, SkillBinding, SkillCategory, SkillDescriptor, SkillInputs, SkillResult,
    TrustLevel,
};

pub const CONVERSATIONAL_RESPONSE: &str = "conversational_response";

const COMPOSE_PROMPT: &str = "You write the final reply to the user. Answer the goal using only \
the observations provided. Be concise and do not mention tools, steps or internal reasoning.";

pub fn conversational_response_descriptor() -> SkillDescriptor {
    SkillDescriptor::new(CONVERSATIONAL_RESPONSE, SkillCategory::AgentControl)
        .with_name("Compose answer")
        .with_description("Compose the final natural-language answer for the user.")
        .input("goal", ParamType::String, true, "The user's goal")
        .input("thought", ParamType::String, false, "Latest planner thought")
        .input("observations", ParamType::Array, false, "Observation texts gathered so far")
        .input("style", ParamType::String, false, "default | summary")
        .output("response", ParamType::String)
        .with_cost(CostTier::Expensive)
        .with_min_trust(TrustLevel::Observe)
}

pub struct ConversationalResponseSkill {
    llm: Arc<dyn LlmClient>,
}

impl ConversationalResponseSkill {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

fn build_request(inputs: &SkillInputs) -> String {
    let goal = inputs.get("goal").and_then(|v| v.as_str()).unwrap_or("");
    let mut out = format!("Goal: {}\n", goal);
    if let Some(thought) = inputs.get("thought").and_then(|v| v.as_str()) {
        out.push_str(&format!("Latest thought: {}\n", thought));
    }
    if let Some(obs) = inputs.get("observations").and_then(|v| v.as_array()) {
        if !obs.is_empty() {
            out.push_str("\nObservations:\n");
            for (i, o) in obs.iter().enumerate() {
                let text = o.as_str().map(str::to_string).unwrap_or_else(|| o.to_string());
                out.push_str(&format!("[{}] {}\n", i + 1, text));
            }
        }
    }
    if inputs.get("style").and_then(|v| v.as_str()) == Some("summary") {
        out.push_str("\nReply with a short summary.");
    }
    out
}

#[async_trait]
impl SkillBinding for ConversationalResponseSkill {
    async fn invoke(&self, inputs: SkillInputs) -> SkillResult {
        let messages = [Message::system(COMPOSE_PROMPT), Message::user(build_request(&inputs))];
        match self.llm.complete(&messages).await {
            Ok(text) if !text.trim().is_empty() => SkillResult::ok_with("response", text.trim()),
            Ok(_) => SkillResult::failure("Language model returned an empty answer"),
            Err(e) => SkillResult::failure(format!("Compose answer failed: {}", e)),
        }
    }
}
