//! Scratchpad：单次推理的有序步骤日志（只追加）

use serde::{Deserialize, Serialize};

use crate::core::ErrorCategory;
use crate::skills::SkillInputs;

/// 计划执行的技能调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub skill: String,
    #[serde(default)]
    pub args: SkillInputs,
}

/// 失败观察附带的结构化错误
#[derive(Debug, Clone, Serialize)]
pub struct ObservationError {
    pub message: String,
    pub category: ErrorCategory,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    /// 格式化后交给 Planner 的文本
    pub text: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ObservationError>,
    /// 原始内容（verbatim 渲染，strict 模式直接返回它）
    pub content: String,
    /// 由失败循环检测拦截（技能未被调用）
    pub loop_detected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScratchpadEntry {
    pub step: usize,
    pub thought: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<PlannedAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<Observation>,
    pub timestamp: i64,
}

impl ScratchpadEntry {
    pub fn new(step: usize, thought: impl Into<String>) -> Self {
        Self {
            step,
            thought: thought.into(),
            action: None,
            observation: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn failed(&self) -> bool {
        self.observation.as_ref().is_some_and(|o| !o.success)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.observation
            .as_ref()
            .and_then(|o| o.error.as_ref())
            .map(|e| e.message.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Scratchpad {
    entries: Vec<ScratchpadEntry>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: ScratchpadEntry) {
        self.entries.push(entry);
    }

    /// 给最近一条记录补上观察
    pub fn observe_last(&mut self, observation: Observation) {
        if let Some(last) = self.entries.last_mut() {
            last.observation = Some(observation);
        }
    }

    pub fn entries(&self) -> &[ScratchpadEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ScratchpadEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&ScratchpadEntry> {
        self.entries.last()
    }

    /// 最近一次成功观察
    pub fn last_success(&self) -> Option<&Observation> {
        self.entries
            .iter()
            .rev()
            .filter_map(|e| e.observation.as_ref())
            .find(|o| o.success)
    }

    pub fn last_thought(&self) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .map(|e| e.thought.as_str())
            .find(|t| !t.trim().is_empty())
    }

    /// 所有观察文本（按顺序）
    pub fn observation_texts(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|e| e.observation.as_ref())
            .map(|o| o.text.clone())
            .collect()
    }

    /// 渲染为 Planner prompt 中的一段
    pub fn render(&self) -> String {
        if self.entries.is_empty() {
            return "(no steps yet)".to_string();
        }
        let mut out = String::new();
        for e in &self.entries {
            out.push_str(&format!("Step {}\nThought: {}\n", e.step, e.thought));
            if let Some(a) = &e.action {
                let args = serde_json::Value::Object(a.args.clone());
                out.push_str(&format!("Action: {} {}\n", a.skill, args));
            }
            if let Some(o) = &e.observation {
                out.push_str(&format!("Observation: {}\n", o.text));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(success: bool, content: &str) -> Observation {
        Observation {
            text: content.to_string(),
            success,
            error: None,
            content: content.to_string(),
            loop_detected: false,
        }
    }

    #[test]
    fn test_last_success_and_thought() {
        let mut pad = Scratchpad::new();
        pad.append(ScratchpadEntry::new(1, "read the file"));
        pad.observe_last(obs(true, "hi"));
        pad.append(ScratchpadEntry::new(2, "try again"));
        pad.observe_last(obs(false, "boom"));
        pad.append(ScratchpadEntry::new(3, ""));

        assert_eq!(pad.len(), 3);
        assert_eq!(pad.last_success().unwrap().content, "hi");
        assert_eq!(pad.last_thought(), Some("try again"));
        assert!(pad.entries()[1].failed());
        assert_eq!(pad.observation_texts(), vec!["hi", "boom"]);
    }

    #[test]
    fn test_render() {
        let mut pad = Scratchpad::new();
        assert_eq!(pad.render(), "(no steps yet)");
        let mut e = ScratchpadEntry::new(1, "look");
        e.action = Some(PlannedAction {
            skill: "fs_list".into(),
            args: SkillInputs::new(),
        });
        pad.append(e);
        pad.observe_last(obs(true, "a.txt"));
        let text = pad.render();
        assert!(text.contains("Action: fs_list {}"));
        assert!(text.contains("Observation: a.txt"));
    }
}
