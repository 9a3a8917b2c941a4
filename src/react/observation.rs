//! 把 SkillResult 渲染成交给 Planner 的观察文本
//!
//! narrative：句子 + `key: value` 行；structured：{skill, success, outputs, error} 的 pretty JSON；
//! verbatim：唯一的字符串输出原样返回，否则输出的紧凑 JSON。超长时截断并附标记。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::skills::SkillResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationMode {
    #[default]
    Narrative,
    Structured,
    Verbatim,
}

pub const TRUNCATION_MARKER: &str = "...[truncated]";

#[derive(Debug, Clone, Copy)]
pub struct ObservationFormatter {
    mode: ObservationMode,
    max_chars: usize,
}

impl ObservationFormatter {
    pub fn new(mode: ObservationMode, max_chars: usize) -> Self {
        Self { mode, max_chars }
    }

    /// 原始内容：唯一字符串输出原样；否则紧凑 JSON；失败时为错误信息
    pub fn content(result: &SkillResult) -> String {
        if !result.success {
            return result.error.clone().unwrap_or_default();
        }
        let mut strings = result.outputs.values().filter_map(Value::as_str);
        match (result.outputs.len(), strings.next()) {
            (1, Some(s)) => s.to_string(),
            (0, _) => String::new(),
            _ => Value::Object(result.outputs.clone()).to_string(),
        }
    }

    pub fn format(&self, skill_id: &str, result: &SkillResult) -> String {
        let text = match self.mode {
            ObservationMode::Narrative => narrative(skill_id, result),
            ObservationMode::Structured => {
                let v = json!({
                    "skill": skill_id,
                    "success": result.success,
                    "outputs": result.outputs,
                    "error": result.error,
                });
                serde_json::to_string_pretty(&v).unwrap_or_else(|_| v.to_string())
            }
            ObservationMode::Verbatim => Self::content(result),
        };
        self.truncate(text)
    }

    pub fn truncate(&self, text: String) -> String {
        if self.max_chars == 0 || text.chars().count() <= self.max_chars {
            return text;
        }
        let head: String = text.chars().take(self.max_chars).collect();
        format!("{}{}", head, TRUNCATION_MARKER)
    }
}

fn narrative(skill_id: &str, result: &SkillResult) -> String {
    if !result.success {
        return format!(
            "The skill '{}' failed: {}",
            skill_id,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    if result.outputs.is_empty() {
        return format!("The skill '{}' completed with no output.", skill_id);
    }
    let mut out = format!("The skill '{}' returned:", skill_id);
    for (k, v) in &result.outputs {
        let value = match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out.push_str(&format!("\n{}: {}", k, value));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbatim_single_string() {
        let f = ObservationFormatter::new(ObservationMode::Verbatim, 100);
        let r = SkillResult::ok_with("content", "hi");
        assert_eq!(f.format("fs_read", &r), "hi");
        assert_eq!(ObservationFormatter::content(&r), "hi");
    }

    #[test]
    fn test_narrative_lines() {
        let f = ObservationFormatter::new(ObservationMode::Narrative, 1000);
        let r = SkillResult::ok_with("content", "hi");
        let text = f.format("fs_read", &r);
        assert!(text.starts_with("The skill 'fs_read' returned:"));
        assert!(text.contains("content: hi"));
        let failed = SkillResult::failure("disk on fire");
        assert!(f.format("fs_read", &failed).contains("failed: disk on fire"));
    }

    #[test]
    fn test_structured_json() {
        let f = ObservationFormatter::new(ObservationMode::Structured, 1000);
        let text = f.format("task_list", &SkillResult::ok_with("summary", "none"));
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["skill"], "task_list");
        assert_eq!(v["outputs"]["summary"], "none");
    }

    #[test]
    fn test_truncation_marker() {
        let f = ObservationFormatter::new(ObservationMode::Verbatim, 5);
        let text = f.format("fs_read", &SkillResult::ok_with("content", "abcdefghij"));
        assert_eq!(text, format!("abcde{}", TRUNCATION_MARKER));
    }
}
