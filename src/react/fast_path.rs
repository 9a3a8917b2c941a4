//! 快捷路径：目标命中已知的简单意图时跳过规划，直接执行对应技能

use regex::{Regex, RegexBuilder};

use crate::skills::SkillInputs;

/// 一条意图：正则（不区分大小写）-> 技能与固定参数
#[derive(Debug, Clone)]
pub struct VerbatimIntent {
    pattern: Regex,
    pub skill: String,
    pub args: SkillInputs,
    /// 作为回答原样返回的输出字段；未设置时取整个输出
    pub output: Option<String>,
}

impl VerbatimIntent {
    pub fn new(pattern: &str, skill: impl Into<String>, args: SkillInputs) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: RegexBuilder::new(pattern).case_insensitive(true).build()?,
            skill: skill.into(),
            args,
            output: None,
        })
    }

    pub fn returning(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn matches(&self, goal: &str) -> bool {
        self.pattern.is_match(goal.trim())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FastPath {
    intents: Vec<VerbatimIntent>,
}

impl FastPath {
    pub fn new(intents: Vec<VerbatimIntent>) -> Self {
        Self { intents }
    }

    /// 内置意图：「list my tasks」之类 -> task_list
    pub fn builtin() -> Self {
        let intents = [(
            r"^(please\s+)?(list|show)(\s+me)?\s+my\s+(open\s+)?tasks\s*[.!?]?$",
            "task_list",
            "summary",
        )]
        .iter()
        .filter_map(|(pat, skill, output)| match VerbatimIntent::new(pat, *skill, SkillInputs::new()) {
            Ok(i) => Some(i.returning(*output)),
            Err(e) => {
                tracing::error!(error = %e, "invalid fast path pattern");
                None
            }
        })
        .collect();
        Self { intents }
    }

    pub fn with_intent(mut self, intent: VerbatimIntent) -> Self {
        self.intents.push(intent);
        self
    }

    pub fn find(&self, goal: &str) -> Option<&VerbatimIntent> {
        self.intents.iter().find(|i| i.matches(goal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_matches_task_listing() {
        let fp = FastPath::builtin();
        let intent = fp.find("list my tasks").unwrap();
        assert_eq!(intent.skill, "task_list");
        assert_eq!(intent.output.as_deref(), Some("summary"));
        assert!(fp.find("  Show me my open tasks! ").is_some());
        assert!(fp.find("list my tasks and then delete them").is_none());
        assert!(fp.find("what's the weather").is_none());
    }

    #[test]
    fn test_custom_intent() {
        let fp = FastPath::default().with_intent(
            VerbatimIntent::new(r"^read notes$", "fs_read", SkillInputs::new()).unwrap(),
        );
        assert!(fp.find("READ NOTES").is_some());
        assert!(VerbatimIntent::new("(", "x", SkillInputs::new()).is_err());
    }
}
