//! 失败循环检测：拦截重复的无效动作
//!
//! 把拟执行的动作与最近 window 条带动作的记录比较。同技能同参数算一次重复；
//! 同技能、失败信息与该技能最近一次失败信息相同，也算一次重复。重复次数达到 threshold 即判定为循环。

use serde::Serialize;

use crate::core::ErrorCategory;
use crate::react::scratchpad::{PlannedAction, ScratchpadEntry};

#[derive(Debug, Clone, Serialize)]
pub struct LoopCheck {
    pub is_loop: bool,
    pub repetitions: usize,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct FailureLoopDetector {
    window: usize,
    threshold: usize,
}

impl Default for FailureLoopDetector {
    fn default() -> Self {
        Self::new(6, 3)
    }
}

impl FailureLoopDetector {
    pub fn new(window: usize, threshold: usize) -> Self {
        Self {
            window: window.max(1),
            threshold: threshold.max(1),
        }
    }

    pub fn detect(&self, recent: &[ScratchpadEntry], proposed: &PlannedAction) -> LoopCheck {
        let tail: Vec<&ScratchpadEntry> = recent
            .iter()
            .rev()
            .filter(|e| e.action.is_some())
            .take(self.window)
            .collect();

        let last_failure = tail
            .iter()
            .filter(|e| e.action.as_ref().is_some_and(|a| a.skill == proposed.skill))
            .find_map(|e| e.error_message());

        let repetitions = tail
            .iter()
            .filter(|e| {
                let Some(action) = &e.action else {
                    return false;
                };
                if action.skill != proposed.skill {
                    return false;
                }
                action.args == proposed.args
                    || (e.failed() && last_failure.is_some() && e.error_message() == last_failure)
            })
            .count();

        let is_loop = repetitions >= self.threshold;
        let suggestion = is_loop.then(|| {
            let category = tail
                .iter()
                .filter(|e| e.action.as_ref().is_some_and(|a| a.skill == proposed.skill))
                .find_map(|e| e.observation.as_ref().and_then(|o| o.error.as_ref()))
                .map(|err| err.category);
            suggestion_for(&proposed.skill, repetitions, category)
        });
        if is_loop {
            tracing::warn!(skill = %proposed.skill, repetitions, "failure loop detected");
        }
        LoopCheck {
            is_loop,
            repetitions,
            suggestion,
        }
    }
}

fn suggestion_for(skill: &str, repetitions: usize, category: Option<ErrorCategory>) -> String {
    let hint = match category {
        Some(ErrorCategory::FileNotFound) => "the path does not exist; list the directory first",
        Some(ErrorCategory::PermissionDenied) => "the target is outside the allowed area",
        Some(ErrorCategory::InvalidInput) => "the arguments are invalid; fix them before retrying",
        Some(ErrorCategory::Timeout) | Some(ErrorCategory::Network) => {
            "the service keeps failing; use another source"
        }
        Some(ErrorCategory::TrustDenied) | Some(ErrorCategory::PolicyDenied) => {
            "this action is not permitted; do not retry it"
        }
        Some(ErrorCategory::UnknownSkill) => "no such skill is registered",
        _ => "repeating it will not change the result",
    };
    format!(
        "'{}' was attempted {} times with the same outcome: {}. Choose a different action or respond.",
        skill, repetitions, hint
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::react::scratchpad::{Observation, ObservationError};
    use serde_json::json;

    fn action(skill: &str, args: serde_json::Value) -> PlannedAction {
        PlannedAction {
            skill: skill.into(),
            args: args.as_object().cloned().unwrap_or_default(),
        }
    }

    fn entry(step: usize, a: PlannedAction, error: Option<&str>) -> ScratchpadEntry {
        let mut e = ScratchpadEntry::new(step, "t");
        e.action = Some(a);
        e.observation = Some(Observation {
            text: error.unwrap_or("ok").to_string(),
            success: error.is_none(),
            error: error.map(|m| ObservationError {
                message: m.to_string(),
                category: ErrorCategory::FileNotFound,
                suggestions: vec![],
            }),
            content: String::new(),
            loop_detected: false,
        });
        e
    }

    #[test]
    fn test_identical_actions_form_loop() {
        let d = FailureLoopDetector::new(6, 3);
        let a = action("fs_read", json!({"filePath": "x"}));
        let history: Vec<_> = (1..=3).map(|i| entry(i, a.clone(), Some("not found"))).collect();
        let check = d.detect(&history[..2], &a);
        assert!(!check.is_loop);
        assert_eq!(check.repetitions, 2);
        let check = d.detect(&history, &a);
        assert!(check.is_loop);
        assert!(check.suggestion.unwrap().contains("list the directory"));
    }

    #[test]
    fn test_failure_identical_with_different_args() {
        let d = FailureLoopDetector::new(6, 2);
        let history = vec![
            entry(1, action("web_fetch", json!({"url": "a"})), Some("domain blocked")),
            entry(2, action("web_fetch", json!({"url": "b"})), Some("domain blocked")),
        ];
        let check = d.detect(&history, &action("web_fetch", json!({"url": "c"})));
        assert!(check.is_loop);
        assert_eq!(check.repetitions, 2);
    }

    #[test]
    fn test_successful_distinct_actions_are_not_a_loop() {
        let d = FailureLoopDetector::new(6, 2);
        let history = vec![
            entry(1, action("fs_read", json!({"filePath": "a"})), None),
            entry(2, action("fs_read", json!({"filePath": "b"})), None),
        ];
        let check = d.detect(&history, &action("fs_read", json!({"filePath": "c"})));
        assert!(!check.is_loop);
        assert_eq!(check.repetitions, 0);
    }

    #[test]
    fn test_window_limits_history() {
        let d = FailureLoopDetector::new(2, 3);
        let a = action("fs_read", json!({"filePath": "x"}));
        let history: Vec<_> = (1..=5).map(|i| entry(i, a.clone(), None)).collect();
        assert_eq!(d.detect(&history, &a).repetitions, 2);
    }
}
