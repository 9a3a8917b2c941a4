//! 技能失败分类
//!
//! 按顺序匹配错误特征（正则），给出类别与可执行建议，拼到 Observation 里让 Planner 换个做法。
//! `FailureKind` 已知时优先于文本匹配。

use regex::Regex;
use serde::Serialize;

use crate::core::FailureKind;

/// 失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    FileNotFound,
    PermissionDenied,
    InvalidInput,
    Timeout,
    Network,
    TrustDenied,
    ApprovalPending,
    PolicyDenied,
    /// 技能 id 未注册
    UnknownSkill,
    Unknown,
}

/// 分类结果
#[derive(Debug, Clone, Serialize)]
pub struct ErrorClassification {
    pub category: ErrorCategory,
    pub suggestions: Vec<String>,
}

struct Rule {
    category: ErrorCategory,
    pattern: Regex,
}

/// 规则式错误分类器
pub struct ErrorClassifier {
    rules: Vec<Rule>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

const RULES: &[(ErrorCategory, &str)] = &[
    (
        ErrorCategory::FileNotFound,
        r"(?i)(no such file|not found|enoent|does not exist|cannot find)",
    ),
    (
        ErrorCategory::PermissionDenied,
        r"(?i)(permission denied|eacces|eperm|access denied|outside (the )?(sandbox|allowed)|not in allowlist|forbidden)",
    ),
    (
        ErrorCategory::Timeout,
        r"(?i)(timed out|timeout|deadline)",
    ),
    (
        ErrorCategory::Network,
        r"(?i)(connection (refused|reset)|dns|network|unreachable|http \d{3}|status \d{3})",
    ),
    (
        ErrorCategory::InvalidInput,
        r"(?i)(missing required|invalid|expected type|must be|parse error)",
    ),
];

impl ErrorClassifier {
    pub fn new() -> Self {
        let rules = RULES
            .iter()
            .filter_map(|(category, pat)| match Regex::new(pat) {
                Ok(pattern) => Some(Rule {
                    category: *category,
                    pattern,
                }),
                Err(e) => {
                    tracing::error!(error = %e, "invalid classifier pattern");
                    None
                }
            })
            .collect();
        Self { rules }
    }

    /// 按失败类型与错误文本分类
    pub fn classify(&self, kind: Option<&FailureKind>, message: &str) -> ErrorClassification {
        let category = match kind {
            Some(FailureKind::TrustDenied) => ErrorCategory::TrustDenied,
            Some(FailureKind::PolicyDenied) => ErrorCategory::PolicyDenied,
            Some(FailureKind::SandboxViolation) => ErrorCategory::PermissionDenied,
            Some(FailureKind::ApprovalRequired { .. }) => ErrorCategory::ApprovalPending,
            Some(FailureKind::Timeout) => ErrorCategory::Timeout,
            Some(FailureKind::Validation) => ErrorCategory::InvalidInput,
            Some(FailureKind::NotFound) => ErrorCategory::UnknownSkill,
            _ => self
                .rules
                .iter()
                .find(|r| r.pattern.is_match(message))
                .map(|r| r.category)
                .unwrap_or(ErrorCategory::Unknown),
        };
        ErrorClassification {
            category,
            suggestions: suggestions_for(category),
        }
    }
}

fn suggestions_for(category: ErrorCategory) -> Vec<String> {
    let s: &[&str] = match category {
        ErrorCategory::FileNotFound => &[
            "List the parent directory with fs_list to find the correct path",
            "Check the spelling and extension of the file name",
        ],
        ErrorCategory::PermissionDenied => &[
            "Use a path inside the allowed workspace directories",
            "Choose a different skill that does not need this access",
        ],
        ErrorCategory::InvalidInput => &[
            "Re-check the skill's required inputs and their types",
        ],
        ErrorCategory::Timeout => &[
            "Retry with a smaller request or a narrower scope",
            "Try another source if the service is slow",
        ],
        ErrorCategory::Network => &[
            "Check that the URL is correct and on an allowed domain",
            "Try a different source",
        ],
        ErrorCategory::TrustDenied => &[
            "This skill needs a higher trust level; pick a read-only alternative or answer directly",
        ],
        ErrorCategory::ApprovalPending => &[
            "The action is waiting for human approval; tell the user and continue with other steps",
        ],
        ErrorCategory::PolicyDenied => &[
            "The current mode does not allow this write; answer without modifying stored data",
        ],
        ErrorCategory::UnknownSkill => &[
            "Pick a skill from the available skills list",
        ],
        ErrorCategory::Unknown => &["Try a different approach or respond with what you know"],
    };
    s.iter().map(|x| x.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_missing_file() {
        let c = ErrorClassifier::new();
        let r = c.classify(None, "Read failed: No such file or directory (os error 2)");
        assert_eq!(r.category, ErrorCategory::FileNotFound);
        assert!(r.suggestions.iter().any(|s| s.contains("fs_list")));
    }

    #[test]
    fn test_classify_permission() {
        let c = ErrorClassifier::new();
        let r = c.classify(None, "Permission denied (os error 13)");
        assert_eq!(r.category, ErrorCategory::PermissionDenied);
    }

    #[test]
    fn test_classify_timeout_by_text() {
        let c = ErrorClassifier::new();
        let r = c.classify(Some(&FailureKind::Runtime), "request timed out");
        assert_eq!(r.category, ErrorCategory::Timeout);
    }

    #[test]
    fn test_kind_takes_precedence() {
        let c = ErrorClassifier::new();
        let r = c.classify(Some(&FailureKind::TrustDenied), "file not found");
        assert_eq!(r.category, ErrorCategory::TrustDenied);
    }

    #[test]
    fn test_unregistered_skill_is_not_a_missing_file() {
        let c = ErrorClassifier::new();
        let r = c.classify(Some(&FailureKind::NotFound), "Skill not found: search_web");
        assert_eq!(r.category, ErrorCategory::UnknownSkill);
        assert!(r.suggestions.iter().all(|s| !s.contains("fs_list")));
        assert!(r.suggestions[0].contains("available skills"));
    }

    #[test]
    fn test_unknown() {
        let c = ErrorClassifier::new();
        let r = c.classify(None, "something odd happened");
        assert_eq!(r.category, ErrorCategory::Unknown);
        assert!(!r.suggestions.is_empty());
    }
}
