//! 推理内核错误类型
//!
//! 只有规划类错误会从 `ReasoningEngine::run` 以 `Err` 形式传出；技能层失败一律以
//! `SkillResult` + `FailureKind` 的形式留在结果内部。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 运行级错误（会中止一次推理）
#[derive(Error, Debug)]
pub enum AgentError {
    /// Planner 调用失败或输出无法解析；step 为出错的步骤号（1 起）
    #[error("Planning failed at step {step}: {reason}")]
    PlanningError { step: usize, reason: String },

    #[error("Planner timed out at step {step} after {secs}s")]
    PlannerTimeout { step: usize, secs: u64 },

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl AgentError {
    /// 出错的步骤号（仅规划类错误有）
    pub fn step(&self) -> Option<usize> {
        match self {
            AgentError::PlanningError { step, .. } | AgentError::PlannerTimeout { step, .. } => {
                Some(*step)
            }
            _ => None,
        }
    }
}

/// 单次技能调用的失败分类，附在 `SkillResult` 上供调用方区分
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    TrustDenied,
    Validation,
    SandboxViolation,
    PolicyDenied,
    /// 不是失败：调用已进入审批队列
    ApprovalRequired { approval_id: String },
    Runtime,
    Timeout,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NotFound => "not_found",
            FailureKind::TrustDenied => "trust_denied",
            FailureKind::Validation => "validation",
            FailureKind::SandboxViolation => "sandbox_violation",
            FailureKind::PolicyDenied => "policy_denied",
            FailureKind::ApprovalRequired { .. } => "approval_required",
            FailureKind::Runtime => "runtime",
            FailureKind::Timeout => "timeout",
        }
    }

    /// 是否需要安全审计（越权、策略、沙箱）
    pub fn is_security(&self) -> bool {
        matches!(
            self,
            FailureKind::TrustDenied | FailureKind::PolicyDenied | FailureKind::SandboxViolation
        )
    }
}
