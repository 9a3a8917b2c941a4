//! 审批队列数据类型

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::skills::{RiskTier, SkillDescriptor, SkillInputs, SkillResult};

/// 审批状态：pending 只能单向变为 approved / rejected 一次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// 人工决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn status(self) -> ApprovalStatus {
        match self {
            Decision::Approve => ApprovalStatus::Approved,
            Decision::Reject => ApprovalStatus::Rejected,
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "approve" | "approved" | "yes" => Ok(Decision::Approve),
            "reject" | "rejected" | "no" => Ok(Decision::Reject),
            other => Err(format!("Unknown decision: {}", other)),
        }
    }
}

/// 一条被延后执行、等待人工决定的技能调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalQueueItem {
    pub id: String,
    pub skill_id: String,
    pub skill_name: String,
    pub skill_description: String,
    pub inputs: SkillInputs,
    /// 提交时间（毫秒时间戳）
    pub submitted_at: i64,
    pub risk: RiskTier,
    pub status: ApprovalStatus,
    #[serde(default)]
    pub resolved_at: Option<i64>,
    #[serde(default)]
    pub resolved_by: Option<String>,
}

impl ApprovalQueueItem {
    pub fn new(skill_id: &str, inputs: SkillInputs, descriptor: &SkillDescriptor) -> Self {
        Self {
            id: format!("appr_{}", uuid::Uuid::new_v4()),
            skill_id: skill_id.to_string(),
            skill_name: descriptor.name.clone(),
            skill_description: descriptor.description.clone(),
            inputs,
            submitted_at: chrono::Utc::now().timestamp_millis(),
            risk: descriptor.risk,
            status: ApprovalStatus::Pending,
            resolved_at: None,
            resolved_by: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }
}

/// resolve 的结果：更新后的条目；仅 approve 时带技能执行结果
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    pub item: ApprovalQueueItem,
    pub result: Option<SkillResult>,
}

#[derive(Error, Debug)]
pub enum ApprovalError {
    #[error("Approval item not found: {0}")]
    NotFound(String),

    #[error("Approval item {id} already resolved ({status})")]
    AlreadyResolved { id: String, status: ApprovalStatus },

    #[error("Approval storage error: {0}")]
    Storage(String),
}
