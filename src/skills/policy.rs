//! 执行策略与输出过滤
//!
//! ExecutionPolicy 按模式/角色拦截受保护写入（与信任等级无关）；
//! OutputFilter 在技能返回后按角色做字段脱敏。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::skills::SkillInputs;

/// 单次调用的策略：角色 + 是否允许写受保护命名空间
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    pub role: String,
    #[serde(default = "default_allow_protected_writes")]
    pub allow_protected_writes: bool,
}

fn default_allow_protected_writes() -> bool {
    true
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            role: "owner".to_string(),
            allow_protected_writes: true,
        }
    }
}

impl ExecutionPolicy {
    pub fn for_role(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            ..Self::default()
        }
    }

    /// 只读模式（如 emulation / guest）：拒绝受保护写入
    pub fn read_only(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            allow_protected_writes: false,
        }
    }
}

/// 输出过滤（调用后、返回前执行）
pub trait OutputFilter: Send + Sync {
    fn filter(&self, skill_id: &str, role: &str, outputs: &mut SkillInputs);
}

/// 对非特权角色把指定字段替换为 `[redacted]`
#[derive(Debug, Clone)]
pub struct RedactingFilter {
    fields: HashSet<String>,
    privileged_roles: HashSet<String>,
}

pub const REDACTED: &str = "[redacted]";

impl RedactingFilter {
    pub fn new(fields: Vec<String>, privileged_roles: Vec<String>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
            privileged_roles: privileged_roles.into_iter().collect(),
        }
    }
}

impl OutputFilter for RedactingFilter {
    fn filter(&self, skill_id: &str, role: &str, outputs: &mut SkillInputs) {
        if self.privileged_roles.contains(role) {
            return;
        }
        let mut redacted = 0usize;
        for (key, value) in outputs.iter_mut() {
            if self.fields.contains(key) {
                *value = serde_json::Value::String(REDACTED.to_string());
                redacted += 1;
            }
        }
        if redacted > 0 {
            tracing::debug!(skill = %skill_id, role = %role, redacted, "outputs redacted");
        }
    }
}
