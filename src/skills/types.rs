//! 技能描述与结果类型
//!
//! SkillDescriptor 在启动时注册一次，之后只读；SkillResult 是所有技能调用（含被拒绝的调用）的统一返回。

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::FailureKind;

/// 技能输入：参数名 -> JSON 值
pub type SkillInputs = Map<String, Value>;

/// 信任等级：observe < suggest < supervised_auto < bounded_auto
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Observe,
    Suggest,
    SupervisedAuto,
    BoundedAuto,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Observe => "observe",
            TrustLevel::Suggest => "suggest",
            TrustLevel::SupervisedAuto => "supervised_auto",
            TrustLevel::BoundedAuto => "bounded_auto",
        }
    }

    /// 调用方等级是否足以调用最低要求为 `required` 的技能
    pub fn permits(&self, required: TrustLevel) -> bool {
        required <= *self
    }
}

impl Default for TrustLevel {
    fn default() -> Self {
        TrustLevel::Observe
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrustLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "observe" => Ok(TrustLevel::Observe),
            "suggest" => Ok(TrustLevel::Suggest),
            "supervised_auto" => Ok(TrustLevel::SupervisedAuto),
            "bounded_auto" => Ok(TrustLevel::BoundedAuto),
            other => Err(format!("Unknown trust level: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillCategory {
    Filesystem,
    Memory,
    AgentControl,
    Shell,
    Network,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostTier {
    Free,
    Cheap,
    Expensive,
}

/// 参数语义类型（array 与 object 区分）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

impl ParamType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
            ParamType::Any => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
            ParamType::Any => "any",
        }
    }
}

/// 自定义参数校验：Err 为错误描述
pub type ParamValidator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// 输入参数声明
#[derive(Clone, Serialize)]
pub struct InputParam {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
    pub required: bool,
    pub description: String,
    #[serde(skip)]
    pub validator: Option<ParamValidator>,
}

impl fmt::Debug for InputParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputParam")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("required", &self.required)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/// 输出参数声明
#[derive(Debug, Clone, Serialize)]
pub struct OutputParam {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
}

/// 沙箱约束：路径前缀白名单与命令白名单；path_inputs / command_input 指明哪些输入需要检查
#[derive(Debug, Clone, Serialize)]
pub struct SandboxConstraints {
    pub allowed_paths: Vec<String>,
    pub allowed_commands: Vec<String>,
    pub path_inputs: Vec<String>,
    pub command_input: Option<String>,
}

impl SandboxConstraints {
    pub fn paths(allowed: Vec<String>, path_inputs: &[&str]) -> Self {
        Self {
            allowed_paths: allowed,
            allowed_commands: Vec::new(),
            path_inputs: path_inputs.iter().map(|s| s.to_string()).collect(),
            command_input: None,
        }
    }

    pub fn commands(allowed: Vec<String>, command_input: &str) -> Self {
        Self {
            allowed_paths: Vec::new(),
            allowed_commands: allowed,
            path_inputs: Vec::new(),
            command_input: Some(command_input.to_string()),
        }
    }
}

/// 技能描述（注册后不可变）
#[derive(Debug, Clone, Serialize)]
pub struct SkillDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: SkillCategory,
    pub inputs: Vec<InputParam>,
    pub outputs: Vec<OutputParam>,
    pub risk: RiskTier,
    pub cost: CostTier,
    pub min_trust_level: TrustLevel,
    pub requires_approval: bool,
    /// 写入受保护命名空间（由 ExecutionPolicy 决定是否允许）
    pub protected_write: bool,
    pub sandbox: Option<SandboxConstraints>,
}

impl SkillDescriptor {
    /// 最小描述：低风险、免费、observe 即可调用、无需审批
    pub fn new(id: impl Into<String>, category: SkillCategory) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            category,
            inputs: Vec::new(),
            outputs: Vec::new(),
            risk: RiskTier::Low,
            cost: CostTier::Free,
            min_trust_level: TrustLevel::Observe,
            requires_approval: false,
            protected_write: false,
            sandbox: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn input(mut self, name: &str, ty: ParamType, required: bool, description: &str) -> Self {
        self.inputs.push(InputParam {
            name: name.to_string(),
            ty,
            required,
            description: description.to_string(),
            validator: None,
        });
        self
    }

    /// 为最近声明的同名参数附加自定义校验
    pub fn validate_with(
        mut self,
        name: &str,
        f: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        if let Some(p) = self.inputs.iter_mut().rev().find(|p| p.name == name) {
            p.validator = Some(Arc::new(f));
        }
        self
    }

    pub fn output(mut self, name: &str, ty: ParamType) -> Self {
        self.outputs.push(OutputParam {
            name: name.to_string(),
            ty,
        });
        self
    }

    pub fn with_risk(mut self, risk: RiskTier) -> Self {
        self.risk = risk;
        self
    }

    pub fn with_cost(mut self, cost: CostTier) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_min_trust(mut self, level: TrustLevel) -> Self {
        self.min_trust_level = level;
        self
    }

    pub fn requiring_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    pub fn protected(mut self) -> Self {
        self.protected_write = true;
        self
    }

    pub fn with_sandbox(mut self, sandbox: SandboxConstraints) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// 供 Planner prompt 使用的一行摘要
    pub fn summary(&self) -> String {
        let params: Vec<String> = self
            .inputs
            .iter()
            .map(|p| {
                format!(
                    "{}: {}{}",
                    p.name,
                    p.ty.as_str(),
                    if p.required { "" } else { "?" }
                )
            })
            .collect();
        format!(
            "- {} ({}): {} Args: {{{}}}",
            self.id,
            self.name,
            self.description,
            params.join(", ")
        )
    }
}

/// 技能调用结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillResult {
    pub success: bool,
    #[serde(default)]
    pub outputs: SkillInputs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl SkillResult {
    pub fn ok(outputs: SkillInputs) -> Self {
        Self {
            success: true,
            outputs,
            error: None,
            failure: None,
        }
    }

    /// 单个输出字段的成功结果
    pub fn ok_with(name: &str, value: impl Into<Value>) -> Self {
        let mut outputs = Map::new();
        outputs.insert(name.to_string(), value.into());
        Self::ok(outputs)
    }

    /// 技能自身报告的失败（Runtime）
    pub fn failure(error: impl Into<String>) -> Self {
        Self::rejected(FailureKind::Runtime, error)
    }

    pub fn rejected(kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            outputs: Map::new(),
            error: Some(error.into()),
            failure: Some(kind),
        }
    }

    /// 失败时附带部分输出（诊断用）
    pub fn with_outputs(mut self, outputs: SkillInputs) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn output_str(&self, name: &str) -> Option<&str> {
        self.outputs.get(name).and_then(|v| v.as_str())
    }

    /// 审批队列 id（仅 ApprovalRequired 有）
    pub fn approval_id(&self) -> Option<&str> {
        match &self.failure {
            Some(FailureKind::ApprovalRequired { approval_id }) => Some(approval_id.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trust_ordering() {
        assert!(TrustLevel::Observe < TrustLevel::Suggest);
        assert!(TrustLevel::Suggest < TrustLevel::SupervisedAuto);
        assert!(TrustLevel::SupervisedAuto < TrustLevel::BoundedAuto);
        assert!(TrustLevel::BoundedAuto.permits(TrustLevel::Observe));
        assert!(!TrustLevel::Suggest.permits(TrustLevel::SupervisedAuto));
        assert_eq!("supervised-auto".parse::<TrustLevel>(), Ok(TrustLevel::SupervisedAuto));
        assert!("root".parse::<TrustLevel>().is_err());
    }

    #[test]
    fn test_param_type_distinguishes_array() {
        assert!(ParamType::Array.matches(&json!([1, 2])));
        assert!(!ParamType::Object.matches(&json!([1, 2])));
        assert!(ParamType::Object.matches(&json!({"a": 1})));
        assert!(ParamType::Any.matches(&Value::Null));
    }

    #[test]
    fn test_descriptor_builder() {
        let d = SkillDescriptor::new("fs_read", SkillCategory::Filesystem)
            .with_description("Read a file.")
            .input("filePath", ParamType::String, true, "path")
            .validate_with("filePath", |_| Ok(()))
            .output("content", ParamType::String)
            .with_min_trust(TrustLevel::Suggest);
        assert_eq!(d.inputs.len(), 1);
        assert!(d.inputs[0].validator.is_some());
        assert_eq!(d.min_trust_level, TrustLevel::Suggest);
        assert!(d.summary().contains("filePath: string"));
    }

    #[test]
    fn test_approval_id() {
        let r = SkillResult::rejected(
            FailureKind::ApprovalRequired {
                approval_id: "a1".into(),
            },
            "queued",
        );
        assert_eq!(r.approval_id(), Some("a1"));
        assert!(SkillResult::ok_with("content", "hi").approval_id().is_none());
    }
}
