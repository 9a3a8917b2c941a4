//! 技能系统
//!
//! 技能（Skill）= 不可变的描述（SkillDescriptor）+ 可执行绑定（SkillBinding）。
//! 所有调用都经过 `SkillExecutor::execute_skill`：信任、校验、沙箱、策略、审批、调用、审计。

pub mod builtin;
pub mod executor;
pub mod policy;
pub mod registry;
pub mod sandbox;
pub mod types;

pub use builtin::register_builtin_skills;
pub use executor::{invoke_bounded, SkillExecutor, SkillTimeouts};
pub use policy::{ExecutionPolicy, OutputFilter, RedactingFilter};
pub use registry::{SkillBinding, SkillRegistry};
pub use types::{
    CostTier, InputParam, OutputParam, ParamType, ParamValidator, RiskTier, SandboxConstraints,
    SkillCategory, SkillDescriptor, SkillInputs, SkillResult, TrustLevel,
};
