//! Cortex - 智能体推理与技能执行内核
//!
//! 模块划分：
//! - **approval**: 持久化审批队列（文件存储、懒加载、并发安全的 resolve）
//! - **audit**: 审计事件与出口（tracing / JSONL / 内存）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、推理状态机、失败分类
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock / Scripted）
//! - **react**: Planner、Scratchpad、失败循环检测、ReasoningEngine 主循环
//! - **skills**: 技能描述、注册表、沙箱、执行器与内置技能
//! - **trust**: 信任等级来源

pub mod approval;
pub mod audit;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod react;
pub mod skills;
pub mod trust;

pub use crate::core::AgentError;
pub use react::{ReasoningContext, ReasoningEngine, ReasoningResult};
pub use skills::{SkillExecutor, SkillRegistry, TrustLevel};
