//! 技能注册表
//!
//! 描述（SkillDescriptor）与可执行绑定（SkillBinding）按 id 一一对应。启动时可变构建，
//! 之后以 `Arc<SkillRegistry>` 只读共享给 SkillExecutor / ApprovalQueue / ReasoningEngine。

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::skills::{SkillDescriptor, SkillInputs, SkillResult, TrustLevel};

/// 技能的可执行部分：输入已校验，副作用由 SkillExecutor 在外部约束
#[async_trait]
pub trait SkillBinding: Send + Sync {
    async fn invoke(&self, inputs: SkillInputs) -> SkillResult;
}

/// 闭包即绑定：`|inputs| async move { SkillResult::ok(...) }`
#[async_trait]
impl<F, Fut> SkillBinding for F
where
    F: Fn(SkillInputs) -> Fut + Send + Sync,
    Fut: Future<Output = SkillResult> + Send,
{
    async fn invoke(&self, inputs: SkillInputs) -> SkillResult {
        (self)(inputs).await
    }
}

struct RegisteredSkill {
    descriptor: Arc<SkillDescriptor>,
    binding: Arc<dyn SkillBinding>,
}

/// 技能注册表：register / lookup / list_available
#[derive(Default)]
pub struct SkillRegistry {
    skills: HashMap<String, RegisteredSkill>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册技能；同 id 重复注册时覆盖（重启时幂等）
    pub fn register(&mut self, descriptor: SkillDescriptor, binding: impl SkillBinding + 'static) {
        self.register_arc(descriptor, Arc::new(binding));
    }

    pub fn register_arc(&mut self, descriptor: SkillDescriptor, binding: Arc<dyn SkillBinding>) {
        let id = descriptor.id.clone();
        if self.skills.contains_key(&id) {
            tracing::debug!(skill = %id, "re-registering skill, previous binding replaced");
        }
        self.skills.insert(
            id,
            RegisteredSkill {
                descriptor: Arc::new(descriptor),
                binding,
            },
        );
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<SkillDescriptor>> {
        self.skills.get(id).map(|s| s.descriptor.clone())
    }

    pub fn binding(&self, id: &str) -> Option<Arc<dyn SkillBinding>> {
        self.skills.get(id).map(|s| s.binding.clone())
    }

    /// 调用方信任等级可用的技能（按 id 排序，保证 prompt 稳定）
    pub fn list_available(&self, trust: TrustLevel) -> Vec<Arc<SkillDescriptor>> {
        let mut out: Vec<Arc<SkillDescriptor>> = self
            .skills
            .values()
            .filter(|s| trust.permits(s.descriptor.min_trust_level))
            .map(|s| s.descriptor.clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn is_available(&self, id: &str, trust: TrustLevel) -> bool {
        self.skills
            .get(id)
            .map(|s| trust.permits(s.descriptor.min_trust_level))
            .unwrap_or(false)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.skills.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}
