//! 技能执行器：单次技能调用的唯一入口
//!
//! execute_skill 依次执行：查找描述 -> 信任检查 -> 输入校验 -> 沙箱检查 -> 策略检查 -> 审批门 ->
//! 调用（超时 + panic 捕获）-> 输出过滤 -> 审计。任何一步失败即返回，所有结果都写审计。

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde_json::json;
use tokio::time::timeout;

use crate::approval::ApprovalQueue;
use crate::audit::{AuditCategory, AuditEvent, AuditLevel, AuditSink};
use crate::core::FailureKind;
use crate::skills::sandbox::{check_sandbox, validate_inputs};
use crate::skills::{
    ExecutionPolicy, OutputFilter, RiskTier, SkillBinding, SkillDescriptor, SkillInputs,
    SkillRegistry, SkillResult, TrustLevel,
};

/// 未给出策略时的调用方角色（非特权）
pub const DEFAULT_ROLE: &str = "agent";

/// 调用超时：高风险技能使用更短的上限
#[derive(Debug, Clone, Copy)]
pub struct SkillTimeouts {
    pub default: Duration,
    pub high_risk: Duration,
}

impl Default for SkillTimeouts {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(30),
            high_risk: Duration::from_secs(10),
        }
    }
}

impl SkillTimeouts {
    pub fn from_secs(default: u64, high_risk: u64) -> Self {
        Self {
            default: Duration::from_secs(default),
            high_risk: Duration::from_secs(high_risk),
        }
    }

    pub fn for_risk(&self, risk: RiskTier) -> Duration {
        match risk {
            RiskTier::High => self.high_risk.min(self.default),
            _ => self.default,
        }
    }
}

/// 在超时与 panic 边界内调用绑定；两者都转为失败结果
pub async fn invoke_bounded(
    skill_id: &str,
    binding: Arc<dyn SkillBinding>,
    inputs: SkillInputs,
    limit: Duration,
) -> SkillResult {
    let call = AssertUnwindSafe(binding.invoke(inputs)).catch_unwind();
    match timeout(limit, call).await {
        Ok(Ok(result)) => {
            if !result.success && result.failure.is_none() {
                SkillResult {
                    failure: Some(FailureKind::Runtime),
                    ..result
                }
            } else {
                result
            }
        }
        Ok(Err(panic)) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(skill = %skill_id, panic = %msg, "skill binding panicked");
            SkillResult::failure(format!("Skill '{}' crashed: {}", skill_id, msg))
        }
        Err(_) => SkillResult::rejected(
            FailureKind::Timeout,
            format!("Skill '{}' timed out after {}s", skill_id, limit.as_secs_f32()),
        ),
    }
}

/// 技能执行器：持有注册表、审批队列、审计出口、可选输出过滤
pub struct SkillExecutor {
    registry: Arc<SkillRegistry>,
    approvals: Arc<ApprovalQueue>,
    audit: Arc<dyn AuditSink>,
    output_filter: Option<Arc<dyn OutputFilter>>,
    sandbox_root: PathBuf,
    timeouts: SkillTimeouts,
}

impl SkillExecutor {
    pub fn new(
        registry: Arc<SkillRegistry>,
        approvals: Arc<ApprovalQueue>,
        audit: Arc<dyn AuditSink>,
        sandbox_root: impl AsRef<Path>,
    ) -> Self {
        Self {
            registry,
            approvals,
            audit,
            output_filter: None,
            sandbox_root: sandbox_root.as_ref().to_path_buf(),
            timeouts: SkillTimeouts::default(),
        }
    }

    pub fn with_output_filter(mut self, filter: Arc<dyn OutputFilter>) -> Self {
        self.output_filter = Some(filter);
        self
    }

    pub fn with_timeouts(mut self, timeouts: SkillTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn registry(&self) -> &Arc<SkillRegistry> {
        &self.registry
    }

    pub fn approvals(&self) -> &Arc<ApprovalQueue> {
        &self.approvals
    }

    pub fn sandbox_root(&self) -> &Path {
        &self.sandbox_root
    }

    /// 执行一次技能调用；永不返回 Err，所有失败都在 SkillResult 中
    pub async fn execute_skill(
        &self,
        skill_id: &str,
        inputs: SkillInputs,
        trust: TrustLevel,
        auto_approve: bool,
        policy: Option<&ExecutionPolicy>,
    ) -> SkillResult {
        let start = Instant::now();
        let actor = policy.map(|p| p.role.as_str()).unwrap_or(DEFAULT_ROLE);

        let Some(descriptor) = self.registry.lookup(skill_id) else {
            let result =
                SkillResult::rejected(FailureKind::NotFound, format!("Skill not found: {}", skill_id));
            self.audit_outcome(skill_id, &inputs, &result, trust, actor, start);
            return result;
        };

        if let Err(result) = self.pre_checks(&descriptor, &inputs, trust, policy) {
            self.audit_outcome(skill_id, &inputs, &result, trust, actor, start);
            return result;
        }

        if descriptor.requires_approval && !auto_approve {
            let result = match self.approvals.enqueue(skill_id, inputs.clone(), &descriptor).await {
                Ok(id) => SkillResult::rejected(
                    FailureKind::ApprovalRequired {
                        approval_id: id.clone(),
                    },
                    format!(
                        "Skill '{}' requires approval; queued as {} (awaiting human decision)",
                        skill_id, id
                    ),
                ),
                Err(e) => SkillResult::failure(format!("Failed to queue approval: {}", e)),
            };
            self.audit_outcome(skill_id, &inputs, &result, trust, actor, start);
            return result;
        }

        let Some(binding) = self.registry.binding(skill_id) else {
            let result =
                SkillResult::rejected(FailureKind::NotFound, format!("Skill not bound: {}", skill_id));
            self.audit_outcome(skill_id, &inputs, &result, trust, actor, start);
            return result;
        };

        let limit = self.timeouts.for_risk(descriptor.risk);
        let mut result = invoke_bounded(skill_id, binding, inputs.clone(), limit).await;

        if let Some(filter) = &self.output_filter {
            filter.filter(skill_id, actor, &mut result.outputs);
        }

        self.audit_outcome(skill_id, &inputs, &result, trust, actor, start);
        result
    }

    /// 信任、输入、沙箱、策略检查；返回 Err 时即为最终结果
    fn pre_checks(
        &self,
        descriptor: &SkillDescriptor,
        inputs: &SkillInputs,
        trust: TrustLevel,
        policy: Option<&ExecutionPolicy>,
    ) -> Result<(), SkillResult> {
        if !self.registry.is_available(&descriptor.id, trust) {
            return Err(SkillResult::rejected(
                FailureKind::TrustDenied,
                format!(
                    "Skill '{}' requires trust level {} but current level is {}",
                    descriptor.id, descriptor.min_trust_level, trust
                ),
            ));
        }

        validate_inputs(descriptor, inputs)
            .map_err(|e| SkillResult::rejected(FailureKind::Validation, e))?;

        check_sandbox(descriptor, inputs, &self.sandbox_root)
            .map_err(|e| SkillResult::rejected(FailureKind::SandboxViolation, e))?;

        if let Some(policy) = policy {
            if descriptor.protected_write && !policy.allow_protected_writes {
                return Err(SkillResult::rejected(
                    FailureKind::PolicyDenied,
                    format!(
                        "Policy for role '{}' does not allow protected writes ('{}' blocked)",
                        policy.role, descriptor.id
                    ),
                ));
            }
        }
        Ok(())
    }

    fn audit_outcome(
        &self,
        skill_id: &str,
        inputs: &SkillInputs,
        result: &SkillResult,
        trust: TrustLevel,
        actor: &str,
        start: Instant,
    ) {
        audit_skill_outcome(
            self.audit.as_ref(),
            skill_id,
            inputs,
            result,
            Some(trust),
            actor,
            start.elapsed().as_millis() as u64,
        );
    }
}

/// 按结果类型写一条技能审计；审批通过后的执行也走这里
pub(crate) fn audit_skill_outcome(
    audit: &dyn AuditSink,
    skill_id: &str,
    inputs: &SkillInputs,
    result: &SkillResult,
    trust: Option<TrustLevel>,
    actor: &str,
    duration_ms: u64,
) {
    let (level, category, event) = match &result.failure {
        None if result.success => (AuditLevel::Info, AuditCategory::Action, "skill_executed"),
        Some(kind) if kind.is_security() => {
            (AuditLevel::Warn, AuditCategory::Security, kind.as_str())
        }
        Some(FailureKind::ApprovalRequired { .. }) => {
            (AuditLevel::Info, AuditCategory::Approval, "approval_required")
        }
        Some(FailureKind::Validation) => {
            (AuditLevel::Info, AuditCategory::Action, "validation_failed")
        }
        Some(FailureKind::NotFound) => (AuditLevel::Warn, AuditCategory::Action, "not_found"),
        _ => (AuditLevel::Error, AuditCategory::Action, "skill_failed"),
    };
    audit.record(AuditEvent::new(
        level,
        category,
        event,
        actor,
        json!({
            "skill": skill_id,
            "inputs": inputs,
            "success": result.success,
            "outputs": result.outputs,
            "error": result.error,
            "duration_ms": duration_ms,
            "trust_level": trust.map(|t| t.as_str()),
        }),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::MemoryApprovalStore;
    use crate::audit::MemoryAuditSink;
    use crate::skills::{ParamType, RedactingFilter, SandboxConstraints, SkillCategory};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn obj(v: serde_json::Value) -> SkillInputs {
        v.as_object().cloned().unwrap_or_default()
    }

    struct Fixture {
        executor: SkillExecutor,
        calls: Arc<AtomicUsize>,
        audit: Arc<MemoryAuditSink>,
    }

    fn fixture(descriptor: SkillDescriptor) -> Fixture {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registry = SkillRegistry::new();
        registry.register(descriptor, move |inputs: SkillInputs| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut out = SkillInputs::new();
                out.insert("echo".into(), serde_json::Value::Object(inputs));
                out.insert("token".into(), json!("secret-value"));
                SkillResult::ok(out)
            }
        });
        let registry = Arc::new(registry);
        let audit = Arc::new(MemoryAuditSink::new());
        let approvals = Arc::new(ApprovalQueue::new(
            Arc::new(MemoryApprovalStore::new()),
            registry.clone(),
            audit.clone(),
        ));
        Fixture {
            executor: SkillExecutor::new(registry, approvals, audit.clone(), "/srv/agent"),
            calls,
            audit,
        }
    }

    fn write_descriptor() -> SkillDescriptor {
        SkillDescriptor::new("fs_write", SkillCategory::Filesystem)
            .input("filePath", ParamType::String, true, "target")
            .with_min_trust(TrustLevel::SupervisedAuto)
            .with_risk(RiskTier::High)
            .requiring_approval()
            .with_sandbox(SandboxConstraints::paths(vec!["out".into()], &["filePath"]))
    }

    #[tokio::test]
    async fn test_unknown_skill_is_audited() {
        let f = fixture(write_descriptor());
        let r = f
            .executor
            .execute_skill("nope", SkillInputs::new(), TrustLevel::BoundedAuto, true, None)
            .await;
        assert!(!r.success);
        assert_eq!(r.failure, Some(FailureKind::NotFound));
        assert_eq!(f.audit.count("not_found"), 1);
    }

    #[tokio::test]
    async fn test_trust_denied_never_invokes() {
        let f = fixture(write_descriptor());
        let r = f
            .executor
            .execute_skill(
                "fs_write",
                obj(json!({"filePath": "out/a"})),
                TrustLevel::Suggest,
                true,
                None,
            )
            .await;
        assert_eq!(r.failure, Some(FailureKind::TrustDenied));
        let msg = r.error.unwrap();
        assert!(msg.contains("supervised_auto") && msg.contains("suggest"));
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.audit.count("trust_denied"), 1);
    }

    #[tokio::test]
    async fn test_sandbox_violation() {
        let f = fixture(write_descriptor());
        let r = f
            .executor
            .execute_skill(
                "fs_write",
                obj(json!({"filePath": "../etc/passwd"})),
                TrustLevel::BoundedAuto,
                true,
                None,
            )
            .await;
        assert_eq!(r.failure, Some(FailureKind::SandboxViolation));
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.audit.count("sandbox_violation"), 1);
    }

    #[tokio::test]
    async fn test_chained_shell_command_is_a_sandbox_violation() {
        let f = fixture(
            SkillDescriptor::new("shell_exec", SkillCategory::Shell)
                .input("command", ParamType::String, true, "command line")
                .with_sandbox(SandboxConstraints::commands(vec!["ls".into()], "command")),
        );
        let r = f
            .executor
            .execute_skill(
                "shell_exec",
                obj(json!({"command": "ls && touch x"})),
                TrustLevel::BoundedAuto,
                true,
                None,
            )
            .await;
        assert_eq!(r.failure, Some(FailureKind::SandboxViolation));
        assert!(r.error.unwrap().contains("Shell operator '&'"));
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_policy_denies_protected_write_regardless_of_trust() {
        let f = fixture(
            SkillDescriptor::new("task_create", SkillCategory::Memory).protected(),
        );
        let r = f
            .executor
            .execute_skill(
                "task_create",
                SkillInputs::new(),
                TrustLevel::BoundedAuto,
                true,
                Some(&ExecutionPolicy::read_only("guest")),
            )
            .await;
        assert_eq!(r.failure, Some(FailureKind::PolicyDenied));
        assert!(r.error.unwrap().contains("guest"));
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);

        let ok = f
            .executor
            .execute_skill(
                "task_create",
                SkillInputs::new(),
                TrustLevel::Observe,
                true,
                Some(&ExecutionPolicy::default()),
            )
            .await;
        assert!(ok.success);
    }

    #[tokio::test]
    async fn test_approval_gate_and_auto_approve() {
        let f = fixture(write_descriptor());
        let queued = f
            .executor
            .execute_skill(
                "fs_write",
                obj(json!({"filePath": "out/a"})),
                TrustLevel::BoundedAuto,
                false,
                None,
            )
            .await;
        assert!(!queued.success);
        let id = queued.approval_id().unwrap().to_string();
        assert!(queued.error.unwrap().contains(&id));
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.executor.approvals().list_pending().await.unwrap().len(), 1);

        let direct = f
            .executor
            .execute_skill(
                "fs_write",
                obj(json!({"filePath": "out/a"})),
                TrustLevel::BoundedAuto,
                true,
                None,
            )
            .await;
        assert!(direct.success);
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_output_filter_applies_per_role() {
        let f = fixture(SkillDescriptor::new("peek", SkillCategory::Memory));
        let executor = f.executor.with_output_filter(Arc::new(RedactingFilter::new(
            vec!["token".into()],
            vec!["owner".into()],
        )));
        let r = executor
            .execute_skill(
                "peek",
                SkillInputs::new(),
                TrustLevel::Observe,
                true,
                Some(&ExecutionPolicy::for_role("guest")),
            )
            .await;
        assert_eq!(r.outputs["token"], crate::skills::policy::REDACTED);
        let r = executor
            .execute_skill(
                "peek",
                SkillInputs::new(),
                TrustLevel::Observe,
                true,
                Some(&ExecutionPolicy::for_role("owner")),
            )
            .await;
        assert_eq!(r.outputs["token"], "secret-value");

        let r = executor
            .execute_skill("peek", SkillInputs::new(), TrustLevel::Observe, true, None)
            .await;
        assert_eq!(r.outputs["token"], crate::skills::policy::REDACTED);
        let audited = f.audit.events();
        let last = audited.last().unwrap();
        assert_eq!(last.actor, DEFAULT_ROLE);
        assert_eq!(last.details["outputs"]["token"], crate::skills::policy::REDACTED);
    }

    #[tokio::test]
    async fn test_invoke_bounded_catches_panic_and_timeout() {
        let panicking: Arc<dyn SkillBinding> = Arc::new(|_inputs: SkillInputs| async {
            if true {
                panic!("boom");
            }
            SkillResult::ok(SkillInputs::new())
        });
        let r = invoke_bounded("p", panicking, SkillInputs::new(), Duration::from_secs(1)).await;
        assert_eq!(r.failure, Some(FailureKind::Runtime));
        assert!(r.error.unwrap().contains("boom"));

        let slow: Arc<dyn SkillBinding> = Arc::new(|_inputs: SkillInputs| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            SkillResult::ok(SkillInputs::new())
        });
        let r = invoke_bounded("s", slow, SkillInputs::new(), Duration::from_millis(20)).await;
        assert_eq!(r.failure, Some(FailureKind::Timeout));
    }

    #[test]
    fn test_high_risk_timeout_is_shorter() {
        let t = SkillTimeouts::from_secs(30, 5);
        assert_eq!(t.for_risk(RiskTier::High), Duration::from_secs(5));
        assert_eq!(t.for_risk(RiskTier::Low), Duration::from_secs(30));
    }
}
