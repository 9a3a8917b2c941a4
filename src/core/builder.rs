//! 运行时构建：按配置组装注册表、审批队列、审计出口、执行器与推理引擎
//!
//! 二进制与集成测试共用同一套组装逻辑。

use std::sync::Arc;

use crate::approval::{ApprovalQueue, FileApprovalStore};
use crate::audit::{AuditSink, FanoutAuditSink, JsonlAuditSink, TracingAuditSink};
use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::react::{EngineOptions, ReasoningEngine};
use crate::skills::{
    register_builtin_skills, OutputFilter, RedactingFilter, SkillExecutor, SkillRegistry,
    SkillTimeouts,
};
use crate::trust::{FileTrustSource, StaticTrust, TrustSource};

/// 组装好的运行时
pub struct Runtime {
    pub registry: Arc<SkillRegistry>,
    pub approvals: Arc<ApprovalQueue>,
    pub executor: Arc<SkillExecutor>,
    pub engine: ReasoningEngine,
}

/// 有 API Key 且 provider 不是 mock 时用 OpenAI 兼容客户端，否则用 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let api_key = std::env::var(&cfg.llm.api_key_env).ok();
    match api_key {
        Some(key) if provider != "mock" => {
            tracing::info!(model = %cfg.llm.model, "Using OpenAI-compatible LLM");
            Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                &key,
            ))
        }
        _ => {
            tracing::warn!("No API key set or provider is mock, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}

pub fn build_audit_sink(cfg: &AppConfig) -> Result<Arc<dyn AuditSink>, AgentError> {
    let tracing_sink: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    match &cfg.audit.jsonl_path {
        Some(path) => {
            let jsonl = JsonlAuditSink::open(path).map_err(|e| {
                AgentError::ConfigError(format!("open audit log {}: {}", path.display(), e))
            })?;
            Ok(Arc::new(FanoutAuditSink::new(vec![tracing_sink, Arc::new(jsonl)])))
        }
        None => Ok(tracing_sink),
    }
}

pub fn build_trust_source(cfg: &AppConfig) -> Arc<dyn TrustSource> {
    match &cfg.trust.file {
        Some(path) => Arc::new(FileTrustSource::new(path, cfg.trust.default_level)),
        None => Arc::new(StaticTrust(cfg.trust.default_level)),
    }
}

/// 按配置组装完整运行时
pub fn build_runtime(cfg: &AppConfig, llm: Arc<dyn LlmClient>) -> Result<Runtime, AgentError> {
    let root = cfg.workspace_root();
    std::fs::create_dir_all(&root).map_err(|e| {
        AgentError::ConfigError(format!("create workspace {}: {}", root.display(), e))
    })?;

    let mut registry = SkillRegistry::new();
    register_builtin_skills(&mut registry, &root, &cfg.skills, llm.clone());
    let registry = Arc::new(registry);

    let audit = build_audit_sink(cfg)?;
    let timeouts =
        SkillTimeouts::from_secs(cfg.skills.skill_timeout_secs, cfg.skills.high_risk_timeout_secs);
    let filter: Arc<dyn OutputFilter> = Arc::new(RedactingFilter::new(
        cfg.skills.redaction.fields.clone(),
        cfg.skills.redaction.privileged_roles.clone(),
    ));
    let approvals = Arc::new(
        ApprovalQueue::new(
            Arc::new(FileApprovalStore::new(cfg.approval_dir())),
            registry.clone(),
            audit.clone(),
        )
        .with_timeouts(timeouts)
        .with_output_filter(filter.clone()),
    );
    let executor = Arc::new(
        SkillExecutor::new(registry.clone(), approvals.clone(), audit, &root)
            .with_output_filter(filter)
            .with_timeouts(timeouts),
    );
    let engine = ReasoningEngine::new(
        llm,
        executor.clone(),
        build_trust_source(cfg),
        EngineOptions::from(&cfg.engine),
    );
    Ok(Runtime {
        registry,
        approvals,
        executor,
        engine,
    })
}
