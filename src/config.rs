//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CORTEX__*` 覆盖（双下划线表示嵌套，如 `CORTEX__ENGINE__MAX_STEPS=5`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::react::ObservationMode;
use crate::skills::TrustLevel;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub engine: EngineSection,
    pub skills: SkillsSection,
    pub approval: ApprovalSection,
    pub trust: TrustSection,
    pub audit: AuditSection,
}

impl AppConfig {
    /// 沙箱根目录
    pub fn workspace_root(&self) -> PathBuf {
        self.app.workspace_root.clone()
    }

    /// 审批队列目录，未设置时为 `<workspace>/approvals`
    pub fn approval_dir(&self) -> PathBuf {
        self.approval
            .dir
            .clone()
            .unwrap_or_else(|| self.workspace_root().join("approvals"))
    }
}

/// [app] 段：应用名、工作目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub workspace_root: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "cortex".to_string(),
            workspace_root: PathBuf::from("workspace"),
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai（任意 OpenAI 兼容端点）/ mock；无 API Key 时总是退回 mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 读取 API Key 的环境变量名
    pub api_key_env: String,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// [engine] 段：推理循环参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub max_steps: usize,
    pub fast_path_enabled: bool,
    /// 循环内是否自动批准需审批的技能
    pub auto_approve: bool,
    pub observation_mode: ObservationMode,
    pub loop_threshold: usize,
    pub loop_window: usize,
    pub planner_timeout_secs: u64,
    pub max_observation_chars: usize,
    /// 进度事件通道容量
    pub progress_buffer: usize,
    /// 覆盖默认 system prompt（可选）
    pub system_prompt: Option<String>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_steps: 8,
            fast_path_enabled: true,
            auto_approve: true,
            observation_mode: ObservationMode::Narrative,
            loop_threshold: 3,
            loop_window: 6,
            planner_timeout_secs: 60,
            max_observation_chars: 4000,
            progress_buffer: 64,
            system_prompt: None,
        }
    }
}

/// [skills] 段：调用超时、写入前缀、Shell 白名单、抓取域名、输出脱敏
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SkillsSection {
    pub skill_timeout_secs: u64,
    pub high_risk_timeout_secs: u64,
    /// fs_write 允许写入的目录前缀（相对沙箱根）
    pub write_prefixes: Vec<String>,
    pub shell: ShellSection,
    pub web: WebSection,
    pub redaction: RedactionSection,
}

impl Default for SkillsSection {
    fn default() -> Self {
        Self {
            skill_timeout_secs: 30,
            high_risk_timeout_secs: 10,
            write_prefixes: vec!["notes".into(), "out".into()],
            shell: ShellSection::default(),
            web: WebSection::default(),
            redaction: RedactionSection::default(),
        }
    }
}

/// [skills.shell] 段：允许执行的命令名（仅首词）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShellSection {
    pub allowed_commands: Vec<String>,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            allowed_commands: ["ls", "cat", "head", "tail", "wc", "grep", "find", "echo"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// [skills.web] 段：抓取超时、最大字符数、域名白名单
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSection {
    pub timeout_secs: u64,
    pub max_result_chars: usize,
    pub allowed_domains: Vec<String>,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_result_chars: 8000,
            allowed_domains: vec![
                "en.wikipedia.org".into(),
                "github.com".into(),
                "raw.githubusercontent.com".into(),
                "docs.rs".into(),
                "crates.io".into(),
                "doc.rust-lang.org".into(),
                "developer.mozilla.org".into(),
                "arxiv.org".into(),
                "news.ycombinator.com".into(),
            ],
        }
    }
}

/// [skills.redaction] 段：按角色脱敏的输出字段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedactionSection {
    pub fields: Vec<String>,
    pub privileged_roles: Vec<String>,
}

impl Default for RedactionSection {
    fn default() -> Self {
        Self {
            fields: vec!["token".into(), "password".into(), "apiKey".into()],
            privileged_roles: vec!["owner".into()],
        }
    }
}

/// [approval] 段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ApprovalSection {
    pub dir: Option<PathBuf>,
}

/// [trust] 段：默认信任等级，可选的信任文件（每次运行开始时读取）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrustSection {
    pub default_level: TrustLevel,
    pub file: Option<PathBuf>,
}

impl Default for TrustSection {
    fn default() -> Self {
        Self {
            default_level: TrustLevel::SupervisedAuto,
            file: None,
        }
    }
}

/// [audit] 段：可选的 JSONL 审计文件
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuditSection {
    pub jsonl_path: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 CORTEX__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CORTEX__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CORTEX")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = AppConfig::default();
        assert_eq!(c.engine.max_steps, 8);
        assert!(c.engine.auto_approve);
        assert_eq!(c.trust.default_level, TrustLevel::SupervisedAuto);
        assert_eq!(c.approval_dir(), PathBuf::from("workspace").join("approvals"));
        assert!(c.skills.shell.allowed_commands.contains(&"ls".to_string()));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cortex.toml");
        std::fs::write(
            &path,
            r#"
[engine]
max_steps = 3
observation_mode = "verbatim"
auto_approve = false

[trust]
default_level = "bounded_auto"
"#,
        )
        .unwrap();
        let c = load_config(Some(path)).unwrap();
        assert_eq!(c.engine.max_steps, 3);
        assert_eq!(c.engine.observation_mode, ObservationMode::Verbatim);
        assert!(!c.engine.auto_approve);
        assert_eq!(c.engine.loop_threshold, 3);
        assert_eq!(c.trust.default_level, TrustLevel::BoundedAuto);
    }
}
