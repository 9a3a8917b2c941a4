//! 内置技能：文件系统、任务、Shell、网页抓取、最终回答
//!
//! `register_builtin_skills` 在启动时把全部内置技能注册进注册表；之后注册表只读共享。

mod fs;
mod respond;
mod shell;
mod tasks;
mod web;

use std::path::Path;
use std::sync::Arc;

pub use fs::{
    fs_list_descriptor, fs_read_descriptor, fs_write_descriptor, FsListSkill, FsReadSkill,
    FsWriteSkill, WorkspaceFs,
};
pub use respond::{
    conversational_response_descriptor, ConversationalResponseSkill, CONVERSATIONAL_RESPONSE,
};
pub use shell::{shell_exec_descriptor, ShellExecSkill};
pub use tasks::{
    task_create_descriptor, task_list_descriptor, TaskCreateSkill, TaskListSkill, TaskRecord,
    TaskStore,
};
pub use web::{web_fetch_descriptor, WebFetchSkill};

use crate::config::SkillsSection;
use crate::llm::LlmClient;
use crate::skills::SkillRegistry;

/// 任务文件相对沙箱根的位置
pub const TASKS_FILE: &str = "memory/tasks.json";

pub fn register_builtin_skills(
    registry: &mut SkillRegistry,
    root: &Path,
    cfg: &SkillsSection,
    llm: Arc<dyn LlmClient>,
) {
    registry.register(fs_read_descriptor(), FsReadSkill::new(WorkspaceFs::new(root)));
    registry.register(fs_list_descriptor(), FsListSkill::new(WorkspaceFs::new(root)));
    registry.register(
        fs_write_descriptor(cfg.write_prefixes.clone()),
        FsWriteSkill::new(WorkspaceFs::new(root)),
    );

    let store = Arc::new(TaskStore::new(root.join(TASKS_FILE)));
    registry.register(task_list_descriptor(), TaskListSkill::new(store.clone()));
    registry.register(task_create_descriptor(), TaskCreateSkill::new(store));

    registry.register(
        shell_exec_descriptor(cfg.shell.allowed_commands.clone()),
        ShellExecSkill::new(root, cfg.high_risk_timeout_secs),
    );
    registry.register(
        web_fetch_descriptor(),
        WebFetchSkill::new(
            cfg.web.allowed_domains.clone(),
            cfg.web.timeout_secs,
            cfg.web.max_result_chars,
        ),
    );
    registry.register(
        conversational_response_descriptor(),
        ConversationalResponseSkill::new(llm),
    );

    tracing::info!(count = registry.len(), "builtin skills registered");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::skills::TrustLevel;

    #[test]
    fn test_registers_all_categories() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = SkillRegistry::new();
        register_builtin_skills(
            &mut registry,
            dir.path(),
            &SkillsSection::default(),
            Arc::new(MockLlmClient),
        );
        assert_eq!(registry.len(), 8);
        let observe: Vec<String> = registry
            .list_available(TrustLevel::Observe)
            .iter()
            .map(|d| d.id.clone())
            .collect();
        assert!(observe.contains(&"fs_read".to_string()));
        assert!(observe.contains(&CONVERSATIONAL_RESPONSE.to_string()));
        assert!(!observe.contains(&"shell_exec".to_string()));
        assert_eq!(registry.list_available(TrustLevel::BoundedAuto).len(), 8);
    }
}
