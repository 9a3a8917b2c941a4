//! 任务列表技能：task_list / task_create
//!
//! 任务保存在工作区 `memory/tasks.json`（单文件 JSON，临时文件 + rename 写入）。
//! task_create 写入受保护的 memory 命名空间，只读策略下会被执行器拦截。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use crate::skills::{
    CostTier, ParamType, RiskTier, SkillBinding, SkillCategory, SkillDescriptor, SkillInputs,
    SkillResult, TrustLevel,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub done: bool,
    pub created_at: i64,
}

/// 任务文件存储；同进程内写入串行化
#[derive(Debug)]
pub struct TaskStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TaskStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<Vec<TaskRecord>, String> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&self.path)
            .map_err(|e| format!("Read tasks failed: {}", e))?;
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&data).map_err(|e| format!("Tasks file is corrupt: {}", e))
    }

    pub async fn list(&self) -> Result<Vec<TaskRecord>, String> {
        let _guard = self.lock.lock().await;
        self.read()
    }

    pub async fn add(&self, title: &str) -> Result<TaskRecord, String> {
        let _guard = self.lock.lock().await;
        let mut tasks = self.read()?;
        let record = TaskRecord {
            id: format!("task_{}", uuid::Uuid::new_v4()),
            title: title.to_string(),
            done: false,
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        tasks.push(record.clone());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| format!("Create dir failed: {}", e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(&tasks).map_err(|e| e.to_string())?;
        std::fs::write(&tmp, body).map_err(|e| format!("Write tasks failed: {}", e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| format!("Write tasks failed: {}", e))?;
        Ok(record)
    }
}

pub fn task_list_descriptor() -> SkillDescriptor {
    SkillDescriptor::new("task_list", SkillCategory::Memory)
        .with_name("List tasks")
        .with_description("List the user's tasks.")
        .input("includeDone", ParamType::Boolean, false, "Include completed tasks")
        .output("tasks", ParamType::Array)
        .output("summary", ParamType::String)
}

pub struct TaskListSkill {
    store: Arc<TaskStore>,
}

impl TaskListSkill {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SkillBinding for TaskListSkill {
    async fn invoke(&self, inputs: SkillInputs) -> SkillResult {
        let include_done = inputs
            .get("includeDone")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let tasks = match self.store.list().await {
            Ok(t) => t,
            Err(e) => return SkillResult::failure(e),
        };
        let visible: Vec<&TaskRecord> = tasks.iter().filter(|t| include_done || !t.done).collect();
        let summary = if visible.is_empty() {
            "You have no open tasks.".to_string()
        } else {
            visible
                .iter()
                .enumerate()
                .map(|(i, t)| format!("{}. {}{}", i + 1, t.title, if t.done { " (done)" } else { "" }))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let mut out = SkillInputs::new();
        out.insert("tasks".into(), json!(visible));
        out.insert("summary".into(), json!(summary));
        SkillResult::ok(out)
    }
}

pub fn task_create_descriptor() -> SkillDescriptor {
    SkillDescriptor::new("task_create", SkillCategory::Memory)
        .with_name("Create task")
        .with_description("Add a task to the user's task list.")
        .input("title", ParamType::String, true, "Task title")
        .validate_with("title", |v| match v.as_str() {
            Some(s) if !s.trim().is_empty() => Ok(()),
            _ => Err("title must not be empty".to_string()),
        })
        .output("task", ParamType::Object)
        .with_risk(RiskTier::Medium)
        .with_cost(CostTier::Cheap)
        .with_min_trust(TrustLevel::SupervisedAuto)
        .protected()
}

pub struct TaskCreateSkill {
    store: Arc<TaskStore>,
}

impl TaskCreateSkill {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SkillBinding for TaskCreateSkill {
    async fn invoke(&self, inputs: SkillInputs) -> SkillResult {
        let title = inputs.get("title").and_then(|v| v.as_str()).unwrap_or("").trim();
        match self.store.add(title).await {
            Ok(task) => SkillResult::ok_with("task", json!(task)),
            Err(e) => SkillResult::failure(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TaskStore::new(dir.path().join("memory/tasks.json")));
        let empty = TaskListSkill::new(store.clone()).invoke(SkillInputs::new()).await;
        assert_eq!(empty.output_str("summary"), Some("You have no open tasks."));

        let mut inputs = SkillInputs::new();
        inputs.insert("title".into(), json!("buy milk"));
        let created = TaskCreateSkill::new(store.clone()).invoke(inputs).await;
        assert!(created.success);
        assert_eq!(created.outputs["task"]["title"], "buy milk");

        let listed = TaskListSkill::new(store).invoke(SkillInputs::new()).await;
        assert_eq!(listed.output_str("summary"), Some("1. buy milk"));
        assert_eq!(listed.outputs["tasks"].as_array().unwrap().len(), 1);
    }
}
