//! 文件系统技能：fs_read / fs_list / fs_write
//!
//! WorkspaceFs 绑定根目录：先按词法解析（拒绝 ../ 逃逸），目标已存在时再 canonicalize，
//! 防止通过符号链接跳出根目录。写入范围由描述中的沙箱约束在执行器里检查。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::json;
use walkdir::WalkDir;

use crate::skills::sandbox::resolve_path;
use crate::skills::{
    CostTier, ParamType, RiskTier, SandboxConstraints, SkillBinding, SkillCategory,
    SkillDescriptor, SkillInputs, SkillResult, TrustLevel,
};

/// 列目录最大深度
const MAX_LIST_DEPTH: usize = 3;
/// 列目录最多返回条数
const MAX_LIST_ENTRIES: usize = 200;

#[derive(Debug, Clone)]
pub struct WorkspaceFs {
    root: PathBuf,
}

impl WorkspaceFs {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: &str) -> Result<PathBuf, String> {
        let resolved = resolve_path(path, &self.root)
            .ok_or_else(|| format!("Path escapes workspace: {}", path))?;
        if let Ok(canonical) = resolved.canonicalize() {
            let root = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());
            if !canonical.starts_with(&root) {
                return Err(format!("Path escapes workspace: {}", path));
            }
        }
        Ok(resolved)
    }
}

fn str_input<'a>(inputs: &'a SkillInputs, name: &str) -> &'a str {
    inputs.get(name).and_then(|v| v.as_str()).unwrap_or("")
}

pub fn fs_read_descriptor() -> SkillDescriptor {
    SkillDescriptor::new("fs_read", SkillCategory::Filesystem)
        .with_name("Read file")
        .with_description("Read a UTF-8 text file from the workspace.")
        .input("filePath", ParamType::String, true, "File path relative to the workspace")
        .output("content", ParamType::String)
        .with_cost(CostTier::Free)
}

pub struct FsReadSkill {
    fs: WorkspaceFs,
}

impl FsReadSkill {
    pub fn new(fs: WorkspaceFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl SkillBinding for FsReadSkill {
    async fn invoke(&self, inputs: SkillInputs) -> SkillResult {
        let path = str_input(&inputs, "filePath");
        let resolved = match self.fs.resolve(path) {
            Ok(p) => p,
            Err(e) => return SkillResult::failure(e),
        };
        tracing::info!(path = %path, "fs_read");
        match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => SkillResult::ok_with("content", content),
            Err(e) => SkillResult::failure(format!("Read failed for {}: {}", path, e)),
        }
    }
}

pub fn fs_list_descriptor() -> SkillDescriptor {
    SkillDescriptor::new("fs_list", SkillCategory::Filesystem)
        .with_name("List directory")
        .with_description("List files under a workspace directory (directories end with '/').")
        .input("dirPath", ParamType::String, false, "Directory path, default '.'")
        .input("depth", ParamType::Number, false, "Recursion depth, 1-3")
        .validate_with("depth", |v| match v.as_u64() {
            Some(d) if (1..=MAX_LIST_DEPTH as u64).contains(&d) => Ok(()),
            _ => Err(format!("depth must be an integer between 1 and {}", MAX_LIST_DEPTH)),
        })
        .output("entries", ParamType::Array)
}

pub struct FsListSkill {
    fs: WorkspaceFs,
}

impl FsListSkill {
    pub fn new(fs: WorkspaceFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl SkillBinding for FsListSkill {
    async fn invoke(&self, inputs: SkillInputs) -> SkillResult {
        let path = match str_input(&inputs, "dirPath") {
            "" => ".",
            p => p,
        };
        let depth = inputs
            .get("depth")
            .and_then(|v| v.as_u64())
            .map(|d| d as usize)
            .unwrap_or(1);
        let base = match self.fs.resolve(path) {
            Ok(p) => p,
            Err(e) => return SkillResult::failure(e),
        };
        if !base.is_dir() {
            return SkillResult::failure(format!("Directory not found: {}", path));
        }
        let mut entries = Vec::new();
        for entry in WalkDir::new(&base)
            .min_depth(1)
            .max_depth(depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .flatten()
        {
            let rel = entry
                .path()
                .strip_prefix(&base)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .to_string();
            let suffix = if entry.file_type().is_dir() { "/" } else { "" };
            entries.push(format!("{}{}", rel, suffix));
            if entries.len() >= MAX_LIST_ENTRIES {
                break;
            }
        }
        SkillResult::ok_with("entries", json!(entries))
    }
}

pub fn fs_write_descriptor(write_prefixes: Vec<String>) -> SkillDescriptor {
    SkillDescriptor::new("fs_write", SkillCategory::Filesystem)
        .with_name("Write file")
        .with_description("Create or overwrite a text file in an allowed workspace directory.")
        .input("filePath", ParamType::String, true, "Target path relative to the workspace")
        .input("content", ParamType::String, true, "Full file content")
        .output("bytesWritten", ParamType::Number)
        .with_risk(RiskTier::High)
        .with_cost(CostTier::Cheap)
        .with_min_trust(TrustLevel::SupervisedAuto)
        .requiring_approval()
        .with_sandbox(SandboxConstraints::paths(write_prefixes, &["filePath"]))
}

pub struct FsWriteSkill {
    fs: WorkspaceFs,
}

impl FsWriteSkill {
    pub fn new(fs: WorkspaceFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl SkillBinding for FsWriteSkill {
    async fn invoke(&self, inputs: SkillInputs) -> SkillResult {
        let path = str_input(&inputs, "filePath");
        let content = str_input(&inputs, "content");
        let resolved = match self.fs.resolve(path) {
            Ok(p) => p,
            Err(e) => return SkillResult::failure(e),
        };
        if let Some(parent) = resolved.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return SkillResult::failure(format!("Create dir failed: {}", e));
            }
        }
        tracing::info!(path = %path, bytes = content.len(), "fs_write");
        match tokio::fs::write(&resolved, content).await {
            Ok(()) => SkillResult::ok_with("bytesWritten", content.len()),
            Err(e) => SkillResult::failure(format!("Write failed for {}: {}", path, e)),
        }
    }
}
