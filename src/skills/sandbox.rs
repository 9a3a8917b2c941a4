//! 沙箱校验：输入校验、路径白名单、命令白名单
//!
//! 全部是无状态函数。路径按词法解析（不访问文件系统），所以尚不存在的写入目标也能校验；
//! 任何 `..` 逃逸到 root 之外的路径一律拒绝。

use std::path::{Component, Path, PathBuf};

use crate::skills::{SkillDescriptor, SkillInputs};

/// 按描述校验输入：必填项存在（null 视为缺失）、类型匹配、自定义校验通过；遇到第一个错误即返回
pub fn validate_inputs(descriptor: &SkillDescriptor, inputs: &SkillInputs) -> Result<(), String> {
    for param in &descriptor.inputs {
        let value = inputs.get(&param.name).filter(|v| !v.is_null());
        let Some(value) = value else {
            if param.required {
                return Err(format!(
                    "Missing required input '{}' for skill '{}'",
                    param.name, descriptor.id
                ));
            }
            continue;
        };
        if !param.ty.matches(value) {
            return Err(format!(
                "Invalid input '{}' for skill '{}': expected type {}, got {}",
                param.name,
                descriptor.id,
                param.ty.as_str(),
                json_type_name(value)
            ));
        }
        if let Some(validator) = &param.validator {
            validator(value).map_err(|e| {
                format!(
                    "Invalid input '{}' for skill '{}': {}",
                    param.name, descriptor.id, e
                )
            })?;
        }
    }
    Ok(())
}

fn json_type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// 词法规范化：去掉 `.`，`..` 弹出上一级；越过根时返回 None
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for comp in path.components() {
        match comp {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                out.pop();
                depth -= 1;
            }
            Component::Normal(seg) => {
                out.push(seg);
                depth += 1;
            }
        }
    }
    Some(out)
}

/// 将 path 相对 root 解析为绝对路径；结果不在 root 下时返回 None
pub fn resolve_path(path: &str, root: &Path) -> Option<PathBuf> {
    let root = normalize(root)?;
    let candidate = Path::new(path.trim());
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    let resolved = normalize(&joined)?;
    if resolved.starts_with(&root) {
        Some(resolved)
    } else {
        None
    }
}

/// 路径是否在 root 内，且以任一白名单前缀（同样相对 root 解析）开头
pub fn is_path_allowed(path: &str, allow_list: &[String], root: &Path) -> bool {
    let Some(resolved) = resolve_path(path, root) else {
        tracing::warn!(path = %path, "path escapes sandbox root");
        return false;
    };
    allow_list.iter().any(|prefix| {
        resolve_path(prefix, root)
            .map(|p| resolved.starts_with(p))
            .unwrap_or(false)
    })
}

/// 命令行中会被 shell 解释的字符；命令不经 shell 执行，出现即拒绝
const SHELL_METACHARS: &[char] = &[';', '&', '|', '$', '`', '>', '<', '(', ')', '\n', '\r'];

/// 返回命令中第一个 shell 元字符
pub fn find_shell_operator(command: &str) -> Option<char> {
    command.chars().find(|c| SHELL_METACHARS.contains(c))
}

/// 命令首词必须逐字出现在白名单中（不做 glob / 正则），且不含 shell 元字符
pub fn is_command_allowed(command: &str, whitelist: &[String]) -> bool {
    if find_shell_operator(command).is_some() {
        return false;
    }
    match command.split_whitespace().next() {
        Some(name) => whitelist.iter().any(|w| w == name),
        None => false,
    }
}

/// 按描述中的沙箱约束检查输入；返回第一条违规描述
pub fn check_sandbox(
    descriptor: &SkillDescriptor,
    inputs: &SkillInputs,
    root: &Path,
) -> Result<(), String> {
    let Some(sandbox) = &descriptor.sandbox else {
        return Ok(());
    };
    for name in &sandbox.path_inputs {
        if let Some(path) = inputs.get(name).and_then(|v| v.as_str()) {
            if !is_path_allowed(path, &sandbox.allowed_paths, root) {
                return Err(format!(
                    "Path '{}' is outside the allowed directories for skill '{}'",
                    path, descriptor.id
                ));
            }
        }
    }
    if let Some(name) = &sandbox.command_input {
        if let Some(command) = inputs.get(name).and_then(|v| v.as_str()) {
            if let Some(op) = find_shell_operator(command) {
                return Err(format!(
                    "Shell operator '{}' is not allowed in commands for skill '{}'",
                    op.escape_default(),
                    descriptor.id
                ));
            }
            if !is_command_allowed(command, &sandbox.allowed_commands) {
                let head = command.split_whitespace().next().unwrap_or("");
                return Err(format!(
                    "Command '{}' not in allowlist for skill '{}'",
                    head, descriptor.id
                ));
            }
        }
    }
    Ok(())
}
