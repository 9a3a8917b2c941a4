//! shell_exec：白名单命令
//!
//! 命令首词由执行器按描述中的白名单检查；这里再拦截危险子串与 shell 元字符。
//! 不经过 shell：首词作为程序，其余按空白切分为参数，在工作区根目录执行，带自身超时。

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::skills::sandbox::find_shell_operator;
use crate::skills::{
    CostTier, ParamType, RiskTier, SandboxConstraints, SkillBinding, SkillCategory,
    SkillDescriptor, SkillInputs, SkillResult, TrustLevel,
};

/// 即使命令在白名单中也不允许出现的子串
const FORBIDDEN_SUBSTR: &[&str] = &[
    "rm -rf",
    "rm -fr",
    "rm -r",
    "wget ",
    "| sh",
    "| bash",
    "chmod 777",
    "chmod +s",
    "mkfs",
    "dd if=",
    "> /dev/sd",
    ":(){ :|:& };:",
];

/// 输出最大字符数
const MAX_OUTPUT_CHARS: usize = 8000;

pub fn shell_exec_descriptor(allowed_commands: Vec<String>) -> SkillDescriptor {
    SkillDescriptor::new("shell_exec", SkillCategory::Shell)
        .with_name("Run shell command")
        .with_description(format!(
            "Run a whitelisted shell command in the workspace. Allowed: {}.",
            allowed_commands.join(", ")
        ))
        .input("command", ParamType::String, true, "Command line; first word must be allowed")
        .output("stdout", ParamType::String)
        .output("stderr", ParamType::String)
        .output("exitCode", ParamType::Number)
        .with_risk(RiskTier::High)
        .with_cost(CostTier::Cheap)
        .with_min_trust(TrustLevel::BoundedAuto)
        .requiring_approval()
        .with_sandbox(SandboxConstraints::commands(allowed_commands, "command"))
}

pub struct ShellExecSkill {
    cwd: PathBuf,
    timeout: Duration,
}

impl ShellExecSkill {
    pub fn new(cwd: impl AsRef<Path>, timeout_secs: u64) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn check_forbidden(raw: &str) -> Result<(), String> {
        let lower = raw.to_lowercase();
        if let Some(f) = FORBIDDEN_SUBSTR.iter().find(|f| lower.contains(*f)) {
            return Err(format!("Forbidden pattern: {}", f));
        }
        match find_shell_operator(raw) {
            Some(op) => Err(format!("Shell operator '{}' is not supported", op.escape_default())),
            None => Ok(()),
        }
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() > MAX_OUTPUT_CHARS {
        s.chars().take(MAX_OUTPUT_CHARS).collect::<String>() + "\n...[truncated]"
    } else {
        s.to_string()
    }
}

#[async_trait]
impl SkillBinding for ShellExecSkill {
    async fn invoke(&self, inputs: SkillInputs) -> SkillResult {
        let command = inputs
            .get("command")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        if let Err(e) = Self::check_forbidden(&command) {
            return SkillResult::failure(e);
        }
        tracing::info!(command = %command, "shell_exec");

        let mut parts = command.split_whitespace();
        let Some(program) = parts.next() else {
            return SkillResult::failure("Empty command");
        };
        let mut cmd = Command::new(program);
        cmd.args(parts).current_dir(&self.cwd).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                return SkillResult::failure(format!(
                    "Command timed out after {}s",
                    self.timeout.as_secs()
                ))
            }
            Ok(Err(e)) => return SkillResult::failure(format!("Execution failed: {}", e)),
            Ok(Ok(o)) => o,
        };

        let stdout = truncate(&String::from_utf8_lossy(&output.stdout));
        let stderr = truncate(&String::from_utf8_lossy(&output.stderr));
        let code = output.status.code().unwrap_or(-1);
        let mut out = SkillInputs::new();
        out.insert("stdout".into(), stdout.into());
        out.insert("stderr".into(), stderr.clone().into());
        out.insert("exitCode".into(), code.into());
        if output.status.success() {
            SkillResult::ok(out)
        } else {
            SkillResult::failure(format!("Exit {}: {}", code, stderr.trim())).with_outputs(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_patterns() {
        assert!(ShellExecSkill::check_forbidden("ls -la").is_ok());
        assert!(ShellExecSkill::check_forbidden("find . | sh").is_err());
        assert!(ShellExecSkill::check_forbidden("RM -RF /").is_err());
        assert!(ShellExecSkill::check_forbidden("ls && touch x").is_err());
        assert!(ShellExecSkill::check_forbidden("echo `id`").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_in_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let skill = ShellExecSkill::new(dir.path(), 5);
        let mut inputs = SkillInputs::new();
        inputs.insert("command".into(), "ls".into());
        let r = skill.invoke(inputs).await;
        assert!(r.success, "{:?}", r.error);
        assert!(r.output_str("stdout").unwrap().contains("marker.txt"));

        let mut inputs = SkillInputs::new();
        inputs.insert("command".into(), "ls does-not-exist".into());
        let r = skill.invoke(inputs).await;
        assert!(!r.success);
        assert!(r.outputs.contains_key("exitCode"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_chained_command_does_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let target = outside.path().join("created");
        let skill = ShellExecSkill::new(dir.path(), 5);
        let mut inputs = SkillInputs::new();
        inputs.insert(
            "command".into(),
            format!("ls && touch {}", target.display()).into(),
        );
        let r = skill.invoke(inputs).await;
        assert!(!r.success);
        assert!(r.error.unwrap().contains("Shell operator"));
        assert!(!target.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_arguments_are_passed_without_shell_expansion() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        let skill = ShellExecSkill::new(dir.path(), 5);
        let mut inputs = SkillInputs::new();
        inputs.insert("command".into(), "ls *.txt".into());
        let r = skill.invoke(inputs).await;
        // 无 shell 时 *.txt 不会被展开
        assert!(!r.success);
    }
}
