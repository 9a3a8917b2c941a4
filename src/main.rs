//! Cortex 演示入口
//!
//! 用法：
//! ```text
//! cortex [--config PATH] <goal...>      运行一次推理并输出最终回答
//! cortex [--config PATH] --pending      列出待审批条目
//! cortex [--config PATH] --approve ID   批准并执行
//! cortex [--config PATH] --reject ID    拒绝
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context};
use cortex::approval::Decision;
use cortex::config::load_config;
use cortex::core::{build_runtime, create_llm_from_config};
use cortex::observability;
use cortex::react::{ProgressEvent, ProgressSink, ReasoningContext};

enum Command {
    Run(String),
    Pending,
    Resolve(String, Decision),
}

fn parse_args() -> anyhow::Result<(Option<PathBuf>, Command)> {
    let mut args = std::env::args().skip(1);
    let mut config_path = None;
    let mut goal = Vec::new();
    let mut command = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_path = Some(PathBuf::from(args.next().context("--config needs a path")?)),
            "--pending" => command = Some(Command::Pending),
            "--approve" => {
                command = Some(Command::Resolve(
                    args.next().context("--approve needs an id")?,
                    Decision::Approve,
                ))
            }
            "--reject" => {
                command = Some(Command::Resolve(
                    args.next().context("--reject needs an id")?,
                    Decision::Reject,
                ))
            }
            _ => goal.push(arg),
        }
    }
    let command = match command {
        Some(c) => c,
        None if !goal.is_empty() => Command::Run(goal.join(" ")),
        None => bail!("usage: cortex [--config PATH] (<goal...> | --pending | --approve ID | --reject ID)"),
    };
    Ok((config_path, command))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let (config_path, command) = parse_args()?;
    let cfg = load_config(config_path).context("Failed to load config")?;
    let llm = create_llm_from_config(&cfg);
    let rt = build_runtime(&cfg, llm).context("Failed to build runtime")?;

    match command {
        Command::Pending => {
            let pending = rt.approvals.list_pending().await?;
            if pending.is_empty() {
                println!("No pending approvals.");
            }
            for item in pending {
                println!(
                    "{}  {}  risk={:?}  inputs={}",
                    item.id,
                    item.skill_id,
                    item.risk,
                    serde_json::Value::Object(item.inputs)
                );
            }
        }
        Command::Resolve(id, decision) => {
            let outcome = rt.approvals.resolve(&id, decision, "cli").await?;
            println!("{} -> {}", outcome.item.id, outcome.item.status);
            if let Some(result) = outcome.result {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
        }
        Command::Run(goal) => {
            let (progress, mut rx) = ProgressSink::channel(cfg.engine.progress_buffer);
            let printer = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    match ev {
                        ProgressEvent::Thought { step, text } => eprintln!("[{}] thought: {}", step, text),
                        ProgressEvent::Action { step, skill, args } => {
                            eprintln!("[{}] action: {} {}", step, skill, args)
                        }
                        ProgressEvent::Observation { step, preview, .. } => {
                            eprintln!("[{}] observation: {}", step, preview)
                        }
                        ProgressEvent::Error { step, text } => eprintln!("[{}] error: {}", step, text),
                        _ => {}
                    }
                }
            });
            let context = ReasoningContext::for_user("cli");
            let result = rt.engine.run(&goal, &context, progress).await;
            let _ = printer.await;
            let result = result.context("Reasoning failed")?;
            println!("{}", result.final_text);
            tracing::info!(metadata = ?result.metadata, "done");
        }
    }
    Ok(())
}
