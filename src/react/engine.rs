//! ReasoningEngine：有界的 Plan -> Act -> Observe 主循环
//!
//! 规划前先试快捷路径；每步先检查取消，再调用 Planner。带动作的步骤先过失败循环检测，再交给
//! SkillExecutor 执行，结果格式化为 Observation 写回 scratchpad。Planner 给出 respond 时合成最终回答
//! （strict 风格直接返回最后一次成功观察；否则调用 conversational_response，失败时退回最后的观察或思考）。
//! 只有规划失败会以 Err 返回；技能失败、循环、步数耗尽、取消都体现在结果里。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::config::EngineSection;
use crate::core::{AgentError, EnginePhase, ErrorCategory, ErrorClassifier, FailureKind, RunState};
use crate::llm::LlmClient;
use crate::react::context::{ReasoningContext, ReasoningResult, ResultMetadata};
use crate::react::events::{preview, ProgressEvent, ProgressSink};
use crate::react::fast_path::FastPath;
use crate::react::loop_detector::FailureLoopDetector;
use crate::react::observation::{ObservationFormatter, ObservationMode};
use crate::react::planner::{args_value, PlanStep, Planner, ResponseStyle, DEFAULT_SYSTEM_PROMPT};
use crate::react::scratchpad::{
    Observation, ObservationError, PlannedAction, Scratchpad, ScratchpadEntry,
};
use crate::skills::builtin::CONVERSATIONAL_RESPONSE;
use crate::skills::{ExecutionPolicy, SkillExecutor, SkillInputs, SkillResult, TrustLevel};
use crate::trust::TrustSource;

const NO_ANSWER: &str = "I could not reach an answer for this request.";

/// 引擎参数（通常来自 [engine] 配置段）
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub max_steps: usize,
    pub fast_path_enabled: bool,
    pub auto_approve: bool,
    pub observation_mode: ObservationMode,
    pub max_observation_chars: usize,
    pub loop_window: usize,
    pub loop_threshold: usize,
    pub planner_timeout: Duration,
    pub system_prompt: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&EngineSection::default())
    }
}

impl From<&EngineSection> for EngineOptions {
    fn from(c: &EngineSection) -> Self {
        Self {
            max_steps: c.max_steps.max(1),
            fast_path_enabled: c.fast_path_enabled,
            auto_approve: c.auto_approve,
            observation_mode: c.observation_mode,
            max_observation_chars: c.max_observation_chars,
            loop_window: c.loop_window,
            loop_threshold: c.loop_threshold,
            planner_timeout: Duration::from_secs(c.planner_timeout_secs),
            system_prompt: c
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }
}

/// 单次运行内共享的只读参数
struct RunScope<'a> {
    goal: &'a str,
    trust: TrustLevel,
    policy: Option<ExecutionPolicy>,
    progress: &'a ProgressSink,
}

pub struct ReasoningEngine {
    planner: Planner,
    executor: Arc<SkillExecutor>,
    trust: Arc<dyn TrustSource>,
    detector: FailureLoopDetector,
    classifier: ErrorClassifier,
    formatter: ObservationFormatter,
    fast_path: FastPath,
    options: EngineOptions,
}

impl ReasoningEngine {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: Arc<SkillExecutor>,
        trust: Arc<dyn TrustSource>,
        options: EngineOptions,
    ) -> Self {
        Self {
            planner: Planner::new(llm, options.system_prompt.clone(), options.planner_timeout),
            executor,
            trust,
            detector: FailureLoopDetector::new(options.loop_window, options.loop_threshold),
            classifier: ErrorClassifier::new(),
            formatter: ObservationFormatter::new(
                options.observation_mode,
                options.max_observation_chars,
            ),
            fast_path: FastPath::builtin(),
            options,
        }
    }

    pub fn with_fast_path(mut self, fast_path: FastPath) -> Self {
        self.fast_path = fast_path;
        self
    }

    pub fn executor(&self) -> &Arc<SkillExecutor> {
        &self.executor
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub async fn run(
        &self,
        goal: &str,
        context: &ReasoningContext,
        progress: ProgressSink,
    ) -> Result<ReasoningResult, AgentError> {
        self.run_cancellable(goal, context, progress, CancellationToken::new())
            .await
    }

    pub async fn run_cancellable(
        &self,
        goal: &str,
        context: &ReasoningContext,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<ReasoningResult, AgentError> {
        let start = Instant::now();
        let scope = RunScope {
            goal,
            trust: self.trust.current().await,
            policy: context.effective_policy(),
            progress: &progress,
        };
        tracing::info!(goal = %goal, trust = %scope.trust, user = %context.user_id, "reasoning run started");

        if self.options.fast_path_enabled {
            if let Some(result) = self.try_fast_path(&scope, start).await {
                return Ok(result);
            }
        }

        let skills: Vec<_> = self
            .executor
            .registry()
            .list_available(scope.trust)
            .into_iter()
            .filter(|d| d.id != CONVERSATIONAL_RESPONSE)
            .collect();
        let identity = identity_line(context);

        let mut state = RunState::default();
        let mut pad = Scratchpad::new();
        let mut meta = ResultMetadata {
            trust_level: scope.trust,
            ..ResultMetadata::default()
        };
        let mut final_text = None;

        while state.step <= self.options.max_steps {
            if cancel.is_cancelled() {
                tracing::info!(step = state.step, "reasoning run cancelled");
                meta.cancelled = true;
                break;
            }
            state.enter(EnginePhase::Planning);
            state.llm_calls += 1;
            let plan = match self
                .planner
                .plan(state.step, goal, &pad, &skills, context, &identity)
                .await
            {
                Ok(plan) => plan,
                Err(e) => {
                    tracing::error!(step = state.step, error = %e, "planning failed");
                    progress.emit(ProgressEvent::Error {
                        step: state.step,
                        text: e.to_string(),
                    });
                    return Err(e);
                }
            };
            progress.emit(ProgressEvent::Thought {
                step: state.step,
                text: plan.thought.clone(),
            });
            let mut entry = ScratchpadEntry::new(state.step, plan.thought.clone());

            let action = match (&plan.action, plan.respond) {
                (Some(action), false) => action.clone(),
                _ => {
                    pad.append(entry);
                    state.enter(EnginePhase::Responding);
                    let text = self.respond(&scope, &plan, &pad, &mut state, &mut meta).await;
                    final_text = Some(text);
                    break;
                }
            };

            state.enter(EnginePhase::Acting);
            tracing::info!(step = state.step, skill = %action.skill, "action");
            progress.emit(ProgressEvent::Action {
                step: state.step,
                skill: action.skill.clone(),
                args: args_value(&action.args),
            });
            let observation = self.act(&scope, &action, &pad, &mut state).await;

            state.enter(EnginePhase::Observing);
            progress.emit(ProgressEvent::Observation {
                step: state.step,
                skill: action.skill.clone(),
                success: observation.success,
                preview: preview(&observation.text),
            });
            entry.action = Some(action);
            entry.observation = Some(observation);
            pad.append(entry);
            state.step += 1;
        }

        let final_text = match final_text {
            Some(text) => text,
            None => {
                if !meta.cancelled {
                    meta.max_steps_reached = true;
                    tracing::warn!(max_steps = self.options.max_steps, "max steps reached");
                }
                best_partial(&pad, None)
            }
        };
        state.enter(EnginePhase::Done);

        meta.steps_executed = pad.len();
        meta.llm_calls = state.llm_calls;
        meta.errors = state.errors;
        meta.duration_ms = start.elapsed().as_millis() as u64;
        progress.emit(ProgressEvent::Completion {
            text: final_text.clone(),
            steps: meta.steps_executed,
            max_steps_reached: meta.max_steps_reached,
        });
        tracing::info!(
            steps = meta.steps_executed,
            llm_calls = meta.llm_calls,
            errors = meta.errors,
            duration_ms = meta.duration_ms,
            "reasoning run finished"
        );
        Ok(ReasoningResult {
            goal: goal.to_string(),
            final_text,
            scratchpad: pad.into_entries(),
            metadata: meta,
        })
    }

    /// 快捷路径；技能失败时返回 None，回到正常循环
    async fn try_fast_path(&self, scope: &RunScope<'_>, start: Instant) -> Option<ReasoningResult> {
        let intent = self.fast_path.find(scope.goal)?;
        tracing::info!(skill = %intent.skill, "fast path matched");
        let result = self
            .executor
            .execute_skill(
                &intent.skill,
                intent.args.clone(),
                scope.trust,
                self.options.auto_approve,
                scope.policy.as_ref(),
            )
            .await;
        if !result.success {
            tracing::info!(skill = %intent.skill, error = ?result.error, "fast path failed, falling back to planning");
            return None;
        }
        let text = intent
            .output
            .as_deref()
            .and_then(|name| result.output_str(name))
            .map(str::to_string)
            .unwrap_or_else(|| ObservationFormatter::content(&result));
        scope.progress.emit(ProgressEvent::FastPath {
            skill: intent.skill.clone(),
        });
        scope.progress.emit(ProgressEvent::Completion {
            text: text.clone(),
            steps: 0,
            max_steps_reached: false,
        });
        Some(ReasoningResult {
            goal: scope.goal.to_string(),
            final_text: text,
            scratchpad: Vec::new(),
            metadata: ResultMetadata {
                fast_path_used: true,
                duration_ms: start.elapsed().as_millis() as u64,
                trust_level: scope.trust,
                ..ResultMetadata::default()
            },
        })
    }

    /// 执行一个动作（或被循环检测拦截），返回观察
    async fn act(
        &self,
        scope: &RunScope<'_>,
        action: &PlannedAction,
        pad: &Scratchpad,
        state: &mut RunState,
    ) -> Observation {
        let check = self.detector.detect(pad.entries(), action);
        if check.is_loop {
            state.errors += 1;
            let suggestion = check.suggestion.unwrap_or_default();
            let category = pad
                .entries()
                .iter()
                .rev()
                .filter(|e| e.action.as_ref().is_some_and(|a| a.skill == action.skill))
                .find_map(|e| e.observation.as_ref().and_then(|o| o.error.as_ref()))
                .map(|err| err.category)
                .unwrap_or(ErrorCategory::Unknown);
            return Observation {
                text: format!("Loop detected, '{}' was not executed. {}", action.skill, suggestion),
                success: false,
                error: Some(ObservationError {
                    message: format!("loop detected after {} repetitions", check.repetitions),
                    category,
                    suggestions: vec![suggestion],
                }),
                content: String::new(),
                loop_detected: true,
            };
        }

        let result = self
            .executor
            .execute_skill(
                &action.skill,
                action.args.clone(),
                scope.trust,
                self.options.auto_approve,
                scope.policy.as_ref(),
            )
            .await;
        self.observe(&action.skill, &result, state)
    }

    fn observe(&self, skill: &str, result: &SkillResult, state: &mut RunState) -> Observation {
        let mut text = self.formatter.format(skill, result);
        let content = ObservationFormatter::content(result);
        if result.success {
            return Observation {
                text,
                success: true,
                error: None,
                content,
                loop_detected: false,
            };
        }

        let message = result.error.clone().unwrap_or_default();
        let classification = self.classifier.classify(result.failure.as_ref(), &message);
        match &result.failure {
            Some(FailureKind::ApprovalRequired { approval_id }) => {
                text = format!(
                    "Awaiting approval: '{}' was queued as {} and has not run yet.",
                    skill, approval_id
                );
            }
            _ => state.errors += 1,
        }
        text.push_str("\nSuggestions:");
        for s in &classification.suggestions {
            text.push_str(&format!("\n- {}", s));
        }
        Observation {
            text,
            success: false,
            error: Some(ObservationError {
                message,
                category: classification.category,
                suggestions: classification.suggestions,
            }),
            content,
            loop_detected: false,
        }
    }

    /// 合成最终回答
    async fn respond(
        &self,
        scope: &RunScope<'_>,
        plan: &PlanStep,
        pad: &Scratchpad,
        state: &mut RunState,
        meta: &mut ResultMetadata,
    ) -> String {
        if plan.response_style == ResponseStyle::Strict {
            if let Some(obs) = pad.last_success() {
                meta.verbatim_short_circuit = true;
                return obs.content.clone();
            }
        }

        if self.executor.registry().lookup(CONVERSATIONAL_RESPONSE).is_some() {
            let inputs: SkillInputs = json!({
                "goal": scope.goal,
                "thought": plan.thought,
                "observations": pad.observation_texts(),
                "style": plan.response_style.as_str(),
            })
            .as_object()
            .cloned()
            .unwrap_or_default();
            state.llm_calls += 1;
            let result = self
                .executor
                .execute_skill(
                    CONVERSATIONAL_RESPONSE,
                    inputs,
                    scope.trust,
                    true,
                    scope.policy.as_ref(),
                )
                .await;
            match result.output_str("response") {
                Some(text) if result.success => return text.to_string(),
                _ => tracing::warn!(error = ?result.error, "compose answer failed, using fallback"),
            }
        }
        best_partial(pad, Some(&plan.thought))
    }
}

/// 最佳部分答案：最后一次成功观察的内容，其次最后的思考
fn best_partial(pad: &Scratchpad, thought: Option<&str>) -> String {
    pad.last_success()
        .map(|o| o.content.clone())
        .filter(|c| !c.trim().is_empty())
        .or_else(|| thought.filter(|t| !t.trim().is_empty()).map(str::to_string))
        .or_else(|| pad.last_thought().map(str::to_string))
        .unwrap_or_else(|| NO_ANSWER.to_string())
}

fn identity_line(context: &ReasoningContext) -> String {
    let mut line = String::new();
    if !context.user_id.is_empty() {
        line.push_str(&format!("You are assisting user '{}'.", context.user_id));
    }
    if let Some(role) = &context.role {
        line.push_str(&format!(" Their role is '{}'.", role));
    }
    line
}
