//! 推理状态机阶段
//!
//! Planning -> (Acting -> Observing)? -> Planning ... -> Responding -> Done；
//! 步数耗尽或收到取消信号时直接进入 Done。

use serde::Serialize;

/// 引擎当前阶段（用于日志与进度投影）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnginePhase {
    Planning,
    Acting,
    Observing,
    Responding,
    Done,
}

impl EnginePhase {
    /// 合法的下一阶段
    pub fn can_transition_to(self, next: EnginePhase) -> bool {
        use EnginePhase::{Acting, Done, Observing, Planning, Responding};
        matches!(
            (self, next),
            (Planning, Acting)
                | (Planning, Responding)
                | (Planning, Planning)
                | (Planning, Done)
                | (Acting, Observing)
                | (Observing, Planning)
                | (Observing, Done)
                | (Responding, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == EnginePhase::Done
    }
}

/// 单次运行的内部计数（不跨运行共享）
#[derive(Clone, Debug)]
pub struct RunState {
    pub phase: EnginePhase,
    pub step: usize,
    pub llm_calls: usize,
    pub errors: usize,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            phase: EnginePhase::Planning,
            step: 1,
            llm_calls: 0,
            errors: 0,
        }
    }
}

impl RunState {
    /// 切换阶段；非法切换只记录告警，不中断运行
    pub fn enter(&mut self, next: EnginePhase) {
        if !self.phase.can_transition_to(next) {
            tracing::warn!(from = ?self.phase, to = ?next, "unexpected phase transition");
        }
        tracing::debug!(step = self.step, from = ?self.phase, to = ?next, "phase");
        self.phase = next;
    }
}
