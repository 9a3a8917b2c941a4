//! 推理层：Planner、Scratchpad、失败循环检测、观察渲染、快捷路径与 ReasoningEngine 主循环

pub mod context;
pub mod engine;
pub mod events;
pub mod fast_path;
pub mod loop_detector;
pub mod observation;
pub mod planner;
pub mod scratchpad;

pub use context::{ReasoningContext, ReasoningResult, ResultMetadata};
pub use engine::{EngineOptions, ReasoningEngine};
pub use events::{ProgressEvent, ProgressSink};
pub use fast_path::{FastPath, VerbatimIntent};
pub use loop_detector::{FailureLoopDetector, LoopCheck};
pub use observation::{ObservationFormatter, ObservationMode};
pub use planner::{parse_plan, PlanStep, Planner, ResponseStyle};
pub use scratchpad::{Observation, ObservationError, PlannedAction, Scratchpad, ScratchpadEntry};
