//! 核心层：错误类型、失败分类、推理状态机阶段、运行时组装

pub mod builder;
pub mod error;
pub mod recovery;
pub mod state;

pub use builder::{build_runtime, create_llm_from_config, Runtime};
pub use error::{AgentError, FailureKind};
pub use recovery::{ErrorCategory, ErrorClassification, ErrorClassifier};
pub use state::{EnginePhase, RunState};
