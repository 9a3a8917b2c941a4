//! 审批队列：高风险技能调用的持久化人工审批流程

pub mod queue;
pub mod store;
pub mod types;

pub use queue::ApprovalQueue;
pub use store::{ApprovalStore, FileApprovalStore, MemoryApprovalStore};
pub use types::{ApprovalError, ApprovalQueueItem, ApprovalStatus, Decision, ResolveOutcome};
