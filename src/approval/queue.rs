//! 审批队列
//!
//! 首次访问时从持久化存储懒加载索引，之后写穿（先落盘、再更新内存）。
//! resolve 在锁内做 check-then-set，保证同一条目上的技能最多执行一次；
//! 技能本身在释放锁之后执行，慢技能不会阻塞其它审批操作。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tokio::sync::{Mutex, MutexGuard};

use crate::approval::{
    ApprovalError, ApprovalQueueItem, ApprovalStatus, ApprovalStore, Decision, ResolveOutcome,
};
use crate::audit::{AuditCategory, AuditEvent, AuditLevel, AuditSink};
use crate::core::FailureKind;
use crate::skills::executor::{audit_skill_outcome, invoke_bounded, SkillTimeouts};
use crate::skills::{OutputFilter, SkillDescriptor, SkillInputs, SkillRegistry, SkillResult};

type Index = HashMap<String, ApprovalQueueItem>;

pub struct ApprovalQueue {
    store: Arc<dyn ApprovalStore>,
    registry: Arc<SkillRegistry>,
    audit: Arc<dyn AuditSink>,
    timeouts: SkillTimeouts,
    output_filter: Option<Arc<dyn OutputFilter>>,
    /// None 表示尚未从存储加载
    index: Mutex<Option<Index>>,
}

impl ApprovalQueue {
    pub fn new(
        store: Arc<dyn ApprovalStore>,
        registry: Arc<SkillRegistry>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            registry,
            audit,
            timeouts: SkillTimeouts::default(),
            output_filter: None,
            index: Mutex::new(None),
        }
    }

    pub fn with_timeouts(mut self, timeouts: SkillTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// 审批通过后的执行结果按审批人角色过滤
    pub fn with_output_filter(mut self, filter: Arc<dyn OutputFilter>) -> Self {
        self.output_filter = Some(filter);
        self
    }

    /// 取得已加载的索引锁
    async fn index(&self) -> Result<MutexGuard<'_, Option<Index>>, ApprovalError> {
        let mut guard = self.index.lock().await;
        if guard.is_none() {
            let items = self.store.load_all()?;
            tracing::info!(count = items.len(), "approval queue hydrated");
            *guard = Some(items.into_iter().map(|i| (i.id.clone(), i)).collect());
        }
        Ok(guard)
    }

    /// 入队：生成新 id，落盘后对 list_pending 可见
    pub async fn enqueue(
        &self,
        skill_id: &str,
        inputs: SkillInputs,
        descriptor: &SkillDescriptor,
    ) -> Result<String, ApprovalError> {
        let item = ApprovalQueueItem::new(skill_id, inputs, descriptor);
        let mut guard = self.index().await?;
        self.store.save(&item)?;
        let id = item.id.clone();
        self.audit.record(AuditEvent::new(
            AuditLevel::Info,
            AuditCategory::Approval,
            "approval_enqueued",
            "system",
            json!({ "id": id, "skill": skill_id, "risk": item.risk }),
        ));
        guard.get_or_insert_with(HashMap::new).insert(id.clone(), item);
        tracing::info!(id = %id, skill = %skill_id, "skill call queued for approval");
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Result<Option<ApprovalQueueItem>, ApprovalError> {
        let mut guard = self.index().await?;
        Ok(guard.get_or_insert_with(HashMap::new).get(id).cloned())
    }

    /// 待审批条目（按提交时间排序）
    pub async fn list_pending(&self) -> Result<Vec<ApprovalQueueItem>, ApprovalError> {
        let mut items: Vec<ApprovalQueueItem> = self
            .list_all()
            .await?
            .into_iter()
            .filter(|i| i.is_pending())
            .collect();
        items.sort_by_key(|i| i.submitted_at);
        Ok(items)
    }

    /// 全部条目，含历史记录
    pub async fn list_all(&self) -> Result<Vec<ApprovalQueueItem>, ApprovalError> {
        let mut guard = self.index().await?;
        let mut items: Vec<ApprovalQueueItem> =
            guard.get_or_insert_with(HashMap::new).values().cloned().collect();
        items.sort_by_key(|i| i.submitted_at);
        Ok(items)
    }

    /// 人工决定。已决定的条目返回 AlreadyResolved 且不做任何修改；
    /// approve 时在锁外执行绑定的技能并返回其结果。
    pub async fn resolve(
        &self,
        id: &str,
        decision: Decision,
        actor: &str,
    ) -> Result<ResolveOutcome, ApprovalError> {
        let updated = {
            let mut guard = self.index().await?;
            let index = guard.get_or_insert_with(HashMap::new);
            let current = index
                .get(id)
                .ok_or_else(|| ApprovalError::NotFound(id.to_string()))?;
            if current.status != ApprovalStatus::Pending {
                tracing::warn!(id = %id, status = %current.status, "approval already resolved");
                return Err(ApprovalError::AlreadyResolved {
                    id: id.to_string(),
                    status: current.status,
                });
            }
            let mut updated = current.clone();
            updated.status = decision.status();
            updated.resolved_at = Some(chrono::Utc::now().timestamp_millis());
            updated.resolved_by = Some(actor.to_string());
            // 落盘失败时内存保持 pending
            self.store.save(&updated)?;
            index.insert(id.to_string(), updated.clone());
            updated
        };

        self.audit.record(AuditEvent::new(
            AuditLevel::Info,
            AuditCategory::Approval,
            "approval_resolved",
            actor,
            json!({ "id": id, "skill": updated.skill_id, "status": updated.status }),
        ));

        if decision == Decision::Reject {
            return Ok(ResolveOutcome {
                item: updated,
                result: None,
            });
        }

        let result = self.run_approved(&updated).await;
        Ok(ResolveOutcome {
            item: updated,
            result: Some(result),
        })
    }

    async fn run_approved(&self, item: &ApprovalQueueItem) -> SkillResult {
        let (Some(descriptor), Some(binding)) = (
            self.registry.lookup(&item.skill_id),
            self.registry.binding(&item.skill_id),
        ) else {
            return SkillResult::rejected(
                FailureKind::NotFound,
                format!("Skill not found: {}", item.skill_id),
            );
        };
        let actor = item.resolved_by.as_deref().unwrap_or("unknown");
        let start = Instant::now();
        let limit = self.timeouts.for_risk(descriptor.risk);
        let mut result = invoke_bounded(&item.skill_id, binding, item.inputs.clone(), limit).await;
        if let Some(filter) = &self.output_filter {
            filter.filter(&item.skill_id, actor, &mut result.outputs);
        }
        audit_skill_outcome(
            self.audit.as_ref(),
            &item.skill_id,
            &item.inputs,
            &result,
            None,
            actor,
            start.elapsed().as_millis() as u64,
        );
        let level = if result.success {
            AuditLevel::Info
        } else {
            AuditLevel::Error
        };
        self.audit.record(AuditEvent::new(
            level,
            AuditCategory::Approval,
            "approval_executed",
            actor,
            json!({
                "id": item.id,
                "skill": item.skill_id,
                "success": result.success,
                "error": result.error,
            }),
        ));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{FileApprovalStore, MemoryApprovalStore};
    use crate::audit::MemoryAuditSink;
    use crate::skills::{RedactingFilter, RiskTier, SkillCategory};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// 可切换为写入失败的内存存储
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryApprovalStore,
        failing: AtomicBool,
    }

    impl ApprovalStore for FlakyStore {
        fn load_all(&self) -> Result<Vec<ApprovalQueueItem>, ApprovalError> {
            self.inner.load_all()
        }

        fn save(&self, item: &ApprovalQueueItem) -> Result<(), ApprovalError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ApprovalError::Storage("disk full".to_string()));
            }
            self.inner.save(item)
        }
    }

    fn descriptor() -> SkillDescriptor {
        SkillDescriptor::new("fs_write", SkillCategory::Filesystem)
            .with_name("Write file")
            .with_risk(RiskTier::High)
            .requiring_approval()
    }

    fn registry(calls: Arc<AtomicUsize>) -> Arc<SkillRegistry> {
        let mut r = SkillRegistry::new();
        r.register(descriptor(), move |inputs: SkillInputs| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                SkillResult::ok_with("written", inputs.get("filePath").cloned().unwrap_or_default())
            }
        });
        Arc::new(r)
    }

    fn queue(store: Arc<dyn ApprovalStore>, calls: Arc<AtomicUsize>) -> ApprovalQueue {
        ApprovalQueue::new(store, registry(calls), Arc::new(MemoryAuditSink::new()))
    }

    fn inputs() -> SkillInputs {
        json!({"filePath": "out/a.txt"}).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_approve_runs_skill_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let q = queue(Arc::new(MemoryApprovalStore::new()), calls.clone());
        let id = q.enqueue("fs_write", inputs(), &descriptor()).await.unwrap();
        assert_eq!(q.list_pending().await.unwrap().len(), 1);

        let out = q.resolve(&id, Decision::Approve, "alice").await.unwrap();
        let result = out.result.unwrap();
        assert!(result.success);
        assert_eq!(result.outputs["written"], "out/a.txt");
        assert_eq!(out.item.status, ApprovalStatus::Approved);
        assert_eq!(out.item.resolved_by.as_deref(), Some("alice"));
        assert!(q.list_pending().await.unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_resolve_fails_without_changes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let q = queue(Arc::new(MemoryApprovalStore::new()), calls.clone());
        let id = q.enqueue("fs_write", inputs(), &descriptor()).await.unwrap();
        q.resolve(&id, Decision::Approve, "alice").await.unwrap();
        let before = q.get(&id).await.unwrap().unwrap();

        let err = q.resolve(&id, Decision::Reject, "bob").await.unwrap_err();
        assert!(matches!(err, ApprovalError::AlreadyResolved { status: ApprovalStatus::Approved, .. }));
        let after = q.get(&id).await.unwrap().unwrap();
        assert_eq!(before, after);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reject_does_not_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let q = queue(Arc::new(MemoryApprovalStore::new()), calls.clone());
        let id = q.enqueue("fs_write", inputs(), &descriptor()).await.unwrap();
        let out = q.resolve(&id, Decision::Reject, "alice").await.unwrap();
        assert!(out.result.is_none());
        assert_eq!(out.item.status, ApprovalStatus::Rejected);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            q.resolve("appr_missing", Decision::Approve, "alice").await,
            Err(ApprovalError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_resolves_execute_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let q = Arc::new(queue(Arc::new(MemoryApprovalStore::new()), calls.clone()));
        let id = q.enqueue("fs_write", inputs(), &descriptor()).await.unwrap();

        let mut handles = Vec::new();
        for n in 0..8 {
            let q = q.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                q.resolve(&id, Decision::Approve, &format!("user{}", n)).await.is_ok()
            }));
        }
        let mut ok = 0;
        for h in handles {
            if h.await.unwrap() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_queue_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let id = {
            let q = queue(Arc::new(FileApprovalStore::new(dir.path())), calls.clone());
            q.enqueue("fs_write", inputs(), &descriptor()).await.unwrap()
        };

        let q = queue(Arc::new(FileApprovalStore::new(dir.path())), calls.clone());
        let pending = q.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].skill_name, "Write file");

        q.resolve(&id, Decision::Approve, "alice").await.unwrap();
        let q2 = queue(Arc::new(FileApprovalStore::new(dir.path())), calls.clone());
        assert!(q2.list_pending().await.unwrap().is_empty());
        assert_eq!(
            q2.get(&id).await.unwrap().unwrap().status,
            ApprovalStatus::Approved
        );
    }

    #[tokio::test]
    async fn test_failed_persist_keeps_item_pending() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(FlakyStore::default());
        let q = queue(store.clone(), calls.clone());
        let id = q.enqueue("fs_write", inputs(), &descriptor()).await.unwrap();

        store.failing.store(true, Ordering::SeqCst);
        let err = q.resolve(&id, Decision::Approve, "alice").await.unwrap_err();
        assert!(matches!(err, ApprovalError::Storage(_)));
        let item = q.get(&id).await.unwrap().unwrap();
        assert_eq!(item.status, ApprovalStatus::Pending);
        assert!(item.resolved_by.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        store.failing.store(false, Ordering::SeqCst);
        let out = q.resolve(&id, Decision::Approve, "alice").await.unwrap();
        assert!(out.result.unwrap().success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_approved_run_is_filtered_and_audited() {
        let mut r = SkillRegistry::new();
        r.register(descriptor(), |_inputs: SkillInputs| async {
            SkillResult::ok_with("token", "secret-value")
        });
        let audit = Arc::new(MemoryAuditSink::new());
        let q = ApprovalQueue::new(Arc::new(MemoryApprovalStore::new()), Arc::new(r), audit.clone())
            .with_output_filter(Arc::new(RedactingFilter::new(
                vec!["token".into()],
                vec!["owner".into()],
            )));
        let id = q.enqueue("fs_write", inputs(), &descriptor()).await.unwrap();

        let out = q.resolve(&id, Decision::Approve, "cli").await.unwrap();
        assert_eq!(out.result.unwrap().outputs["token"], crate::skills::policy::REDACTED);
        assert_eq!(audit.count("skill_executed"), 1);
        assert_eq!(audit.count("approval_executed"), 1);
        let executed = audit
            .events()
            .into_iter()
            .find(|e| e.event == "skill_executed")
            .unwrap();
        assert_eq!(executed.actor, "cli");
        assert_eq!(executed.details["inputs"]["filePath"], "out/a.txt");
        assert_eq!(executed.details["outputs"]["token"], crate::skills::policy::REDACTED);
    }
}
