//! 审批条目持久化
//!
//! FileApprovalStore：每个条目一个 JSON 文件 `<dir>/<id>.json`，先写临时文件并 fsync 再 rename，
//! 崩溃时不会留下半截记录。MemoryApprovalStore 用于测试与临时部署。

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::approval::{ApprovalError, ApprovalQueueItem};

/// 持久化接口：整体加载 + 单条写入（覆盖）
pub trait ApprovalStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<ApprovalQueueItem>, ApprovalError>;
    fn save(&self, item: &ApprovalQueueItem) -> Result<(), ApprovalError>;
}

/// 目录型存储
#[derive(Debug, Clone)]
pub struct FileApprovalStore {
    dir: PathBuf,
}

impl FileApprovalStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn item_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

impl ApprovalStore for FileApprovalStore {
    fn load_all(&self) -> Result<Vec<ApprovalQueueItem>, ApprovalError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| ApprovalError::Storage(format!("read {}: {}", self.dir.display(), e)))?;
        let mut items = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|s| {
                    serde_json::from_str::<ApprovalQueueItem>(&s).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable approval record"),
            }
        }
        tracing::debug!(count = items.len(), dir = %self.dir.display(), "approval records loaded");
        Ok(items)
    }

    fn save(&self, item: &ApprovalQueueItem) -> Result<(), ApprovalError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| ApprovalError::Storage(format!("create {}: {}", self.dir.display(), e)))?;
        let target = self.item_path(&item.id);
        let tmp = self.dir.join(format!(".{}.json.tmp", item.id));
        let body = serde_json::to_vec_pretty(item)
            .map_err(|e| ApprovalError::Storage(format!("serialize {}: {}", item.id, e)))?;

        let write = || -> std::io::Result<()> {
            let mut f = std::fs::File::create(&tmp)?;
            f.write_all(&body)?;
            f.sync_all()?;
            std::fs::rename(&tmp, &target)
        };
        write().map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            ApprovalError::Storage(format!("write {}: {}", target.display(), e))
        })
    }
}

/// 内存存储
#[derive(Debug, Default)]
pub struct MemoryApprovalStore {
    items: Mutex<HashMap<String, ApprovalQueueItem>>,
}

impl MemoryApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ApprovalStore for MemoryApprovalStore {
    fn load_all(&self) -> Result<Vec<ApprovalQueueItem>, ApprovalError> {
        let items = self
            .items
            .lock()
            .map_err(|_| ApprovalError::Storage("memory store lock poisoned".to_string()))?;
        Ok(items.values().cloned().collect())
    }

    fn save(&self, item: &ApprovalQueueItem) -> Result<(), ApprovalError> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| ApprovalError::Storage("memory store lock poisoned".to_string()))?;
        items.insert(item.id.clone(), item.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalStatus;
    use crate::skills::{SkillCategory, SkillDescriptor, SkillInputs};

    fn item() -> ApprovalQueueItem {
        let d = SkillDescriptor::new("fs_write", SkillCategory::Filesystem);
        ApprovalQueueItem::new("fs_write", SkillInputs::new(), &d)
    }

    #[test]
    fn test_file_store_roundtrip_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileApprovalStore::new(dir.path().join("approvals"));
        assert!(store.load_all().unwrap().is_empty());

        let mut it = item();
        store.save(&it).unwrap();
        it.status = ApprovalStatus::Rejected;
        store.save(&it).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].status, ApprovalStatus::Rejected);

        let leftovers: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_file_store_skips_corrupt_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileApprovalStore::new(dir.path());
        store.save(&item()).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(dir.path().join(".x.json.tmp"), "{}").unwrap();
        assert_eq!(store.load_all().unwrap().len(), 1);
    }
}
