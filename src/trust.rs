//! 信任等级来源
//!
//! 每次推理开始时读取一次，整个运行期间不变。

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::skills::TrustLevel;

#[async_trait]
pub trait TrustSource: Send + Sync {
    async fn current(&self) -> TrustLevel;
}

/// 固定等级
#[derive(Debug, Clone, Copy)]
pub struct StaticTrust(pub TrustLevel);

#[async_trait]
impl TrustSource for StaticTrust {
    async fn current(&self) -> TrustLevel {
        self.0
    }
}

/// 从文件读取等级（内容如 `supervised_auto`）；文件缺失或无法解析时用默认值
#[derive(Debug, Clone)]
pub struct FileTrustSource {
    path: PathBuf,
    fallback: TrustLevel,
}

impl FileTrustSource {
    pub fn new(path: impl AsRef<Path>, fallback: TrustLevel) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            fallback,
        }
    }
}

#[async_trait]
impl TrustSource for FileTrustSource {
    async fn current(&self) -> TrustLevel {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(path = %self.path.display(), value = %text.trim(), "invalid trust level, using fallback");
                self.fallback
            }),
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "trust file unreadable, using fallback");
                self.fallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_trust_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trust");
        let source = FileTrustSource::new(&path, TrustLevel::Observe);
        assert_eq!(source.current().await, TrustLevel::Observe);

        std::fs::write(&path, "bounded_auto\n").unwrap();
        assert_eq!(source.current().await, TrustLevel::BoundedAuto);

        std::fs::write(&path, "root").unwrap();
        assert_eq!(source.current().await, TrustLevel::Observe);
    }

    #[tokio::test]
    async fn test_static_trust() {
        assert_eq!(StaticTrust(TrustLevel::Suggest).current().await, TrustLevel::Suggest);
    }
}
