use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use claim_domain::{Snapshot, SnapshotStore};
use claim_errors::{SchedulerError, SchedulerResult};
use tracing::{info, warn};

/// JSON 文件快照
///
/// 读取时文件缺失或损坏都视为空启动；写入先落临时文件再原子重命名。
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn load(&self) -> SchedulerResult<Option<Snapshot>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("快照文件不存在，使用空状态启动: {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                warn!("读取快照失败，使用空状态启动: {}: {}", self.path.display(), e);
                return Ok(None);
            }
        };

        match serde_json::from_str::<Snapshot>(&content) {
            Ok(snapshot) if snapshot.is_structurally_valid() => {
                info!(
                    jobs = snapshot.jobs.len(),
                    proxies = snapshot.proxies.len(),
                    saved_at = %snapshot.saved_at,
                    "已加载快照"
                );
                Ok(Some(snapshot))
            }
            Ok(snapshot) => {
                warn!(
                    version = snapshot.version,
                    "快照结构不一致，使用空状态启动: {}",
                    self.path.display()
                );
                Ok(None)
            }
            Err(e) => {
                warn!("快照已损坏，使用空状态启动: {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> SchedulerResult<()> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &json)
            .await
            .map_err(|e| SchedulerError::Snapshot(format!("写入临时快照失败: {e}")))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| SchedulerError::Snapshot(format!("替换快照文件失败: {e}")))?;

        info!(
            jobs = snapshot.jobs.len(),
            proxies = snapshot.proxies.len(),
            "快照已保存: {}",
            self.path.display()
        );
        Ok(())
    }
}
