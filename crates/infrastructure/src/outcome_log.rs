//! 结果日志
//!
//! 每行一个 JSON 对象的追加式日志；收益评估按时间窗口从中读取。

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use claim_domain::{OutcomeLog, OutcomeRecord};
use claim_errors::{SchedulerError, SchedulerResult};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

fn in_window(record: &OutcomeRecord, task_id: &str, since: DateTime<Utc>, until: DateTime<Utc>) -> bool {
    record.task_id == task_id && record.timestamp >= since && record.timestamp < until
}

/// 内存结果日志，用于测试和一次性命令
#[derive(Default)]
pub struct InMemoryOutcomeLog {
    records: RwLock<Vec<OutcomeRecord>>,
}

impl InMemoryOutcomeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<OutcomeRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn records(&self) -> Vec<OutcomeRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl OutcomeLog for InMemoryOutcomeLog {
    async fn append(&self, record: &OutcomeRecord) -> SchedulerResult<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn query(
        &self,
        task_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> SchedulerResult<Vec<OutcomeRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| in_window(r, task_id, since, until))
            .cloned()
            .collect())
    }
}

/// JSON Lines 文件结果日志
pub struct JsonlOutcomeLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlOutcomeLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl OutcomeLog for JsonlOutcomeLog {
    async fn append(&self, record: &OutcomeRecord) -> SchedulerResult<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| SchedulerError::OutcomeLog(format!("打开结果日志失败: {e}")))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| SchedulerError::OutcomeLog(format!("写入结果日志失败: {e}")))?;
        file.flush().await?;

        debug!(task_id = %record.task_id, kind = %record.kind, "结果已写入日志");
        Ok(())
    }

    async fn query(
        &self,
        task_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> SchedulerResult<Vec<OutcomeRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SchedulerError::OutcomeLog(format!(
                    "读取结果日志失败 {}: {e}",
                    self.path.display()
                )))
            }
        };

        let mut records = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<OutcomeRecord>(line) {
                Ok(record) if in_window(&record, task_id, since, until) => records.push(record),
                Ok(_) => {}
                Err(e) => warn!(line = line_no + 1, "跳过无法解析的结果日志行: {}", e),
            }
        }
        Ok(records)
    }
}
