use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub snapshot_path: String,
    pub outcome_log_path: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            snapshot_path: "data/snapshot.json".to_string(),
            outcome_log_path: "data/outcomes.jsonl".to_string(),
        }
    }
}

impl PersistenceConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.snapshot_path.is_empty() {
            return Err(anyhow::anyhow!("快照路径不能为空"));
        }
        if self.outcome_log_path.is_empty() {
            return Err(anyhow::anyhow!("结果日志路径不能为空"));
        }
        Ok(())
    }
}
