use serde::{Deserialize, Serialize};

use super::ensure_span;

/// 注册表中的一个认领任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: String,
    pub base_interval_seconds: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 透传给执行器的参数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}

impl TaskDefinition {
    pub fn new<S: Into<String>>(id: S, base_interval_seconds: u64) -> Self {
        Self {
            id: id.into(),
            base_interval_seconds,
            enabled: true,
            parameters: None,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.id.trim().is_empty() {
            return Err(anyhow::anyhow!("任务ID不能为空"));
        }
        if self.base_interval_seconds == 0 {
            return Err(anyhow::anyhow!("基础间隔必须大于0"));
        }
        ensure_span("基础间隔", self.base_interval_seconds)?;
        Ok(())
    }
}
