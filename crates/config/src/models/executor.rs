use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 外部认领命令配置
///
/// 每次分发都会启动一次该命令，代理与任务信息通过环境变量传入。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<String>,
    pub env: HashMap<String, String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command: "claim-task".to_string(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.command.trim().is_empty() {
            return Err(anyhow::anyhow!("执行命令不能为空"));
        }
        Ok(())
    }
}
