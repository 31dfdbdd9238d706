use serde::{Deserialize, Serialize};

/// 根据健康代理数量划分运行模式的阈值
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationModeConfig {
    pub normal_threshold: usize,
    pub low_proxy_threshold: usize,
    pub normal_concurrency: usize,
    pub low_proxy_concurrency: usize,
    pub critical_concurrency: usize,
}

impl Default for OperationModeConfig {
    fn default() -> Self {
        Self {
            normal_threshold: 10,
            low_proxy_threshold: 3,
            normal_concurrency: 3,
            low_proxy_concurrency: 2,
            critical_concurrency: 1,
        }
    }
}

impl OperationModeConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.low_proxy_threshold > self.normal_threshold {
            return Err(anyhow::anyhow!(
                "LowProxy阈值({})不能高于Normal阈值({})",
                self.low_proxy_threshold,
                self.normal_threshold
            ));
        }
        if self.critical_concurrency == 0 {
            return Err(anyhow::anyhow!("Critical模式并发数必须大于0"));
        }
        if !(self.critical_concurrency <= self.low_proxy_concurrency
            && self.low_proxy_concurrency <= self.normal_concurrency)
        {
            return Err(anyhow::anyhow!("并发上限必须满足 Normal ≥ LowProxy ≥ Critical"));
        }
        Ok(())
    }
}
