use serde::{Deserialize, Serialize};

use super::ensure_span;

/// 代理池健康策略
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyPoolConfig {
    /// 连续瞬时失败达到该次数后进入冷却
    pub failure_threshold: u32,
    /// 冷却时长（秒）
    pub cooldown_seconds: u64,
    /// 被目标站点识别后的封禁时长（秒）
    pub burn_seconds: u64,
    /// 连续失败超过该值的代理会被永久移除
    pub eviction_failure_threshold: u32,
    /// 累计封禁达到该次数的代理会被永久移除
    pub eviction_burn_threshold: u32,
    /// 健康代理低于该数量时触发自动补充
    pub min_healthy: usize,
    /// 自动补充的目标数量
    pub target_count: usize,
    /// 维护任务（补充、清理、探测）的执行间隔（秒）
    pub maintenance_interval_seconds: u64,
    /// 单次健康探测超时（秒）
    pub probe_timeout_seconds: u64,
    /// 启动时加载的代理，格式 `host:port` 或 `user:pass@host:port`
    pub proxies: Vec<String>,
    /// 代理列表文件，同时作为自动补充的来源
    pub proxy_file: Option<String>,
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_seconds: 300,   // 5分钟
            burn_seconds: 12 * 3600, // 12小时
            eviction_failure_threshold: 10,
            eviction_burn_threshold: 3,
            min_healthy: 10,
            target_count: 12,
            maintenance_interval_seconds: 300,
            probe_timeout_seconds: 5,
            proxies: Vec::new(),
            proxy_file: None,
        }
    }
}

impl ProxyPoolConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.failure_threshold == 0 {
            return Err(anyhow::anyhow!("冷却失败阈值必须大于0"));
        }
        if self.cooldown_seconds == 0 || self.burn_seconds == 0 {
            return Err(anyhow::anyhow!("冷却和封禁时长必须大于0"));
        }
        ensure_span("冷却时长", self.cooldown_seconds)?;
        ensure_span("封禁时长", self.burn_seconds)?;
        if self.burn_seconds < self.cooldown_seconds {
            return Err(anyhow::anyhow!(
                "封禁时长({}秒)不能短于冷却时长({}秒)",
                self.burn_seconds,
                self.cooldown_seconds
            ));
        }
        if self.eviction_failure_threshold < self.failure_threshold {
            return Err(anyhow::anyhow!("移除阈值不能小于冷却失败阈值"));
        }
        if self.eviction_burn_threshold == 0 {
            return Err(anyhow::anyhow!("封禁移除阈值必须大于0"));
        }
        if self.target_count < self.min_healthy {
            return Err(anyhow::anyhow!(
                "补充目标数量({})不能小于最小健康数量({})",
                self.target_count,
                self.min_healthy
            ));
        }
        if self.maintenance_interval_seconds == 0 || self.probe_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("维护间隔和探测超时必须大于0"));
        }
        Ok(())
    }
}
