use serde::{Deserialize, Serialize};

use super::ensure_span;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_seconds: u64,
    /// 代理池耗尽时任务推迟的随机区间（秒）
    pub pool_exhausted_delay_min_seconds: u64,
    pub pool_exhausted_delay_max_seconds: u64,
    /// 下次运行时间的随机抖动区间
    pub jitter_min: f64,
    pub jitter_max: f64,
    /// 任务连续失败达到该次数后进入惩罚冷却
    pub failure_streak_threshold: u32,
    pub cooling_penalty_seconds: u64,
    /// 每个任务优先级系数的最小更新间隔（秒）
    pub priority_update_interval_seconds: u64,
    pub execution_timeout_seconds: u64,
    /// 写入结果日志的超时（秒）
    pub outcome_report_timeout_seconds: u64,
    pub shutdown_timeout_seconds: u64,
    /// 覆盖运行模式给出的并发上限
    pub concurrency_override: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 5,
            pool_exhausted_delay_min_seconds: 30,
            pool_exhausted_delay_max_seconds: 120,
            jitter_min: 0.9,
            jitter_max: 1.1,
            failure_streak_threshold: 3,
            cooling_penalty_seconds: 1800, // 30分钟
            priority_update_interval_seconds: 3600,
            execution_timeout_seconds: 300,
            outcome_report_timeout_seconds: 5,
            shutdown_timeout_seconds: 5,
            concurrency_override: None,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_interval_seconds == 0 {
            return Err(anyhow::anyhow!("调度间隔必须大于0"));
        }
        if self.pool_exhausted_delay_min_seconds > self.pool_exhausted_delay_max_seconds {
            return Err(anyhow::anyhow!("代理耗尽推迟区间无效"));
        }
        ensure_span("代理耗尽推迟上限", self.pool_exhausted_delay_max_seconds)?;
        ensure_span("惩罚冷却时长", self.cooling_penalty_seconds)?;
        ensure_span("优先级更新间隔", self.priority_update_interval_seconds)?;
        if !(self.jitter_min > 0.0 && self.jitter_min <= self.jitter_max) {
            return Err(anyhow::anyhow!(
                "无效的抖动区间: [{}, {}]",
                self.jitter_min,
                self.jitter_max
            ));
        }
        if self.failure_streak_threshold == 0 {
            return Err(anyhow::anyhow!("连续失败阈值必须大于0"));
        }
        if self.execution_timeout_seconds == 0 || self.outcome_report_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("执行超时和结果上报超时必须大于0"));
        }
        if self.concurrency_override == Some(0) {
            return Err(anyhow::anyhow!("并发覆盖值必须大于0"));
        }
        Ok(())
    }
}
