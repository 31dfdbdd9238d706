//! 调度器指标
//!
//! 通过 `metrics` 门面记录；未安装导出器时所有调用都是空操作。

use claim_domain::{OperationMode, OutcomeKind, PoolCounts};
use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};

pub struct MetricsCollector {
    // 分发
    dispatches_total: Counter,
    pool_exhausted_total: Counter,
    dispatch_duration: Histogram,
    outstanding_dispatches: Gauge,

    // 代理池
    proxies_total: Gauge,
    proxies_healthy: Gauge,
    proxies_cooling: Gauge,
    proxies_burned: Gauge,
    proxies_added_total: Counter,
    proxies_evicted_total: Counter,

    // 运行模式
    operation_mode: Gauge,
    dispatch_ceiling: Gauge,
    mode_transitions_total: Counter,

    tick_duration: Histogram,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            dispatches_total: counter!("claim_dispatches_total"),
            pool_exhausted_total: counter!("claim_pool_exhausted_total"),
            dispatch_duration: histogram!("claim_dispatch_duration_seconds"),
            outstanding_dispatches: gauge!("claim_outstanding_dispatches"),
            proxies_total: gauge!("claim_proxies_total"),
            proxies_healthy: gauge!("claim_proxies_healthy"),
            proxies_cooling: gauge!("claim_proxies_cooling"),
            proxies_burned: gauge!("claim_proxies_burned"),
            proxies_added_total: counter!("claim_proxies_added_total"),
            proxies_evicted_total: counter!("claim_proxies_evicted_total"),
            operation_mode: gauge!("claim_operation_mode"),
            dispatch_ceiling: gauge!("claim_dispatch_ceiling"),
            mode_transitions_total: counter!("claim_mode_transitions_total"),
            tick_duration: histogram!("claim_scheduler_tick_duration_seconds"),
        }
    }

    pub fn record_dispatch(&self) {
        self.dispatches_total.increment(1);
    }

    /// 按结果分类计数，并记录分发耗时
    pub fn record_outcome(&self, task_id: &str, kind: OutcomeKind, duration_seconds: f64) {
        counter!(
            "claim_outcomes_total",
            "task" => task_id.to_string(),
            "kind" => kind.as_str()
        )
        .increment(1);
        self.dispatch_duration.record(duration_seconds);
    }

    pub fn record_earnings(&self, task_id: &str, net: f64) {
        gauge!("claim_task_net_earnings", "task" => task_id.to_string()).increment(net);
    }

    pub fn record_pool_exhausted(&self) {
        self.pool_exhausted_total.increment(1);
    }

    pub fn update_outstanding(&self, outstanding: usize) {
        self.outstanding_dispatches.set(outstanding as f64);
    }

    pub fn update_pool(&self, counts: &PoolCounts) {
        self.proxies_total.set(counts.total as f64);
        self.proxies_healthy.set(counts.healthy as f64);
        self.proxies_cooling.set(counts.cooling as f64);
        self.proxies_burned.set(counts.burned as f64);
    }

    pub fn record_proxies_added(&self, count: usize) {
        self.proxies_added_total.increment(count as u64);
    }

    pub fn record_proxies_evicted(&self, count: usize) {
        self.proxies_evicted_total.increment(count as u64);
    }

    /// 模式以严重程度记录：0 Normal，1 LowProxy，2 Critical
    pub fn update_mode(&self, mode: &OperationMode, ceiling: usize) {
        self.operation_mode.set(mode.severity() as f64);
        self.dispatch_ceiling.set(ceiling as f64);
    }

    pub fn record_mode_transition(&self) {
        self.mode_transitions_total.increment(1);
    }

    pub fn record_tick(&self, duration_seconds: f64) {
        self.tick_duration.record(duration_seconds);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
