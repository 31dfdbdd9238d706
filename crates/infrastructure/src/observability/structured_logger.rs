//! 结构化日志
//!
//! 每条记录带 `event` 字段，便于日志平台按事件类型聚合。

use chrono::{DateTime, Utc};
use claim_domain::{DisableReason, OperationMode, OutcomeKind, PoolCounts, ProfitabilityMetric};
use tracing::{debug, error, info, warn};

pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_dispatch(task_id: &str, dispatch_id: &str, proxy_key: &str, multiplier: f64) {
        info!(
            event = "dispatch_started",
            task.id = task_id,
            dispatch.id = dispatch_id,
            proxy.key = proxy_key,
            task.priority_multiplier = multiplier,
            "任务已分发"
        );
    }

    pub fn log_outcome(
        task_id: &str,
        dispatch_id: &str,
        proxy_key: &str,
        kind: OutcomeKind,
        duration_ms: u64,
        message: Option<&str>,
    ) {
        match kind {
            OutcomeKind::Success => info!(
                event = "dispatch_completed",
                task.id = task_id,
                dispatch.id = dispatch_id,
                proxy.key = proxy_key,
                outcome = %kind,
                dispatch.duration_ms = duration_ms,
                "任务执行成功"
            ),
            OutcomeKind::Fatal => error!(
                event = "dispatch_completed",
                task.id = task_id,
                dispatch.id = dispatch_id,
                proxy.key = proxy_key,
                outcome = %kind,
                dispatch.duration_ms = duration_ms,
                error = message.unwrap_or("unknown"),
                "任务执行出现致命错误"
            ),
            _ => warn!(
                event = "dispatch_completed",
                task.id = task_id,
                dispatch.id = dispatch_id,
                proxy.key = proxy_key,
                outcome = %kind,
                dispatch.duration_ms = duration_ms,
                error = message.unwrap_or("unknown"),
                "任务执行失败"
            ),
        }
    }

    pub fn log_pool_exhausted(profile: &str, counts: &PoolCounts) {
        warn!(
            event = "pool_exhausted",
            profile = profile,
            pool.total = counts.total,
            pool.healthy = counts.healthy,
            pool.cooling = counts.cooling,
            pool.burned = counts.burned,
            pool.in_use = counts.in_use,
            "没有可用代理"
        );
    }

    pub fn log_mode_transition(from: Option<&OperationMode>, to: &OperationMode, healthy: usize) {
        let from = from.map(ToString::to_string).unwrap_or_else(|| "-".to_string());
        warn!(
            event = "mode_changed",
            mode.from = %from,
            mode.to = %to,
            mode.max_concurrent_dispatch = to.max_concurrent_dispatch(),
            pool.healthy = healthy,
            "运行模式切换"
        );
    }

    pub fn log_proxy_cooled(key: &str, until: DateTime<Utc>, consecutive_failures: u32) {
        warn!(
            event = "proxy_cooldown",
            proxy.key = key,
            proxy.until = %until,
            proxy.consecutive_failures = consecutive_failures,
            "代理进入冷却"
        );
    }

    pub fn log_proxy_burned(key: &str, until: DateTime<Utc>, burn_count: u32) {
        warn!(
            event = "proxy_burned",
            proxy.key = key,
            proxy.until = %until,
            proxy.burn_count = burn_count,
            "代理被目标站点识别，已封禁"
        );
    }

    pub fn log_proxy_evicted(key: &str, consecutive_failures: u32, burn_count: u32) {
        warn!(
            event = "proxy_evicted",
            proxy.key = key,
            proxy.consecutive_failures = consecutive_failures,
            proxy.burn_count = burn_count,
            "移除失效代理"
        );
    }

    pub fn log_proxies_provisioned(source: &str, requested: usize, added: usize, healthy: usize) {
        info!(
            event = "proxies_provisioned",
            source = source,
            requested = requested,
            added = added,
            pool.healthy = healthy,
            "自动补充代理"
        );
    }

    pub fn log_job_cooling(task_id: &str, until: DateTime<Utc>, consecutive_failures: u32) {
        warn!(
            event = "job_cooling",
            task.id = task_id,
            task.until = %until,
            task.consecutive_failures = consecutive_failures,
            "任务连续失败，进入冷却"
        );
    }

    pub fn log_task_disabled(
        task_id: &str,
        reason: DisableReason,
        until: Option<DateTime<Utc>>,
        metric: Option<&ProfitabilityMetric>,
    ) {
        let until = until
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "manual".to_string());
        match metric {
            Some(metric) => warn!(
                event = "task_disabled",
                task.id = task_id,
                reason = ?reason,
                task.disabled_until = %until,
                metric.net_profit = metric.net_profit,
                metric.sample_count = metric.sample_count,
                metric.window_hours = metric.window_hours,
                "任务已停用"
            ),
            None => warn!(
                event = "task_disabled",
                task.id = task_id,
                reason = ?reason,
                task.disabled_until = %until,
                "任务已停用"
            ),
        }
    }

    pub fn log_task_enabled(task_id: &str, multiplier: f64) {
        info!(
            event = "task_enabled",
            task.id = task_id,
            task.priority_multiplier = multiplier,
            "任务重新启用"
        );
    }

    pub fn log_priority_update(task_id: &str, score: f64, old: f64, new: f64) {
        debug!(
            event = "priority_updated",
            task.id = task_id,
            metric.profitability_score = score,
            task.old_multiplier = old,
            task.new_multiplier = new,
            "更新任务优先级系数"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_structured_logger_methods() {
        let now = Utc::now();
        let counts = PoolCounts {
            total: 12,
            healthy: 0,
            cooling: 8,
            burned: 4,
            in_use: 0,
            next_available_at: Some(now + Duration::minutes(3)),
        };

        StructuredLogger::log_dispatch("faucet", "d-1", "10.0.0.1:80", 1.0);
        StructuredLogger::log_outcome("faucet", "d-1", "10.0.0.1:80", OutcomeKind::Success, 1200, None);
        StructuredLogger::log_outcome(
            "faucet",
            "d-2",
            "10.0.0.1:80",
            OutcomeKind::DetectionFailure,
            800,
            Some("captcha wall"),
        );
        StructuredLogger::log_pool_exhausted("faucet", &counts);
        StructuredLogger::log_mode_transition(None, &OperationMode::Normal(3), 12);
        StructuredLogger::log_mode_transition(
            Some(&OperationMode::Normal(3)),
            &OperationMode::LowProxy(2),
            9,
        );
        StructuredLogger::log_proxy_cooled("10.0.0.1:80", now, 3);
        StructuredLogger::log_proxy_burned("10.0.0.1:80", now, 1);
        StructuredLogger::log_proxy_evicted("10.0.0.1:80", 11, 0);
        StructuredLogger::log_proxies_provisioned("file", 4, 2, 10);
        StructuredLogger::log_job_cooling("faucet", now, 3);
        StructuredLogger::log_task_disabled("faucet", DisableReason::Fatal, None, None);
        StructuredLogger::log_task_enabled("faucet", 1.0);
        StructuredLogger::log_priority_update("faucet", 250.0, 1.0, 0.5);
    }
}
