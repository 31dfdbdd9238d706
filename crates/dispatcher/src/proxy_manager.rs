//! 代理分配、轮换与健康维护
//!
//! 所有代理状态都在一把异步锁之后；调度器只能通过 `assign`、`rotate`、
//! `report_outcome` 等接口读写，不会直接修改代理记录。

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use claim_config::ProxyPoolConfig;
use claim_domain::{
    later, span_from_secs, Clock, EventEnvelope, HealthProbe, Outcome, OutcomeKind, PoolCounts,
    ProxyCandidate, ProxyHealth, ProxyRecord, ProxySource, SchedulerEvent,
};
use claim_errors::{SchedulerError, SchedulerResult};
use claim_infrastructure::{DispatchTracer, StructuredLogger};
use futures::future::join_all;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn, Instrument};

use crate::event_bus::EventBus;
use crate::proxy_store::ProxyStore;

/// 代理健康策略
#[derive(Debug, Clone)]
pub struct ProxyPolicy {
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub burn: Duration,
    pub eviction_burn_threshold: u32,
}

impl From<&ProxyPoolConfig> for ProxyPolicy {
    fn from(config: &ProxyPoolConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            cooldown: span_from_secs(config.cooldown_seconds),
            burn: span_from_secs(config.burn_seconds),
            eviction_burn_threshold: config.eviction_burn_threshold,
        }
    }
}

impl Default for ProxyPolicy {
    fn default() -> Self {
        Self::from(&ProxyPoolConfig::default())
    }
}

#[derive(Debug, Clone)]
pub enum Assignment {
    Assigned(ProxyRecord),
    /// 没有可用代理，附带池计数用于诊断
    NotAvailable(PoolCounts),
}

impl Assignment {
    pub fn proxy(&self) -> Option<&ProxyRecord> {
        match self {
            Assignment::Assigned(record) => Some(record),
            Assignment::NotAvailable(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    pub probed: usize,
    pub healthy: usize,
    pub failed: usize,
}

pub struct ProxyManager {
    store: Mutex<ProxyStore>,
    policy: ProxyPolicy,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl ProxyManager {
    pub fn new(policy: ProxyPolicy, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self {
            store: Mutex::new(ProxyStore::new()),
            policy,
            clock,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    /// 为 profile 分配代理并加占用标记
    ///
    /// 粘性绑定仍健康时原样返回；否则按选择规则重新绑定。
    pub async fn assign(&self, profile: &str) -> Assignment {
        let now = self.clock.now();
        let mut store = self.store.lock().await;

        let sticky = store.sticky_key(profile).map(str::to_string);
        let key = match sticky {
            Some(key)
                if store
                    .get(&key)
                    .is_some_and(|r| ProxyStore::is_assignable(r, profile, now)) =>
            {
                Some(key)
            }
            _ => store.select(now, profile, None),
        };

        let Some(key) = key else {
            let counts = store.counts(now);
            drop(store);
            StructuredLogger::log_pool_exhausted(profile, &counts);
            self.events.publish(
                SchedulerEvent::PoolExhausted {
                    profile: profile.to_string(),
                    counts,
                },
                now,
            );
            return Assignment::NotAvailable(counts);
        };

        store.bind(profile, &key);
        match store.get_mut(&key) {
            Some(record) => {
                record.in_use_by = Some(profile.to_string());
                record.last_used_at = Some(now);
                debug!(profile = profile, proxy.key = %key, "分配代理");
                Assignment::Assigned(record.clone())
            }
            None => Assignment::NotAvailable(store.counts(now)),
        }
    }

    /// 清除粘性绑定并换一个代理；刚失败的代理即使已恢复也不会被选中
    ///
    /// 新代理只绑定不占用，下一次 `assign` 才会占用。
    pub async fn rotate(&self, profile: &str) -> Option<ProxyRecord> {
        let now = self.clock.now();
        let mut store = self.store.lock().await;
        let previous = store.unbind(profile);

        match store.select(now, profile, previous.as_deref()) {
            Some(key) => {
                store.bind(profile, &key);
                info!(
                    profile = profile,
                    from = previous.as_deref().unwrap_or("-"),
                    to = %key,
                    "轮换代理"
                );
                store.get(&key).cloned()
            }
            None => {
                match store.shortest_cooldown(now) {
                    Some((key, until)) => warn!(
                        profile = profile,
                        "没有可替换的代理，最短剩余冷却 {} 秒 ({})",
                        (until - now).num_seconds(),
                        key
                    ),
                    None => warn!(profile = profile, "没有可替换的代理"),
                }
                None
            }
        }
    }

    /// 释放占用并按结果更新代理健康
    pub async fn report_outcome(&self, key: &str, outcome: &Outcome) -> SchedulerResult<()> {
        let now = self.clock.now();
        let mut store = self.store.lock().await;
        let record = store
            .get_mut(key)
            .ok_or_else(|| SchedulerError::proxy_not_found(key))?;

        record.in_use_by = None;
        record.last_used_at = Some(now);

        let event = match outcome.kind {
            OutcomeKind::Success => {
                record.consecutive_failures = 0;
                None
            }
            OutcomeKind::TransientFailure => Self::penalize_transient(&self.policy, record, now),
            OutcomeKind::DetectionFailure => {
                record.consecutive_failures += 1;
                let until = later(now, self.policy.burn);
                record
                    .apply_penalty(ProxyHealth::Burned(until), now)
                    .then(|| SchedulerEvent::ProxyBurned {
                        key: record.key.clone(),
                        until,
                        burn_count: record.burn_count,
                    })
            }
            OutcomeKind::Fatal => None,
        };
        drop(store);

        if let Some(event) = event {
            self.emit_penalty(event, now);
        }
        Ok(())
    }

    /// 只释放占用，用于分发在执行前被放弃的情况
    pub async fn release(&self, key: &str) {
        let mut store = self.store.lock().await;
        if let Some(record) = store.get_mut(key) {
            record.in_use_by = None;
        }
    }

    fn penalize_transient(
        policy: &ProxyPolicy,
        record: &mut ProxyRecord,
        now: DateTime<Utc>,
    ) -> Option<SchedulerEvent> {
        record.consecutive_failures += 1;
        if record.consecutive_failures < policy.failure_threshold {
            return None;
        }
        let until = later(now, policy.cooldown);
        record
            .apply_penalty(ProxyHealth::Cooldown(until), now)
            .then(|| SchedulerEvent::ProxyCooledDown {
                key: record.key.clone(),
                until,
                consecutive_failures: record.consecutive_failures,
            })
    }

    fn emit_penalty(&self, event: SchedulerEvent, now: DateTime<Utc>) {
        match &event {
            SchedulerEvent::ProxyCooledDown {
                key,
                until,
                consecutive_failures,
            } => StructuredLogger::log_proxy_cooled(key, *until, *consecutive_failures),
            SchedulerEvent::ProxyBurned {
                key,
                until,
                burn_count,
            } => StructuredLogger::log_proxy_burned(key, *until, *burn_count),
            _ => {}
        }
        self.events.publish(event, now);
    }

    /// 健康代理不足 `min_healthy` 时从来源补充到 `target_count`
    pub async fn auto_provision(
        &self,
        source: &dyn ProxySource,
        min_healthy: usize,
        target_count: usize,
    ) -> SchedulerResult<usize> {
        self.provision(source, min_healthy, target_count)
            .instrument(DispatchTracer::maintenance_span("auto_provision"))
            .await
    }

    async fn provision(
        &self,
        source: &dyn ProxySource,
        min_healthy: usize,
        target_count: usize,
    ) -> SchedulerResult<usize> {
        let counts = self.counts().await;
        if counts.healthy >= min_healthy {
            return Ok(0);
        }
        let needed = target_count.saturating_sub(counts.healthy);
        if needed == 0 {
            return Ok(0);
        }

        // 多取一些，跳过池中已有的候选
        let candidates = source.fetch(needed + counts.total).await?;

        let now = self.clock.now();
        let mut added = Vec::new();
        {
            let mut store = self.store.lock().await;
            for candidate in candidates {
                if added.len() >= needed {
                    break;
                }
                if store.insert(ProxyRecord::from_candidate(&candidate, now)) {
                    added.push(candidate.key());
                }
            }
        }

        for key in &added {
            self.events
                .publish(SchedulerEvent::ProxyAdded { key: key.clone() }, now);
        }
        StructuredLogger::log_proxies_provisioned(
            source.name(),
            needed,
            added.len(),
            counts.healthy + added.len(),
        );
        Ok(added.len())
    }

    /// 永久移除连续失败超过阈值或累计封禁过多的代理；正在使用的代理等释放后再处理
    pub async fn auto_remove_dead(&self, failure_threshold: u32) -> Vec<String> {
        let now = self.clock.now();
        let burn_threshold = self.policy.eviction_burn_threshold;
        let mut store = self.store.lock().await;

        let dead: Vec<String> = store
            .records()
            .filter(|r| r.in_use_by.is_none())
            .filter(|r| {
                r.consecutive_failures > failure_threshold || r.burn_count >= burn_threshold
            })
            .map(|r| r.key.clone())
            .collect();

        let evicted: Vec<ProxyRecord> = dead.iter().filter_map(|key| store.remove(key)).collect();
        drop(store);

        for record in &evicted {
            StructuredLogger::log_proxy_evicted(
                &record.key,
                record.consecutive_failures,
                record.burn_count,
            );
            self.events.publish(
                SchedulerEvent::ProxyEvicted {
                    key: record.key.clone(),
                    consecutive_failures: record.consecutive_failures,
                    burn_count: record.burn_count,
                },
                now,
            );
        }
        dead
    }

    pub async fn add_proxy(&self, candidate: &ProxyCandidate) -> bool {
        let now = self.clock.now();
        let added = self
            .store
            .lock()
            .await
            .insert(ProxyRecord::from_candidate(candidate, now));
        if added {
            info!(proxy.key = %candidate.key(), "添加代理");
            self.events
                .publish(SchedulerEvent::ProxyAdded { key: candidate.key() }, now);
        }
        added
    }

    /// 显式缩减代理池；正在使用的代理不能移除
    pub async fn remove_proxy(&self, key: &str) -> SchedulerResult<ProxyRecord> {
        let mut store = self.store.lock().await;
        match store.get(key) {
            None => Err(SchedulerError::proxy_not_found(key)),
            Some(record) if record.in_use_by.is_some() => Err(SchedulerError::Internal(format!(
                "代理 {key} 正在使用中，无法移除"
            ))),
            Some(_) => {
                let record = store
                    .remove(key)
                    .ok_or_else(|| SchedulerError::proxy_not_found(key))?;
                info!(proxy.key = key, "移除代理");
                Ok(record)
            }
        }
    }

    pub async fn counts(&self) -> PoolCounts {
        let now = self.clock.now();
        self.store.lock().await.counts(now)
    }

    pub async fn sticky_proxy(&self, profile: &str) -> Option<ProxyRecord> {
        let store = self.store.lock().await;
        store
            .sticky_key(profile)
            .and_then(|key| store.get(key))
            .cloned()
    }

    /// 按键排序的全部记录
    pub async fn records(&self) -> Vec<ProxyRecord> {
        let store = self.store.lock().await;
        let mut records: Vec<ProxyRecord> = store.records().cloned().collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    /// 从快照恢复；占用标记不会被恢复
    pub async fn restore<I>(&self, records: I) -> usize
    where
        I: IntoIterator<Item = ProxyRecord>,
    {
        let mut store = self.store.lock().await;
        let mut restored = 0;
        for mut record in records {
            record.in_use_by = None;
            if store.insert(record) {
                restored += 1;
            }
        }
        restored
    }

    /// 探测所有空闲的健康代理；失败或超时按瞬时失败处理
    pub async fn probe_all(&self, probe: &dyn HealthProbe, timeout: StdDuration) -> ProbeSummary {
        let span = DispatchTracer::maintenance_span("probe_all");
        async move {
            let targets: Vec<ProxyRecord> = {
                let now = self.clock.now();
                let store = self.store.lock().await;
                store
                    .records()
                    .filter(|r| r.is_available_at(now) && r.in_use_by.is_none())
                    .cloned()
                    .collect()
            };

            let results = join_all(targets.iter().map(|record| async move {
                let result = match tokio::time::timeout(timeout, probe.probe(record)).await {
                    Ok(result) => result,
                    Err(_) => Err(SchedulerError::Timeout(format!("探测代理 {} 超时", record.key))),
                };
                (record.key.clone(), result)
            }))
            .await;

            let now = self.clock.now();
            let mut summary = ProbeSummary {
                probed: results.len(),
                ..ProbeSummary::default()
            };
            let mut events = Vec::new();
            {
                let mut store = self.store.lock().await;
                for (key, result) in results {
                    let Some(record) = store.get_mut(&key) else {
                        continue;
                    };
                    if record.in_use_by.is_some() {
                        continue;
                    }
                    match result {
                        Ok(latency) => {
                            record.latency_ms = Some(latency);
                            summary.healthy += 1;
                        }
                        Err(e) => {
                            debug!(proxy.key = %key, "代理探测失败: {}", e);
                            summary.failed += 1;
                            events.extend(Self::penalize_transient(&self.policy, record, now));
                        }
                    }
                }
            }
            for event in events {
                self.emit_penalty(event, now);
            }

            info!(
                probed = summary.probed,
                healthy = summary.healthy,
                failed = summary.failed,
                "代理健康探测完成"
            );
            summary
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claim_domain::SystemClock;

    fn manager() -> ProxyManager {
        ProxyManager::new(
            ProxyPolicy::default(),
            Arc::new(SystemClock),
            EventBus::default(),
        )
    }

    #[tokio::test]
    async fn test_release_clears_lease() {
        let manager = manager();
        manager
            .add_proxy(&"10.0.0.1:80".parse().unwrap())
            .await;

        let assigned = manager.assign("a").await;
        let key = assigned.proxy().unwrap().key.clone();
        assert!(matches!(manager.assign("b").await, Assignment::NotAvailable(_)));

        manager.release(&key).await;
        assert!(manager.assign("b").await.proxy().is_some());
    }

    #[tokio::test]
    async fn test_remove_leased_proxy_is_rejected() {
        let manager = manager();
        manager
            .add_proxy(&"10.0.0.1:80".parse().unwrap())
            .await;
        manager.assign("a").await;

        assert!(manager.remove_proxy("10.0.0.1:80").await.is_err());
        manager.release("10.0.0.1:80").await;
        assert!(manager.remove_proxy("10.0.0.1:80").await.is_ok());
        assert!(matches!(
            manager.remove_proxy("10.0.0.1:80").await,
            Err(SchedulerError::ProxyNotFound { .. })
        ));
    }
}
