//! 代理记录表
//!
//! 纯内存结构，不做任何加锁；由 [`crate::ProxyManager`] 独占持有。

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use claim_domain::{PoolCounts, ProxyHealth, ProxyRecord};

#[derive(Debug, Default)]
pub struct ProxyStore {
    records: HashMap<String, ProxyRecord>,
    /// profile -> proxy key
    sticky: HashMap<String, String>,
}

fn latency_order(a: Option<u64>, b: Option<u64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl ProxyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 键已存在时不覆盖，返回 false；同一 profile 只保留先插入的绑定
    pub fn insert(&mut self, mut record: ProxyRecord) -> bool {
        if self.records.contains_key(&record.key) {
            return false;
        }
        if let Some(profile) = record.last_assigned_profile.clone() {
            let bound = self.sticky.entry(profile).or_insert_with(|| record.key.clone());
            if *bound != record.key {
                record.last_assigned_profile = None;
            }
        }
        self.records.insert(record.key.clone(), record);
        true
    }

    pub fn remove(&mut self, key: &str) -> Option<ProxyRecord> {
        let record = self.records.remove(key)?;
        self.sticky.retain(|_, bound| bound != key);
        Some(record)
    }

    pub fn get(&self, key: &str) -> Option<&ProxyRecord> {
        self.records.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ProxyRecord> {
        self.records.get_mut(key)
    }

    pub fn records(&self) -> impl Iterator<Item = &ProxyRecord> {
        self.records.values()
    }

    pub fn sticky_key(&self, profile: &str) -> Option<&str> {
        self.sticky.get(profile).map(String::as_str)
    }

    /// 绑定到 profile；记录原先绑定的其他 profile 失去粘性
    pub fn bind(&mut self, profile: &str, key: &str) {
        if let Some(previous) = self.sticky.insert(profile.to_string(), key.to_string()) {
            if previous != key {
                self.clear_profile(&previous, profile);
            }
        }
        if let Some(record) = self.records.get_mut(key) {
            if let Some(owner) = record.last_assigned_profile.replace(profile.to_string()) {
                if owner != profile && self.sticky.get(&owner).map(String::as_str) == Some(key) {
                    self.sticky.remove(&owner);
                }
            }
        }
    }

    pub fn unbind(&mut self, profile: &str) -> Option<String> {
        let key = self.sticky.remove(profile)?;
        self.clear_profile(&key, profile);
        Some(key)
    }

    fn clear_profile(&mut self, key: &str, profile: &str) {
        if let Some(record) = self.records.get_mut(key) {
            if record.last_assigned_profile.as_deref() == Some(profile) {
                record.last_assigned_profile = None;
            }
        }
    }

    fn bound_elsewhere(record: &ProxyRecord, profile: &str) -> bool {
        record
            .last_assigned_profile
            .as_deref()
            .is_some_and(|owner| owner != profile)
    }

    /// 健康且未被其他 profile 占用
    pub fn is_assignable(record: &ProxyRecord, profile: &str, now: DateTime<Utc>) -> bool {
        record.is_available_at(now)
            && record
                .in_use_by
                .as_deref()
                .map_or(true, |holder| holder == profile)
    }

    /// 未绑定给其他 profile 的代理优先；其次失败次数最少、延迟最低（未知延迟排最后），
    /// 最后按键排序保证确定性
    pub fn select(&self, now: DateTime<Utc>, profile: &str, exclude: Option<&str>) -> Option<String> {
        self.records
            .values()
            .filter(|r| Self::is_assignable(r, profile, now))
            .filter(|r| exclude != Some(r.key.as_str()))
            .min_by(|a, b| {
                Self::bound_elsewhere(a, profile)
                    .cmp(&Self::bound_elsewhere(b, profile))
                    .then_with(|| a.consecutive_failures.cmp(&b.consecutive_failures))
                    .then_with(|| latency_order(a.latency_ms, b.latency_ms))
                    .then_with(|| a.key.cmp(&b.key))
            })
            .map(|r| r.key.clone())
    }

    pub fn counts(&self, now: DateTime<Utc>) -> PoolCounts {
        let mut counts = PoolCounts {
            total: self.records.len(),
            ..PoolCounts::default()
        };
        for record in self.records.values() {
            match record.health.effective(now) {
                ProxyHealth::Healthy => {
                    counts.healthy += 1;
                    if record.in_use_by.is_some() {
                        counts.in_use += 1;
                    }
                }
                ProxyHealth::Cooldown(until) => {
                    counts.cooling += 1;
                    counts.next_available_at = Some(
                        counts.next_available_at.map_or(until, |at| at.min(until)),
                    );
                }
                ProxyHealth::Burned(until) => {
                    counts.burned += 1;
                    counts.next_available_at = Some(
                        counts.next_available_at.map_or(until, |at| at.min(until)),
                    );
                }
            }
        }
        counts
    }

    /// 剩余冷却最短的代理
    pub fn shortest_cooldown(&self, now: DateTime<Utc>) -> Option<(&str, DateTime<Utc>)> {
        self.records
            .values()
            .filter(|r| !r.is_available_at(now))
            .filter_map(|r| r.health.until().map(|until| (r.key.as_str(), until)))
            .min_by_key(|(_, until)| *until)
    }
}
