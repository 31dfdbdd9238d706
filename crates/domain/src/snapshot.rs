use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{Job, ProxyRecord};

/// 以键组织的 Job 表与代理表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub jobs: BTreeMap<String, Job>,
    #[serde(default)]
    pub proxies: BTreeMap<String, ProxyRecord>,
}

impl Snapshot {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(saved_at: DateTime<Utc>) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            saved_at,
            jobs: BTreeMap::new(),
            proxies: BTreeMap::new(),
        }
    }

    /// 版本匹配且每条记录的键与其自身ID一致
    pub fn is_structurally_valid(&self) -> bool {
        self.version == Self::CURRENT_VERSION
            && self.jobs.iter().all(|(id, job)| *id == job.id)
            && self.proxies.iter().all(|(key, proxy)| *key == proxy.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::ProxyCandidate;

    #[test]
    fn test_structural_validation() {
        let now = Utc::now();
        let mut snapshot = Snapshot::new(now);
        snapshot
            .jobs
            .insert("faucet".to_string(), Job::new("faucet", 60, now));
        let candidate: ProxyCandidate = "10.0.0.1:80".parse().unwrap();
        snapshot.proxies.insert(
            candidate.key(),
            ProxyRecord::from_candidate(&candidate, now),
        );
        assert!(snapshot.is_structurally_valid());

        snapshot
            .jobs
            .insert("mismatch".to_string(), Job::new("other", 60, now));
        assert!(!snapshot.is_structurally_valid());
    }

    #[test]
    fn test_lease_is_not_persisted() {
        let now = Utc::now();
        let candidate: ProxyCandidate = "10.0.0.1:80".parse().unwrap();
        let mut record = ProxyRecord::from_candidate(&candidate, now);
        record.in_use_by = Some("faucet".to_string());

        let json = serde_json::to_string(&record).unwrap();
        let restored: ProxyRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.in_use_by, None);
    }
}
