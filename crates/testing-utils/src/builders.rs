//! Test data builders

use chrono::{DateTime, Duration, Utc};
use claim_domain::{
    DisableReason, Job, JobState, OutcomeKind, OutcomeRecord, ProxyCandidate, ProxyHealth,
    ProxyRecord,
};

pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            job: Job::new(id, 3600, Utc::now()),
        }
    }

    pub fn with_interval(mut self, seconds: u64) -> Self {
        self.job.base_interval_seconds = seconds;
        self
    }

    pub fn with_next_run(mut self, next_run: DateTime<Utc>) -> Self {
        self.job.next_run = next_run;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.job.priority_multiplier = multiplier;
        self
    }

    pub fn with_failures(mut self, failures: u32) -> Self {
        self.job.consecutive_failures = failures;
        self
    }

    pub fn with_state(mut self, state: JobState) -> Self {
        self.job.state = state;
        self
    }

    pub fn disabled(mut self, reason: DisableReason, until: Option<DateTime<Utc>>) -> Self {
        self.job.disable(reason, until);
        self
    }

    pub fn with_last_priority_update(mut self, at: DateTime<Utc>) -> Self {
        self.job.last_priority_update = Some(at);
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

pub struct ProxyRecordBuilder {
    record: ProxyRecord,
}

impl ProxyRecordBuilder {
    pub fn new(address: &str) -> Self {
        let candidate: ProxyCandidate = address
            .parse()
            .unwrap_or_else(|e| panic!("invalid test proxy {address}: {e}"));
        Self {
            record: ProxyRecord::from_candidate(&candidate, Utc::now()),
        }
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.record.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_failures(mut self, failures: u32) -> Self {
        self.record.consecutive_failures = failures;
        self
    }

    pub fn with_health(mut self, health: ProxyHealth) -> Self {
        self.record.health = health;
        self
    }

    pub fn with_burn_count(mut self, burn_count: u32) -> Self {
        self.record.burn_count = burn_count;
        self
    }

    pub fn bound_to(mut self, profile: &str) -> Self {
        self.record.last_assigned_profile = Some(profile.to_string());
        self
    }

    pub fn build(self) -> ProxyRecord {
        self.record
    }
}

pub struct OutcomeRecordBuilder {
    record: OutcomeRecord,
}

impl OutcomeRecordBuilder {
    pub fn new(task_id: &str) -> Self {
        Self {
            record: OutcomeRecord {
                timestamp: Utc::now(),
                task_id: task_id.to_string(),
                kind: OutcomeKind::Success,
                success: true,
                amount: 0.0,
                cost: 0.0,
                proxy: None,
            },
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.record.timestamp = timestamp;
        self
    }

    pub fn hours_ago(self, now: DateTime<Utc>, hours: i64) -> Self {
        self.at(now - Duration::hours(hours))
    }

    pub fn with_kind(mut self, kind: OutcomeKind) -> Self {
        self.record.kind = kind;
        self.record.success = kind.is_success();
        self
    }

    pub fn with_earnings(mut self, amount: f64, cost: f64) -> Self {
        self.record.amount = amount;
        self.record.cost = cost;
        self
    }

    pub fn via_proxy(mut self, key: &str) -> Self {
        self.record.proxy = Some(key.to_string());
        self
    }

    pub fn build(self) -> OutcomeRecord {
        self.record
    }
}
