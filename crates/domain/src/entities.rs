use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::ProxyCandidate;
use claim_errors::SchedulerError;

/// Job 的调度状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Dispatched,
    /// 连续失败后的惩罚期，到期后惰性地回到 Idle
    Cooling { until: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DisableReason {
    /// 收益持续为负，冷却期后自动重新评估
    Unprofitable,
    /// 任务配置错误，需要人工启用
    Fatal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub base_interval_seconds: u64,
    pub next_run: DateTime<Utc>,
    pub priority_multiplier: f64,
    pub consecutive_failures: u32,
    pub state: JobState,
    pub enabled: bool,
    #[serde(default)]
    pub disabled_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub disable_reason: Option<DisableReason>,
    #[serde(default)]
    pub last_priority_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_runs: u64,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

impl Job {
    pub const MIN_MULTIPLIER: f64 = 0.5;
    pub const MAX_MULTIPLIER: f64 = 2.0;
    pub const NEUTRAL_MULTIPLIER: f64 = 1.0;

    /// 新任务立即到期
    pub fn new<S: Into<String>>(id: S, base_interval_seconds: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            base_interval_seconds,
            next_run: now,
            priority_multiplier: Self::NEUTRAL_MULTIPLIER,
            consecutive_failures: 0,
            state: JobState::Idle,
            enabled: true,
            disabled_until: None,
            disable_reason: None,
            last_priority_update: None,
            last_run_at: None,
            total_runs: 0,
            parameters: None,
        }
    }

    /// 冷却到期的任务视为 Idle
    pub fn state_at(&self, now: DateTime<Utc>) -> JobState {
        match self.state {
            JobState::Cooling { until } if until <= now => JobState::Idle,
            state => state,
        }
    }

    pub fn is_dispatched(&self) -> bool {
        matches!(self.state, JobState::Dispatched)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.state_at(now) == JobState::Idle && self.next_run <= now
    }

    pub fn set_multiplier(&mut self, multiplier: f64) {
        self.priority_multiplier = multiplier.clamp(Self::MIN_MULTIPLIER, Self::MAX_MULTIPLIER);
    }

    pub fn disable(&mut self, reason: DisableReason, until: Option<DateTime<Utc>>) {
        self.enabled = false;
        self.disable_reason = Some(reason);
        self.disabled_until = until;
    }

    pub fn enable(&mut self) {
        self.enabled = true;
        self.disable_reason = None;
        self.disabled_until = None;
    }
}

/// 代理健康状态，`until` 到期后惰性地视为 Healthy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", content = "until", rename_all = "snake_case")]
pub enum ProxyHealth {
    Healthy,
    Cooldown(DateTime<Utc>),
    Burned(DateTime<Utc>),
}

impl ProxyHealth {
    pub fn until(&self) -> Option<DateTime<Utc>> {
        match self {
            ProxyHealth::Healthy => None,
            ProxyHealth::Cooldown(until) | ProxyHealth::Burned(until) => Some(*until),
        }
    }

    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        self.until().map_or(true, |until| until <= now)
    }

    pub fn effective(&self, now: DateTime<Utc>) -> ProxyHealth {
        if self.is_available_at(now) {
            ProxyHealth::Healthy
        } else {
            *self
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub key: String,
    pub scheme: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub health: ProxyHealth,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    pub consecutive_failures: u32,
    #[serde(default)]
    pub cooldown_count: u32,
    #[serde(default)]
    pub burn_count: u32,
    #[serde(default)]
    pub last_assigned_profile: Option<String>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    pub added_at: DateTime<Utc>,
    /// 当前持有该代理的分发；只存在于内存中
    #[serde(skip)]
    pub in_use_by: Option<String>,
}

impl ProxyRecord {
    pub fn from_candidate(candidate: &ProxyCandidate, now: DateTime<Utc>) -> Self {
        Self {
            key: candidate.key(),
            scheme: candidate.scheme.clone(),
            host: candidate.host.clone(),
            port: candidate.port,
            username: candidate.username.clone(),
            password: candidate.password.clone(),
            health: ProxyHealth::Healthy,
            latency_ms: None,
            consecutive_failures: 0,
            cooldown_count: 0,
            burn_count: 0,
            last_assigned_profile: None,
            last_used_at: None,
            added_at: now,
            in_use_by: None,
        }
    }

    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        self.health.is_available_at(now)
    }

    /// 施加冷却或封禁；已生效且更晚到期的惩罚不会被缩短
    pub fn apply_penalty(&mut self, penalty: ProxyHealth, now: DateTime<Utc>) -> bool {
        let Some(new_until) = penalty.until() else {
            return false;
        };
        if !self.health.is_available_at(now) && self.health.until() >= Some(new_until) {
            return false;
        }
        self.health = penalty;
        match penalty {
            ProxyHealth::Cooldown(_) => self.cooldown_count += 1,
            ProxyHealth::Burned(_) => self.burn_count += 1,
            ProxyHealth::Healthy => {}
        }
        true
    }

    /// 带凭据的代理 URL，交给执行器使用
    pub fn url(&self) -> String {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                format!("{}://{}:{}@{}:{}", self.scheme, user, pass, self.host, self.port)
            }
            (Some(user), None) => format!("{}://{}@{}:{}", self.scheme, user, self.host, self.port),
            _ => format!("{}://{}:{}", self.scheme, self.host, self.port),
        }
    }

    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    /// 网络抖动、超时等，可重试，代理轻度惩罚
    TransientFailure,
    /// 目标站点明确识别出自动化流量，代理立即封禁
    DetectionFailure,
    /// 任务配置错误，停用直到人工介入
    Fatal,
}

impl OutcomeKind {
    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeKind::Success)
    }

    /// 该结果是否应归咎于当前代理
    pub fn is_proxy_attributable(&self) -> bool {
        matches!(
            self,
            OutcomeKind::TransientFailure | OutcomeKind::DetectionFailure
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::TransientFailure => "transient_failure",
            OutcomeKind::DetectionFailure => "detection_failure",
            OutcomeKind::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Earnings {
    pub amount: f64,
    /// 可归因成本，例如验证码费用
    pub cost: f64,
}

/// 一次分发的执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub kind: OutcomeKind,
    #[serde(default)]
    pub earnings: Option<Earnings>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Outcome {
    pub fn new(kind: OutcomeKind) -> Self {
        Self {
            kind,
            earnings: None,
            latency_ms: None,
            message: None,
        }
    }

    pub fn success(amount: f64, cost: f64) -> Self {
        Self::new(OutcomeKind::Success).with_earnings(Earnings { amount, cost })
    }

    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::new(OutcomeKind::TransientFailure).with_message(message)
    }

    pub fn detection<S: Into<String>>(message: S) -> Self {
        Self::new(OutcomeKind::DetectionFailure).with_message(message)
    }

    pub fn fatal<S: Into<String>>(message: S) -> Self {
        Self::new(OutcomeKind::Fatal).with_message(message)
    }

    /// 执行器返回的错误在分发边界转换为结果
    pub fn from_error(error: &SchedulerError) -> Self {
        if error.is_fatal() {
            Self::fatal(error.to_string())
        } else {
            Self::transient(error.to_string())
        }
    }

    pub fn with_earnings(mut self, earnings: Earnings) -> Self {
        self.earnings = Some(earnings);
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// 结果日志中的一行
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutcomeRecord {
    pub timestamp: DateTime<Utc>,
    pub task_id: String,
    pub kind: OutcomeKind,
    pub success: bool,
    pub amount: f64,
    pub cost: f64,
    #[serde(default)]
    pub proxy: Option<String>,
}

impl OutcomeRecord {
    pub fn from_outcome(
        task_id: &str,
        outcome: &Outcome,
        proxy: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let earnings = outcome.earnings.unwrap_or_default();
        Self {
            timestamp,
            task_id: task_id.to_string(),
            kind: outcome.kind,
            success: outcome.kind.is_success(),
            amount: earnings.amount,
            cost: earnings.cost,
            proxy: proxy.map(str::to_string),
        }
    }

    pub fn net(&self) -> f64 {
        self.amount - self.cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn candidate() -> ProxyCandidate {
        "bob:pw@192.168.1.5:3128".parse().unwrap()
    }

    #[test]
    fn test_health_lazy_expiry() {
        let now = Utc::now();
        let cooling = ProxyHealth::Cooldown(now + Duration::minutes(5));
        assert!(!cooling.is_available_at(now));
        assert!(cooling.is_available_at(now + Duration::minutes(5)));
        assert_eq!(
            cooling.effective(now + Duration::minutes(6)),
            ProxyHealth::Healthy
        );
    }

    #[test]
    fn test_penalty_never_shortens_active_burn() {
        let now = Utc::now();
        let mut record = ProxyRecord::from_candidate(&candidate(), now);

        let burn_until = now + Duration::hours(12);
        assert!(record.apply_penalty(ProxyHealth::Burned(burn_until), now));

        // 封禁期间的冷却不会覆盖更晚的封禁时间
        let applied = record.apply_penalty(ProxyHealth::Cooldown(now + Duration::minutes(5)), now);
        assert!(!applied);
        assert_eq!(record.health, ProxyHealth::Burned(burn_until));
        assert_eq!(record.burn_count, 1);
        assert_eq!(record.cooldown_count, 0);
    }

    #[test]
    fn test_penalty_after_expiry_replaces_health() {
        let now = Utc::now();
        let mut record = ProxyRecord::from_candidate(&candidate(), now);
        record.apply_penalty(ProxyHealth::Cooldown(now + Duration::minutes(5)), now);

        let later = now + Duration::minutes(10);
        assert!(record.apply_penalty(ProxyHealth::Cooldown(later + Duration::minutes(5)), later));
        assert_eq!(record.cooldown_count, 2);
    }

    #[test]
    fn test_proxy_url_with_credentials() {
        let record = ProxyRecord::from_candidate(&candidate(), Utc::now());
        assert_eq!(record.url(), "http://bob:pw@192.168.1.5:3128");
        assert_eq!(record.socket_address(), "192.168.1.5:3128");
    }

    #[test]
    fn test_job_cooling_expires_lazily() {
        let now = Utc::now();
        let mut job = Job::new("faucet", 3600, now);
        job.state = JobState::Cooling {
            until: now + Duration::minutes(30),
        };
        assert!(!job.is_due(now));
        assert_eq!(job.state_at(now + Duration::minutes(31)), JobState::Idle);
        assert!(job.is_due(now + Duration::minutes(31)));
    }

    #[test]
    fn test_job_multiplier_is_bounded() {
        let mut job = Job::new("faucet", 3600, Utc::now());
        job.set_multiplier(0.1);
        assert_eq!(job.priority_multiplier, Job::MIN_MULTIPLIER);
        job.set_multiplier(9.0);
        assert_eq!(job.priority_multiplier, Job::MAX_MULTIPLIER);
    }

    #[test]
    fn test_outcome_from_error() {
        let fatal = Outcome::from_error(&SchedulerError::invalid_params("missing address"));
        assert_eq!(fatal.kind, OutcomeKind::Fatal);

        let transient = Outcome::from_error(&SchedulerError::Network("reset".to_string()));
        assert_eq!(transient.kind, OutcomeKind::TransientFailure);
    }
}
