use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use claim_errors::SchedulerError;

/// 代理来源提供的候选身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyCandidate {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyCandidate {
    /// 池内唯一键：同一地址的不同账号视为不同身份
    pub fn key(&self) -> String {
        match &self.username {
            Some(user) => format!("{}@{}:{}", user, self.host, self.port),
            None => format!("{}:{}", self.host, self.port),
        }
    }
}

impl FromStr for ProxyCandidate {
    type Err = SchedulerError;

    /// 支持 `host:port`、`user:pass@host:port`，可带 `scheme://` 前缀
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let (scheme, rest) = match raw.split_once("://") {
            Some((scheme, rest)) => (scheme.to_lowercase(), rest),
            None => ("http".to_string(), raw),
        };

        let (credentials, address) = match rest.rsplit_once('@') {
            Some((credentials, address)) => (Some(credentials), address),
            None => (None, rest),
        };

        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| SchedulerError::InvalidProxy(format!("缺少端口: {raw}")))?;
        if host.is_empty() {
            return Err(SchedulerError::InvalidProxy(format!("缺少主机: {raw}")));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| SchedulerError::InvalidProxy(format!("端口无效: {raw}")))?;

        let (username, password) = match credentials {
            Some(credentials) => match credentials.split_once(':') {
                Some((user, pass)) => (Some(user.to_string()), Some(pass.to_string())),
                None => (Some(credentials.to_string()), None),
            },
            None => (None, None),
        };
        if username.as_deref() == Some("") {
            return Err(SchedulerError::InvalidProxy(format!("用户名为空: {raw}")));
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            username,
            password,
        })
    }
}

/// 代理池计数，用于诊断和运行模式判断
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolCounts {
    pub total: usize,
    pub healthy: usize,
    pub cooling: usize,
    pub burned: usize,
    /// 健康但正被其他分发占用
    pub in_use: usize,
    /// 最早恢复可用的时间
    pub next_available_at: Option<DateTime<Utc>>,
}

impl PoolCounts {
    pub fn unavailable(&self) -> usize {
        self.cooling + self.burned
    }

    pub fn shortest_wait(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.next_available_at.map(|at| at - now)
    }
}

impl std::fmt::Display for PoolCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "total={} healthy={} cooling={} burned={} in_use={}",
            self.total, self.healthy, self.cooling, self.burned, self.in_use
        )
    }
}

/// 运行模式，携带该模式下的最大并发分发数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "max_concurrent_dispatch")]
pub enum OperationMode {
    Normal(usize),
    LowProxy(usize),
    Critical(usize),
}

impl OperationMode {
    pub fn max_concurrent_dispatch(&self) -> usize {
        match self {
            OperationMode::Normal(n) | OperationMode::LowProxy(n) | OperationMode::Critical(n) => {
                *n
            }
        }
    }

    /// 数值越大越严格
    pub fn severity(&self) -> u8 {
        match self {
            OperationMode::Normal(_) => 0,
            OperationMode::LowProxy(_) => 1,
            OperationMode::Critical(_) => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OperationMode::Normal(_) => "Normal",
            OperationMode::LowProxy(_) => "LowProxy",
            OperationMode::Critical(_) => "Critical",
        }
    }

    /// Critical 模式下不允许新任务进入轮转
    pub fn admits_new_tasks(&self) -> bool {
        !matches!(self, OperationMode::Critical(_))
    }
}

impl std::fmt::Display for OperationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.max_concurrent_dispatch())
    }
}

/// 按需从结果日志推导的收益指标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitabilityMetric {
    pub task_id: String,
    pub window_hours: i64,
    pub sample_count: u32,
    pub success_count: u32,
    pub total_earnings: f64,
    pub total_cost: f64,
    pub net_profit: f64,
    pub roi_percentage: f64,
    pub profit_per_day: f64,
    pub profitability_score: f64,
}

impl ProfitabilityMetric {
    pub fn empty<S: Into<String>>(task_id: S, window_hours: i64) -> Self {
        Self {
            task_id: task_id.into(),
            window_hours,
            sample_count: 0,
            success_count: 0,
            total_earnings: 0.0,
            total_cost: 0.0,
            net_profit: 0.0,
            roi_percentage: 0.0,
            profit_per_day: 0.0,
            profitability_score: 0.0,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.sample_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.sample_count as f64
        }
    }
}

/// 调度中使用的最长时长（30天），与配置校验的上限一致
pub const MAX_SPAN_SECONDS: i64 = 30 * 24 * 3600;

fn max_span() -> Duration {
    Duration::seconds(MAX_SPAN_SECONDS)
}

/// 秒数转换为时长，超过上限时截断
pub fn span_from_secs(seconds: u64) -> Duration {
    i64::try_from(seconds)
        .ok()
        .filter(|s| *s <= MAX_SPAN_SECONDS)
        .and_then(Duration::try_seconds)
        .unwrap_or_else(max_span)
}

/// 小数秒转换为毫秒精度的时长；负数和 NaN 视为 0
pub fn span_from_secs_f64(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::zero();
    }
    let millis = (seconds.min(MAX_SPAN_SECONDS as f64) * 1000.0).round() as i64;
    Duration::try_milliseconds(millis).unwrap_or_else(max_span)
}

pub fn span_from_hours(hours: i64) -> Duration {
    span_from_secs((hours.max(0) as u64).saturating_mul(3600))
}

/// `now + span`，溢出时取可表示的最大时间
pub fn later(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    now.checked_add_signed(span).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `now - span`，溢出时取可表示的最小时间
pub fn earlier(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_address() {
        let candidate: ProxyCandidate = "10.1.2.3:8080".parse().unwrap();
        assert_eq!(candidate.scheme, "http");
        assert_eq!(candidate.host, "10.1.2.3");
        assert_eq!(candidate.port, 8080);
        assert_eq!(candidate.username, None);
        assert_eq!(candidate.key(), "10.1.2.3:8080");
    }

    #[test]
    fn test_parse_credentials_and_scheme() {
        let candidate: ProxyCandidate = "socks5://alice:p@ss@proxy.example.net:1080"
            .parse()
            .unwrap();
        assert_eq!(candidate.scheme, "socks5");
        assert_eq!(candidate.username.as_deref(), Some("alice"));
        assert_eq!(candidate.password.as_deref(), Some("p@ss"));
        assert_eq!(candidate.host, "proxy.example.net");
        assert_eq!(candidate.key(), "alice@proxy.example.net:1080");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("no-port".parse::<ProxyCandidate>().is_err());
        assert!(":8080".parse::<ProxyCandidate>().is_err());
        assert!("host:99999".parse::<ProxyCandidate>().is_err());
        assert!(":pw@host:80".parse::<ProxyCandidate>().is_err());
    }

    #[test]
    fn test_operation_mode_display() {
        assert_eq!(OperationMode::Normal(3).to_string(), "Normal(3)");
        assert_eq!(OperationMode::Critical(1).max_concurrent_dispatch(), 1);
        assert!(!OperationMode::Critical(1).admits_new_tasks());
        assert!(OperationMode::LowProxy(2).admits_new_tasks());
    }

    #[test]
    fn test_spans_are_capped() {
        let max = Duration::seconds(MAX_SPAN_SECONDS);
        assert_eq!(span_from_secs(90), Duration::seconds(90));
        assert_eq!(span_from_secs(u64::MAX), max);
        assert_eq!(span_from_secs_f64(1.5), Duration::milliseconds(1500));
        assert_eq!(span_from_secs_f64(f64::INFINITY), max);
        assert_eq!(span_from_secs_f64(f64::NAN), Duration::zero());
        assert_eq!(span_from_hours(i64::MAX), max);
        assert_eq!(span_from_hours(-3), Duration::zero());

        let now = Utc::now();
        assert_eq!(later(DateTime::<Utc>::MAX_UTC, max), DateTime::<Utc>::MAX_UTC);
        assert_eq!(earlier(DateTime::<Utc>::MIN_UTC, max), DateTime::<Utc>::MIN_UTC);
        assert_eq!(later(now, max) - now, max);
    }
}
