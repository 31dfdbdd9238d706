use std::sync::Once;

use chrono::{DateTime, Duration, Utc};
use claim_domain::{OutcomeKind, OutcomeRecord, ProxyCandidate};

use crate::builders::OutcomeRecordBuilder;

static INIT: Once = Once::new();

/// 初始化测试日志，`RUST_LOG` 可覆盖级别
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// `count` 个互不相同的代理候选：10.0.{i/250}.{i%250+1}:8080
pub fn proxy_candidates(count: usize) -> Vec<ProxyCandidate> {
    (0..count)
        .map(|i| ProxyCandidate {
            scheme: "http".to_string(),
            host: format!("10.0.{}.{}", i / 250, i % 250 + 1),
            port: 8080,
            username: None,
            password: None,
        })
        .collect()
}

/// 在 `[now - span, now)` 内均匀分布的 `count` 条成功记录，净收益合计为 `total_net`
pub fn outcome_history(
    task_id: &str,
    now: DateTime<Utc>,
    span: Duration,
    count: usize,
    total_net: f64,
) -> Vec<OutcomeRecord> {
    if count == 0 {
        return Vec::new();
    }
    let step = span / count as i32;
    let per_claim = total_net / count as f64;
    (0..count)
        .map(|i| {
            let at = now - span + step * i as i32 + Duration::seconds(1);
            let builder = OutcomeRecordBuilder::new(task_id)
                .at(at)
                .with_kind(OutcomeKind::Success);
            if per_claim >= 0.0 {
                builder.with_earnings(per_claim, 0.0).build()
            } else {
                builder.with_earnings(0.0, -per_claim).build()
            }
        })
        .collect()
}
