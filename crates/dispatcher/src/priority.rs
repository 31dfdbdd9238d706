use claim_config::NegativeScorePolicy;
use claim_domain::Job;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "action", content = "multiplier", rename_all = "snake_case")]
pub enum PriorityDecision {
    Multiplier(f64),
    Disable,
}

fn interpolate(score: f64, low: f64, high: f64, at_low: f64, at_high: f64) -> f64 {
    at_low + (score - low) / (high - low) * (at_high - at_low)
}

/// 收益分数到优先级系数的阶梯函数，分数越高系数越小（运行越频繁）
///
/// | score      | multiplier |
/// |------------|------------|
/// | > 200      | 0.5        |
/// | 100..=200  | 0.8 → 0.6  |
/// | 50..100    | 1.0 → 0.9  |
/// | 0..50      | 1.5 → 1.0  |
/// | < 0        | 2.0 或停用 |
pub fn priority_for_score(score: f64, policy: NegativeScorePolicy) -> PriorityDecision {
    if score.is_nan() {
        return PriorityDecision::Multiplier(Job::NEUTRAL_MULTIPLIER);
    }
    let multiplier = if score > 200.0 {
        0.5
    } else if score >= 100.0 {
        interpolate(score, 100.0, 200.0, 0.8, 0.6)
    } else if score >= 50.0 {
        interpolate(score, 50.0, 100.0, 1.0, 0.9)
    } else if score >= 0.0 {
        interpolate(score, 0.0, 50.0, 1.5, 1.0)
    } else {
        return match policy {
            NegativeScorePolicy::Deprioritize => PriorityDecision::Multiplier(Job::MAX_MULTIPLIER),
            NegativeScorePolicy::Disable => PriorityDecision::Disable,
        };
    };
    PriorityDecision::Multiplier(multiplier)
}
