//! 收益评估
//!
//! 从结果日志推导每个任务的收益分数，给出优先级系数和停用/启用决策。
//! 只产出决策，由调度器负责应用。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use claim_config::ProfitabilityConfig;
use claim_domain::{
    earlier, later, span_from_hours, DisableReason, Job, OutcomeLog, OutcomeRecord,
    ProfitabilityMetric,
};
use claim_errors::SchedulerResult;
use serde::Serialize;
use tracing::debug;

use crate::priority::{priority_for_score, PriorityDecision};

const ROI_FLOOR: f64 = -100.0;
const ROI_CEILING: f64 = 300.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ProfitabilityDecision {
    Keep,
    SetMultiplier {
        multiplier: f64,
        metric: ProfitabilityMetric,
    },
    Disable {
        until: DateTime<Utc>,
        metric: ProfitabilityMetric,
    },
    Enable {
        multiplier: f64,
        metric: ProfitabilityMetric,
    },
}

pub struct ProfitabilityOptimizer {
    config: ProfitabilityConfig,
    outcome_log: Arc<dyn OutcomeLog>,
}

impl ProfitabilityOptimizer {
    pub fn new(config: ProfitabilityConfig, outcome_log: Arc<dyn OutcomeLog>) -> Self {
        Self {
            config,
            outcome_log,
        }
    }

    /// 根据窗口内的结果记录计算收益指标
    ///
    /// 分数 = profit_weight × 日均净收益 × profit_scale + roi_weight × ROI × 置信度，
    /// 置信度随样本数线性增长，达到停用样本下限时为 1。
    pub fn compute_metric(
        config: &ProfitabilityConfig,
        task_id: &str,
        records: &[OutcomeRecord],
        window_hours: i64,
    ) -> ProfitabilityMetric {
        if records.is_empty() {
            return ProfitabilityMetric::empty(task_id, window_hours);
        }

        let sample_count = records.len() as u32;
        let success_count = records.iter().filter(|r| r.success).count() as u32;
        let total_earnings: f64 = records.iter().map(|r| r.amount).sum();
        let total_cost: f64 = records.iter().map(|r| r.cost).sum();
        let net_profit = total_earnings - total_cost;

        let window_days = (window_hours as f64 / 24.0).max(1.0 / 24.0);
        let profit_per_day = net_profit / window_days;

        let raw_roi = if total_cost > 0.0 {
            net_profit / total_cost * 100.0
        } else if net_profit > 0.0 {
            100.0
        } else {
            0.0
        };
        let roi_percentage = raw_roi.clamp(ROI_FLOOR, ROI_CEILING);

        let confidence = if config.min_claims_for_disable == 0 {
            1.0
        } else {
            (sample_count as f64 / config.min_claims_for_disable as f64).min(1.0)
        };

        let profitability_score = config.profit_weight * profit_per_day * config.profit_scale
            + config.roi_weight * roi_percentage * confidence;

        ProfitabilityMetric {
            task_id: task_id.to_string(),
            window_hours,
            sample_count,
            success_count,
            total_earnings,
            total_cost,
            net_profit,
            roi_percentage,
            profit_per_day,
            profitability_score,
        }
    }

    pub async fn score(
        &self,
        task_id: &str,
        window_hours: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<ProfitabilityMetric> {
        let since = earlier(now, span_from_hours(window_hours));
        let records = self.outcome_log.query(task_id, since, now).await?;
        let metric = Self::compute_metric(&self.config, task_id, &records, window_hours);
        debug!(
            task.id = task_id,
            window_hours = window_hours,
            samples = metric.sample_count,
            net_profit = metric.net_profit,
            score = metric.profitability_score,
            "计算收益分数"
        );
        Ok(metric)
    }

    fn cooldown(&self) -> Duration {
        span_from_hours(self.config.disable_cooldown_hours)
    }

    /// 评估单个任务
    ///
    /// - 因收益停用且冷却已过：分数为负则延长停用，否则以中性系数重新启用
    /// - 启用中：长窗口净收益为负且样本足够则停用，否则按短窗口分数更新系数
    /// - 其他停用原因（致命错误、配置停用）不自动处理
    pub async fn evaluate(&self, job: &Job, now: DateTime<Utc>) -> SchedulerResult<ProfitabilityDecision> {
        if !job.enabled {
            if job.disable_reason != Some(DisableReason::Unprofitable) {
                return Ok(ProfitabilityDecision::Keep);
            }
            if job.disabled_until.is_some_and(|until| until > now) {
                return Ok(ProfitabilityDecision::Keep);
            }

            let metric = self.score(&job.id, self.config.lookback_hours, now).await?;
            if metric.sample_count > 0 && metric.profitability_score < 0.0 {
                return Ok(ProfitabilityDecision::Disable {
                    until: later(now, self.cooldown()),
                    metric,
                });
            }
            return Ok(ProfitabilityDecision::Enable {
                multiplier: Job::NEUTRAL_MULTIPLIER,
                metric,
            });
        }

        let long = self
            .score(&job.id, self.config.disable_lookback_hours, now)
            .await?;
        if long.net_profit < 0.0 && long.sample_count >= self.config.min_claims_for_disable {
            return Ok(ProfitabilityDecision::Disable {
                until: later(now, self.cooldown()),
                metric: long,
            });
        }

        let metric = self.score(&job.id, self.config.lookback_hours, now).await?;
        if metric.sample_count == 0 {
            return Ok(ProfitabilityDecision::Keep);
        }
        Ok(
            match priority_for_score(metric.profitability_score, self.config.negative_score_policy) {
                PriorityDecision::Multiplier(multiplier) => {
                    ProfitabilityDecision::SetMultiplier { multiplier, metric }
                }
                PriorityDecision::Disable => ProfitabilityDecision::Disable {
                    until: later(now, self.cooldown()),
                    metric,
                },
            },
        )
    }
}
