use serde::{Deserialize, Serialize};

use super::MAX_SPAN_SECONDS;

/// 收益评分为负时的处理方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NegativeScorePolicy {
    /// 降低频率继续运行（系数 2.0）
    #[default]
    Deprioritize,
    /// 直接停用
    Disable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfitabilityConfig {
    pub lookback_hours: i64,
    /// 停用判定使用的窗口，至少3天
    pub disable_lookback_hours: i64,
    pub min_claims_for_disable: u32,
    pub disable_cooldown_hours: i64,
    pub negative_score_policy: NegativeScorePolicy,
    pub profit_weight: f64,
    pub roi_weight: f64,
    /// 日均净收益换算为分数的比例
    pub profit_scale: f64,
}

impl Default for ProfitabilityConfig {
    fn default() -> Self {
        Self {
            lookback_hours: 24,
            disable_lookback_hours: 7 * 24,
            min_claims_for_disable: 10,
            disable_cooldown_hours: 24,
            negative_score_policy: NegativeScorePolicy::Deprioritize,
            profit_weight: 0.7,
            roi_weight: 0.3,
            profit_scale: 1000.0,
        }
    }
}

impl ProfitabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let max_hours = (MAX_SPAN_SECONDS / 3600) as i64;
        for (name, hours) in [
            ("评分窗口", self.lookback_hours),
            ("停用判定窗口", self.disable_lookback_hours),
            ("停用冷却时长", self.disable_cooldown_hours),
        ] {
            if hours > max_hours {
                return Err(anyhow::anyhow!("{}({}小时)不能超过{}小时", name, hours, max_hours));
            }
        }
        if self.lookback_hours <= 0 {
            return Err(anyhow::anyhow!("评分窗口必须大于0"));
        }
        if self.disable_lookback_hours < 72 {
            return Err(anyhow::anyhow!(
                "停用判定窗口不能少于3天，当前: {}小时",
                self.disable_lookback_hours
            ));
        }
        if self.disable_cooldown_hours <= 0 {
            return Err(anyhow::anyhow!("停用冷却时长必须大于0"));
        }
        if self.profit_weight < 0.0 || self.roi_weight < 0.0 {
            return Err(anyhow::anyhow!("评分权重不能为负"));
        }
        if self.profit_weight < self.roi_weight {
            return Err(anyhow::anyhow!(
                "绝对收益权重({})必须不低于ROI权重({})",
                self.profit_weight,
                self.roi_weight
            ));
        }
        if self.profit_scale <= 0.0 {
            return Err(anyhow::anyhow!("收益换算比例必须大于0"));
        }
        Ok(())
    }
}
