use claim_config::OperationModeConfig;
use claim_domain::OperationMode;
use claim_infrastructure::StructuredLogger;
use tracing::info;

/// 由健康代理数量推导运行模式
pub fn mode_for(config: &OperationModeConfig, healthy: usize) -> OperationMode {
    if healthy >= config.normal_threshold {
        OperationMode::Normal(config.normal_concurrency)
    } else if healthy >= config.low_proxy_threshold {
        OperationMode::LowProxy(config.low_proxy_concurrency)
    } else {
        OperationMode::Critical(config.critical_concurrency)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub from: Option<OperationMode>,
    pub to: OperationMode,
    pub healthy: usize,
}

/// 只保存上一次的模式，用于发现切换
#[derive(Debug, Clone)]
pub struct DegradedModeController {
    config: OperationModeConfig,
    last: Option<OperationMode>,
}

impl DegradedModeController {
    pub fn new(config: OperationModeConfig) -> Self {
        Self { config, last: None }
    }

    pub fn mode(&self, healthy: usize) -> OperationMode {
        mode_for(&self.config, healthy)
    }

    pub fn current(&self) -> Option<OperationMode> {
        self.last
    }

    /// 记录本次观察；模式变化时返回切换
    pub fn observe(&mut self, healthy: usize) -> (OperationMode, Option<ModeTransition>) {
        let mode = self.mode(healthy);
        if self.last == Some(mode) {
            return (mode, None);
        }

        let transition = ModeTransition {
            from: self.last,
            to: mode,
            healthy,
        };
        match transition.from {
            Some(from) => StructuredLogger::log_mode_transition(Some(&from), &mode, healthy),
            None => info!(pool.healthy = healthy, "初始运行模式: {}", mode),
        }
        self.last = Some(mode);
        (mode, Some(transition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_thresholds() {
        let config = OperationModeConfig::default();
        assert_eq!(mode_for(&config, 12), OperationMode::Normal(3));
        assert_eq!(mode_for(&config, 10), OperationMode::Normal(3));
        assert_eq!(mode_for(&config, 9), OperationMode::LowProxy(2));
        assert_eq!(mode_for(&config, 3), OperationMode::LowProxy(2));
        assert_eq!(mode_for(&config, 2), OperationMode::Critical(1));
        assert_eq!(mode_for(&config, 0), OperationMode::Critical(1));
    }

    #[test]
    fn test_mode_is_monotonic() {
        let config = OperationModeConfig::default();
        let mut previous = mode_for(&config, 50);
        for healthy in (0..50).rev() {
            let mode = mode_for(&config, healthy);
            assert!(mode.max_concurrent_dispatch() <= previous.max_concurrent_dispatch());
            assert!(mode.severity() >= previous.severity());
            previous = mode;
        }
    }

    #[test]
    fn test_observe_reports_transitions_only() {
        let mut controller = DegradedModeController::new(OperationModeConfig::default());

        let (mode, transition) = controller.observe(12);
        assert_eq!(mode, OperationMode::Normal(3));
        assert_eq!(transition.unwrap().from, None);

        assert!(controller.observe(10).1.is_none());

        let transition = controller.observe(9).1.unwrap();
        assert_eq!(transition.from, Some(OperationMode::Normal(3)));
        assert_eq!(transition.to, OperationMode::LowProxy(2));
        assert_eq!(controller.current(), Some(OperationMode::LowProxy(2)));
    }
}
