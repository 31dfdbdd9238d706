//! 配置模型与加载
//!
//! 加载顺序：内置默认值 → TOML 配置文件 → `CLAIM_` 前缀的环境变量。
//! 每个配置段都提供 `validate()`，由 [`AppConfig::validate`] 统一调用。

pub mod models;

pub use models::{
    AppConfig, ExecutorConfig, LogFormat, NegativeScorePolicy, ObservabilityConfig,
    OperationModeConfig, PersistenceConfig, ProfitabilityConfig, ProxyPoolConfig,
    SchedulerConfig, TaskDefinition, MAX_SPAN_SECONDS,
};

#[cfg(test)]
mod tests;
