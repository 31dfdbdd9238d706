use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use super::{
    executor::ExecutorConfig, observability::ObservabilityConfig,
    operation_mode::OperationModeConfig, persistence::PersistenceConfig,
    profitability::ProfitabilityConfig, proxy_pool::ProxyPoolConfig, scheduler::SchedulerConfig,
    task::TaskDefinition,
};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub proxy_pool: ProxyPoolConfig,
    pub scheduler: SchedulerConfig,
    pub profitability: ProfitabilityConfig,
    pub operation_mode: OperationModeConfig,
    pub executor: ExecutorConfig,
    pub persistence: PersistenceConfig,
    pub observability: ObservabilityConfig,
    /// 静态任务注册表，每个条目对应一个 Job
    pub tasks: Vec<TaskDefinition>,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Built-in defaults (`#[serde(default)]` on every section)
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: `CLAIM_`, nested separator `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/claim-scheduler.toml",
                "claim-scheduler.toml",
                "/etc/claim-scheduler/config.toml",
            ];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("CLAIM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.proxy_pool.validate().context("代理池配置验证失败")?;
        self.scheduler.validate().context("调度器配置验证失败")?;
        self.profitability
            .validate()
            .context("收益优化配置验证失败")?;
        self.operation_mode
            .validate()
            .context("运行模式配置验证失败")?;
        self.executor.validate().context("执行器配置验证失败")?;
        self.persistence.validate().context("持久化配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        let mut seen = HashSet::new();
        for task in &self.tasks {
            task.validate()
                .with_context(|| format!("任务 {} 配置验证失败", task.id))?;
            if !seen.insert(task.id.as_str()) {
                return Err(anyhow::anyhow!("任务ID重复: {}", task.id));
            }
        }

        Ok(())
    }
}
