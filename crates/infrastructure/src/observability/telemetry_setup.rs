use std::net::SocketAddr;

use anyhow::{Context, Result};
use claim_config::{LogFormat, ObservabilityConfig};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 初始化日志系统，`RUST_LOG` 优先于传入的级别
pub fn init_logging(log_level: &str, log_format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("初始化JSON日志格式失败")?,
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .context("初始化Pretty日志格式失败")?,
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init()
            .context("初始化Compact日志格式失败")?,
    }

    Ok(())
}

/// 安装 Prometheus 导出器，必须在 tokio 运行时内调用
pub fn init_metrics(bind_address: &str) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {bind_address}"))?;

    let (recorder, exporter) = metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .build()
        .map_err(|e| anyhow::anyhow!("创建Prometheus导出器失败: {}", e))?;

    metrics::set_global_recorder(recorder)
        .map_err(|e| anyhow::anyhow!("安装指标记录器失败: {}", e))?;

    tokio::spawn(async move {
        if let Err(e) = exporter.await {
            warn!("Prometheus导出器退出: {:?}", e);
        }
    });

    info!("指标导出已启用: http://{}/metrics", addr);
    Ok(())
}

pub fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    init_logging(&config.log_level, config.log_format)?;
    if config.metrics_enabled {
        init_metrics(&config.metrics_bind_address)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_metrics_rejects_bad_address() {
        let result = init_metrics("not-an-address");
        assert!(result.is_err());
    }
}
