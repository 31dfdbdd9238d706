pub mod app_config;
pub mod executor;
pub mod observability;
pub mod operation_mode;
pub mod persistence;
pub mod profitability;
pub mod proxy_pool;
pub mod scheduler;
pub mod task;

pub use app_config::*;
pub use executor::*;
pub use observability::*;
pub use operation_mode::*;
pub use persistence::*;
pub use profitability::*;
pub use proxy_pool::*;
pub use scheduler::*;
pub use task::*;

/// 时长类配置的上限：30天
pub const MAX_SPAN_SECONDS: u64 = 30 * 24 * 3600;

pub(crate) fn ensure_span(name: &str, seconds: u64) -> anyhow::Result<()> {
    if seconds > MAX_SPAN_SECONDS {
        return Err(anyhow::anyhow!(
            "{}({}秒)不能超过{}秒",
            name,
            seconds,
            MAX_SPAN_SECONDS
        ));
    }
    Ok(())
}
