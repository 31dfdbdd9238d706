//! 调度核心的外部适配层
//!
//! 结果日志、快照存储、代理来源、健康探测，以及日志和指标的初始化。

pub mod health_probe;
pub mod observability;
pub mod outcome_log;
pub mod proxy_source;
pub mod snapshot_store;

pub use health_probe::TcpConnectProbe;
pub use observability::{
    init_logging, init_metrics, init_observability, DispatchTracer, MetricsCollector,
    StructuredLogger,
};
pub use outcome_log::{InMemoryOutcomeLog, JsonlOutcomeLog};
pub use proxy_source::{parse_proxy_lines, FileProxySource, StaticProxySource};
pub use snapshot_store::JsonSnapshotStore;
