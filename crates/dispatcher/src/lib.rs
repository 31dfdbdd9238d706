//! 调度核心
//!
//! - [`ProxyManager`]：代理分配、轮换、健康惩罚与维护
//! - [`Scheduler`]：tick 循环、并发上限、分发与完成
//! - [`ProfitabilityOptimizer`]：收益评分与停用/启用决策
//! - [`DegradedModeController`]：按健康代理数量决定运行模式

pub mod degraded_mode;
pub mod event_bus;
pub mod priority;
pub mod profitability;
pub mod proxy_manager;
pub mod proxy_store;
pub mod scheduler;

pub use degraded_mode::{mode_for, DegradedModeController, ModeTransition};
pub use event_bus::EventBus;
pub use priority::{priority_for_score, PriorityDecision};
pub use profitability::{ProfitabilityDecision, ProfitabilityOptimizer};
pub use proxy_manager::{Assignment, ProbeSummary, ProxyManager, ProxyPolicy};
pub use proxy_store::ProxyStore;
pub use scheduler::{
    JobStatus, PriorityPreview, RunOnceResult, Scheduler, SchedulerDeps, SchedulerStatus,
    TickReport,
};
