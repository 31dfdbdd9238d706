//! 代理感知的认领任务调度系统
//!
//! 应用装配、代理池维护循环与优雅关闭。调度核心在 `claim-dispatcher` 中。

pub mod app;
pub mod shutdown;

pub use app::{Application, Components, MaintenanceReport};
pub use shutdown::{wait_for_shutdown_signal, ShutdownManager};
