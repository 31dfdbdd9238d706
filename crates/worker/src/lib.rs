//! # Claim Worker
//!
//! 认领执行器：每次分发启动一次外部认领命令，按退出码对结果分类。

pub mod process_executor;

pub use process_executor::{ClaimReport, ProcessExecutor};
