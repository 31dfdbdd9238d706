//! # Claim Testing Utils
//!
//! 工作区共享的测试工具：可手动推进的时钟、可编排结果的执行器、
//! 内存快照存储、探测桩，以及实体构造器。
//!
//! ```toml
//! [dev-dependencies]
//! claim-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
