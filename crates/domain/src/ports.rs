//! 外部协作方接口
//!
//! 调度核心只通过这些接口与浏览器执行、结果存储、代理供应等外部系统交互。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{Job, Outcome, OutcomeRecord, ProxyRecord};
use crate::snapshot::Snapshot;
use crate::value_objects::ProxyCandidate;
use claim_errors::SchedulerResult;

/// 执行一次认领；调度器只关心结果分类
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, job: &Job, proxy: &ProxyRecord) -> SchedulerResult<Outcome>;

    fn name(&self) -> &str;
}

/// 只追加的结果日志
#[async_trait]
pub trait OutcomeLog: Send + Sync {
    async fn append(&self, record: &OutcomeRecord) -> SchedulerResult<()>;

    /// 返回 `[since, until)` 区间内该任务的记录
    async fn query(
        &self,
        task_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> SchedulerResult<Vec<OutcomeRecord>>;
}

/// 自动补充代理时的候选来源
#[async_trait]
pub trait ProxySource: Send + Sync {
    async fn fetch(&self, max: usize) -> SchedulerResult<Vec<ProxyCandidate>>;

    fn name(&self) -> &str;
}

/// 代理连通性探测，返回延迟毫秒数
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, proxy: &ProxyRecord) -> SchedulerResult<u64>;
}

/// Job 表与代理表的持久化快照
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// 快照不存在或损坏时返回 `None`
    async fn load(&self) -> SchedulerResult<Option<Snapshot>>;

    async fn save(&self, snapshot: &Snapshot) -> SchedulerResult<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
