//! 领域事件
//!
//! 调度核心对外发布的诊断事件，供告警和运维工具订阅。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::DisableReason;
use crate::value_objects::{OperationMode, PoolCounts};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerEvent {
    PoolExhausted {
        profile: String,
        counts: PoolCounts,
    },
    ProxyAdded {
        key: String,
    },
    ProxyCooledDown {
        key: String,
        until: DateTime<Utc>,
        consecutive_failures: u32,
    },
    ProxyBurned {
        key: String,
        until: DateTime<Utc>,
        burn_count: u32,
    },
    ProxyEvicted {
        key: String,
        consecutive_failures: u32,
        burn_count: u32,
    },
    ModeChanged {
        from: Option<OperationMode>,
        to: OperationMode,
        healthy_proxies: usize,
    },
    JobCooling {
        task_id: String,
        until: DateTime<Utc>,
        consecutive_failures: u32,
    },
    TaskDisabled {
        task_id: String,
        reason: DisableReason,
        until: Option<DateTime<Utc>>,
    },
    TaskEnabled {
        task_id: String,
    },
}

impl SchedulerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SchedulerEvent::PoolExhausted { .. } => "PoolExhausted",
            SchedulerEvent::ProxyAdded { .. } => "ProxyAdded",
            SchedulerEvent::ProxyCooledDown { .. } => "ProxyCooledDown",
            SchedulerEvent::ProxyBurned { .. } => "ProxyBurned",
            SchedulerEvent::ProxyEvicted { .. } => "ProxyEvicted",
            SchedulerEvent::ModeChanged { .. } => "ModeChanged",
            SchedulerEvent::JobCooling { .. } => "JobCooling",
            SchedulerEvent::TaskDisabled { .. } => "TaskDisabled",
            SchedulerEvent::TaskEnabled { .. } => "TaskEnabled",
        }
    }
}

/// 带事件ID和发生时间的事件封装
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub event: SchedulerEvent,
}

impl EventEnvelope {
    pub fn new(event: SchedulerEvent, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_at,
            event,
        }
    }
}
