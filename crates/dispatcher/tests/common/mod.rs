#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration as StdDuration;

use claim_config::{AppConfig, TaskDefinition};
use claim_domain::{Clock, EventEnvelope};
use claim_infrastructure::InMemoryOutcomeLog;
use claim_testing_utils::{init_test_logging, proxy_candidates, FakeExecutor, ManualClock};
use tokio::sync::broadcast;

use claim_dispatcher::{EventBus, ProxyManager, ProxyPolicy, Scheduler, SchedulerDeps};

pub struct Harness {
    pub scheduler: Arc<Scheduler>,
    pub proxies: Arc<ProxyManager>,
    pub executor: FakeExecutor,
    pub clock: ManualClock,
    pub log: Arc<InMemoryOutcomeLog>,
    pub config: AppConfig,
}

/// 每个任务 60 秒间隔，执行与关闭超时都缩短到 1 秒
pub fn app_config(tasks: &[&str]) -> AppConfig {
    let mut config = AppConfig::default();
    config.tasks = tasks.iter().map(|id| TaskDefinition::new(*id, 60)).collect();
    config.scheduler.execution_timeout_seconds = 1;
    config.scheduler.shutdown_timeout_seconds = 1;
    config
}

/// 代理数量不影响运行模式，始终为 Normal(3)
pub fn always_normal(mut config: AppConfig) -> AppConfig {
    config.operation_mode.normal_threshold = 0;
    config.operation_mode.low_proxy_threshold = 0;
    config
}

pub async fn harness(config: AppConfig, executor: FakeExecutor, proxy_count: usize) -> Harness {
    init_test_logging();

    let clock = ManualClock::default();
    let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
    let events = EventBus::default();
    let proxies = Arc::new(ProxyManager::new(
        ProxyPolicy::from(&config.proxy_pool),
        Arc::clone(&shared_clock),
        events.clone(),
    ));
    for candidate in proxy_candidates(proxy_count) {
        proxies.add_proxy(&candidate).await;
    }

    let log = Arc::new(InMemoryOutcomeLog::new());
    let scheduler = Scheduler::new(
        &config,
        SchedulerDeps {
            proxies: Arc::clone(&proxies),
            executor: Arc::new(executor.clone()),
            outcome_log: log.clone(),
            clock: shared_clock,
            events,
        },
    );
    scheduler.register_tasks(&config.tasks).await;

    Harness {
        scheduler,
        proxies,
        executor,
        clock,
        log,
        config,
    }
}

/// 等待所有进行中的分发完成
pub async fn settle(scheduler: &Scheduler) {
    tokio::time::timeout(StdDuration::from_secs(5), async {
        while scheduler.outstanding() > 0 {
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
    })
    .await
    .expect("dispatches did not finish in time");
}

pub fn drain(events: &mut broadcast::Receiver<EventEnvelope>) -> Vec<EventEnvelope> {
    let mut drained = Vec::new();
    while let Ok(envelope) = events.try_recv() {
        drained.push(envelope);
    }
    drained
}

/// 等待进行中的分发数降到 `target`
pub async fn wait_outstanding(scheduler: &Scheduler, target: usize) {
    tokio::time::timeout(StdDuration::from_secs(5), async {
        while scheduler.outstanding() > target {
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
    })
    .await
    .expect("outstanding dispatches did not drain");
}
