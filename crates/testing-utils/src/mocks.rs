//! Test doubles for the scheduler ports

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use claim_domain::{
    Clock, Executor, HealthProbe, Job, Outcome, ProxyRecord, Snapshot, SnapshotStore,
};
use claim_errors::{SchedulerError, SchedulerResult};
use tokio::sync::Semaphore;

/// 可手动推进的时钟
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap() = at;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// FakeExecutor 的单次响应
#[derive(Debug, Clone)]
pub enum FakeResponse {
    Outcome(Outcome),
    /// 以可重试错误返回
    Error(String),
    /// 以任务参数错误返回
    InvalidParams(String),
    Panic,
    /// 永不返回，用于超时测试
    Hang,
}

#[derive(Debug, Default)]
struct ExecutorState {
    scripted: HashMap<String, VecDeque<FakeResponse>>,
    calls: Vec<(String, String)>,
    active_per_task: HashMap<String, usize>,
    max_per_task: HashMap<String, usize>,
    active_per_proxy: HashMap<String, usize>,
    proxy_overlaps: usize,
    active_total: usize,
    max_total: usize,
}

/// 可编排结果的执行器
///
/// 记录每个任务、每个代理的并发执行数，供不变量断言使用。
#[derive(Clone)]
pub struct FakeExecutor {
    state: Arc<Mutex<ExecutorState>>,
    default_response: FakeResponse,
    delay_ms: (u64, u64),
    gate: Option<Arc<Semaphore>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ExecutorState::default())),
            default_response: FakeResponse::Outcome(Outcome::success(0.001, 0.0)),
            delay_ms: (0, 0),
            gate: None,
        }
    }

    pub fn with_default(mut self, response: FakeResponse) -> Self {
        self.default_response = response;
        self
    }

    /// 每次执行随机等待 `[min_ms, max_ms]`
    pub fn with_delay(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.delay_ms = (min_ms, max_ms.max(min_ms));
        self
    }

    /// 执行在拿到许可前阻塞，通过 [`FakeExecutor::release`] 放行
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    /// 为指定任务排队响应，用完后回落到默认响应
    pub fn script(&self, task_id: &str, responses: Vec<FakeResponse>) {
        self.state
            .lock()
            .unwrap()
            .scripted
            .entry(task_id.to_string())
            .or_default()
            .extend(responses);
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn calls_for(&self, task_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(task, _)| task == task_id)
            .count()
    }

    /// 同一任务观察到的最大并发执行数
    pub fn max_concurrent_for(&self, task_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .max_per_task
            .get(task_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn max_concurrent_per_task(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .max_per_task
            .values()
            .copied()
            .max()
            .unwrap_or(0)
    }

    pub fn max_concurrent_total(&self) -> usize {
        self.state.lock().unwrap().max_total
    }

    pub fn active(&self) -> usize {
        self.state.lock().unwrap().active_total
    }

    /// 两个分发同时使用同一代理的次数
    pub fn proxy_overlaps(&self) -> usize {
        self.state.lock().unwrap().proxy_overlaps
    }

    fn enter(&self, task_id: &str, proxy_key: &str) -> FakeResponse {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push((task_id.to_string(), proxy_key.to_string()));

        let active = state.active_per_task.entry(task_id.to_string()).or_default();
        *active += 1;
        let active = *active;
        let max = state.max_per_task.entry(task_id.to_string()).or_default();
        *max = (*max).max(active);

        let proxy_active = state
            .active_per_proxy
            .entry(proxy_key.to_string())
            .or_default();
        *proxy_active += 1;
        if *proxy_active > 1 {
            state.proxy_overlaps += 1;
        }

        state.active_total += 1;
        state.max_total = state.max_total.max(state.active_total);

        state
            .scripted
            .get_mut(task_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default_response.clone())
    }

    fn leave(&self, task_id: &str, proxy_key: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(active) = state.active_per_task.get_mut(task_id) {
            *active -= 1;
        }
        if let Some(active) = state.active_per_proxy.get_mut(proxy_key) {
            *active -= 1;
        }
        state.active_total -= 1;
    }
}

impl Default for FakeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

struct ActiveGuard<'a> {
    executor: &'a FakeExecutor,
    task_id: &'a str,
    proxy_key: &'a str,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.executor.leave(self.task_id, self.proxy_key);
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn execute(&self, job: &Job, proxy: &ProxyRecord) -> SchedulerResult<Outcome> {
        let response = self.enter(&job.id, &proxy.key);
        let _guard = ActiveGuard {
            executor: self,
            task_id: &job.id,
            proxy_key: &proxy.key,
        };

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| SchedulerError::Internal(e.to_string()))?;
            permit.forget();
        }

        let (min, max) = self.delay_ms;
        if max > 0 {
            let delay = rand::random_range(min..=max);
            tokio::time::sleep(StdDuration::from_millis(delay)).await;
        }

        match response {
            FakeResponse::Outcome(outcome) => Ok(outcome),
            FakeResponse::Error(message) => Err(SchedulerError::TaskExecution(message)),
            FakeResponse::InvalidParams(message) => Err(SchedulerError::InvalidTaskParams(message)),
            FakeResponse::Panic => panic!("fake executor panic for {}", job.id),
            FakeResponse::Hang => std::future::pending().await,
        }
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// 内存快照存储
#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshotStore {
    snapshot: Arc<Mutex<Option<Snapshot>>>,
    saves: Arc<Mutex<usize>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(Some(snapshot))),
            saves: Arc::new(Mutex::new(0)),
        }
    }

    pub fn saved(&self) -> Option<Snapshot> {
        self.snapshot.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self) -> SchedulerResult<Option<Snapshot>> {
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn save(&self, snapshot: &Snapshot) -> SchedulerResult<()> {
        *self.snapshot.lock().unwrap() = Some(snapshot.clone());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}

/// 按代理键返回预设结果的探测器；未设置的键返回默认延迟
#[derive(Debug, Clone, Default)]
pub struct StubProbe {
    latencies: Arc<Mutex<HashMap<String, Option<u64>>>>,
    hang: Arc<Mutex<Vec<String>>>,
}

impl StubProbe {
    pub const DEFAULT_LATENCY_MS: u64 = 50;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_latency(&self, key: &str, latency_ms: u64) {
        self.latencies
            .lock()
            .unwrap()
            .insert(key.to_string(), Some(latency_ms));
    }

    pub fn set_unreachable(&self, key: &str) {
        self.latencies.lock().unwrap().insert(key.to_string(), None);
    }

    pub fn set_hanging(&self, key: &str) {
        self.hang.lock().unwrap().push(key.to_string());
    }
}

#[async_trait]
impl HealthProbe for StubProbe {
    async fn probe(&self, proxy: &ProxyRecord) -> SchedulerResult<u64> {
        let hangs = self.hang.lock().unwrap().contains(&proxy.key);
        if hangs {
            std::future::pending::<()>().await;
        }
        let latency = self.latencies.lock().unwrap().get(&proxy.key).copied();
        match latency {
            Some(Some(ms)) => Ok(ms),
            Some(None) => Err(SchedulerError::Network(format!("{} unreachable", proxy.key))),
            None => Ok(Self::DEFAULT_LATENCY_MS),
        }
    }
}
