//! 调度循环
//!
//! 单一协调循环按 tick 选出到期任务，为每个任务申请代理后派生独立的分发任务。
//! Job 状态只在 job 表的锁内转换，`Idle -> Dispatched` 的认领是原子的，
//! 因此同一任务不会被并发分发两次。

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{self, AtomicBool, AtomicU64, AtomicUsize};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Utc};
use claim_config::{AppConfig, SchedulerConfig, TaskDefinition};
use claim_domain::{
    later, span_from_secs, span_from_secs_f64, Clock, DisableReason, Executor, Job, JobState,
    OperationMode, Outcome, OutcomeKind, OutcomeLog, OutcomeRecord, PoolCounts, ProxyRecord,
    SchedulerEvent, Snapshot,
};
use claim_errors::{SchedulerError, SchedulerResult};
use claim_infrastructure::{DispatchTracer, MetricsCollector, StructuredLogger};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::degraded_mode::DegradedModeController;
use crate::event_bus::EventBus;
use crate::profitability::{ProfitabilityDecision, ProfitabilityOptimizer};
use crate::proxy_manager::{Assignment, ProxyManager};

/// 调度器依赖的外部协作方
pub struct SchedulerDeps {
    pub proxies: Arc<ProxyManager>,
    pub executor: Arc<dyn Executor>,
    pub outcome_log: Arc<dyn OutcomeLog>,
    pub clock: Arc<dyn Clock>,
    pub events: EventBus,
}

/// 进行中的分发计数
#[derive(Debug, Default)]
struct DispatchSlots {
    outstanding: AtomicUsize,
    idle: Notify,
}

impl DispatchSlots {
    /// 计数低于上限时占用一个名额
    fn try_acquire(self: &Arc<Self>, ceiling: usize) -> Option<SlotGuard> {
        let mut current = self.outstanding.load(atomic::Ordering::SeqCst);
        loop {
            if current >= ceiling {
                return None;
            }
            match self.outstanding.compare_exchange(
                current,
                current + 1,
                atomic::Ordering::SeqCst,
                atomic::Ordering::SeqCst,
            ) {
                Ok(_) => {
                    return Some(SlotGuard {
                        slots: Arc::clone(self),
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn acquire(self: &Arc<Self>) -> SlotGuard {
        self.outstanding.fetch_add(1, atomic::Ordering::SeqCst);
        SlotGuard {
            slots: Arc::clone(self),
        }
    }

    fn current(&self) -> usize {
        self.outstanding.load(atomic::Ordering::SeqCst)
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.current() == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct SlotGuard {
    slots: Arc<DispatchSlots>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if self.slots.outstanding.fetch_sub(1, atomic::Ordering::SeqCst) == 1 {
            self.slots.idle.notify_waiters();
        }
    }
}

/// 单次 tick 的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub mode: Option<OperationMode>,
    pub ceiling: usize,
    pub dispatched: Vec<String>,
    /// 代理池耗尽而推迟的任务
    pub deferred: Vec<String>,
    /// Critical 模式下因没有粘性代理而跳过的任务
    pub skipped: Vec<String>,
    pub at_capacity: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunOnceResult {
    Completed { outcome: Outcome },
    PoolExhausted { counts: PoolCounts },
    AlreadyRunning,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: String,
    pub state: JobState,
    pub next_run: DateTime<Utc>,
    pub priority_multiplier: f64,
    pub enabled: bool,
    pub disable_reason: Option<DisableReason>,
    pub disabled_until: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub total_runs: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub sticky_proxy: Option<String>,
}

/// 只读状态报告
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub generated_at: DateTime<Utc>,
    pub mode: OperationMode,
    pub max_concurrent_dispatch: usize,
    pub outstanding: usize,
    pub pool: PoolCounts,
    pub jobs: Vec<JobStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriorityPreview {
    pub task_id: String,
    pub enabled: bool,
    pub current_multiplier: f64,
    pub decision: ProfitabilityDecision,
}

pub struct Scheduler {
    config: SchedulerConfig,
    jobs: Mutex<HashMap<String, Job>>,
    proxies: Arc<ProxyManager>,
    executor: Arc<dyn Executor>,
    outcome_log: Arc<dyn OutcomeLog>,
    optimizer: ProfitabilityOptimizer,
    mode: Mutex<DegradedModeController>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    metrics: MetricsCollector,
    slots: Arc<DispatchSlots>,
    accepting: AtomicBool,
    ticks: AtomicU64,
}

impl Scheduler {
    pub fn new(config: &AppConfig, deps: SchedulerDeps) -> Arc<Self> {
        let optimizer =
            ProfitabilityOptimizer::new(config.profitability.clone(), Arc::clone(&deps.outcome_log));
        Arc::new(Self {
            config: config.scheduler.clone(),
            jobs: Mutex::new(HashMap::new()),
            proxies: deps.proxies,
            executor: deps.executor,
            outcome_log: deps.outcome_log,
            optimizer,
            mode: Mutex::new(DegradedModeController::new(config.operation_mode.clone())),
            clock: deps.clock,
            events: deps.events,
            metrics: MetricsCollector::new(),
            slots: Arc::new(DispatchSlots::default()),
            accepting: AtomicBool::new(true),
            ticks: AtomicU64::new(0),
        })
    }

    pub fn proxies(&self) -> &Arc<ProxyManager> {
        &self.proxies
    }

    pub fn subscribe(&self) -> broadcast::Receiver<claim_domain::EventEnvelope> {
        self.events.subscribe()
    }

    pub fn outstanding(&self) -> usize {
        self.slots.current()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(atomic::Ordering::SeqCst)
    }

    pub async fn job(&self, task_id: &str) -> Option<Job> {
        self.jobs.lock().await.get(task_id).cloned()
    }

    /// 从快照恢复 Job 表；上次未完成的分发恢复为 Idle
    pub async fn restore_jobs<I>(&self, jobs: I) -> usize
    where
        I: IntoIterator<Item = Job>,
    {
        let mut table = self.jobs.lock().await;
        let mut restored = 0;
        for mut job in jobs {
            if job.is_dispatched() {
                info!(task.id = %job.id, "任务在上次运行中未完成，恢复为 Idle");
                job.state = JobState::Idle;
            }
            table.insert(job.id.clone(), job);
            restored += 1;
        }
        restored
    }

    /// 按注册表建立 Job 表：新任务立即到期，已有任务保留调度状态，注册表外的任务被移除
    pub async fn register_tasks(&self, definitions: &[TaskDefinition]) {
        let now = self.clock.now();
        let known: HashSet<&str> = definitions.iter().map(|d| d.id.as_str()).collect();
        let mut jobs = self.jobs.lock().await;

        jobs.retain(|id, _| {
            let keep = known.contains(id.as_str());
            if !keep {
                info!(task.id = %id, "任务不在注册表中，已移除");
            }
            keep
        });

        for definition in definitions {
            let job = jobs
                .entry(definition.id.clone())
                .or_insert_with(|| Job::new(definition.id.clone(), definition.base_interval_seconds, now));
            job.base_interval_seconds = definition.base_interval_seconds;
            job.parameters = definition.parameters.clone();

            if !definition.enabled {
                if job.enabled {
                    job.enabled = false;
                    job.disable_reason = None;
                    job.disabled_until = None;
                }
            } else if !job.enabled && job.disable_reason.is_none() {
                job.enable();
            }
        }
        info!(tasks = jobs.len(), "任务注册完成");
    }

    fn ceiling_for(&self, mode: OperationMode) -> usize {
        self.config
            .concurrency_override
            .unwrap_or_else(|| mode.max_concurrent_dispatch())
    }

    async fn observe_mode(&self, healthy: usize, now: DateTime<Utc>) -> OperationMode {
        let (mode, transition) = self.mode.lock().await.observe(healthy);
        if let Some(transition) = transition {
            if transition.from.is_some() {
                self.metrics.record_mode_transition();
            }
            self.events.publish(
                SchedulerEvent::ModeChanged {
                    from: transition.from,
                    to: transition.to,
                    healthy_proxies: healthy,
                },
                now,
            );
        }
        mode
    }

    /// 执行一次调度
    pub async fn tick(self: &Arc<Self>) -> TickReport {
        if !self.is_accepting() {
            return TickReport::default();
        }
        let started = Instant::now();
        let tick = self.ticks.fetch_add(1, atomic::Ordering::Relaxed) + 1;
        let now = self.clock.now();

        let counts = self.proxies.counts().await;
        self.metrics.update_pool(&counts);
        let mode = self.observe_mode(counts.healthy, now).await;
        let ceiling = self.ceiling_for(mode);
        self.metrics.update_mode(&mode, ceiling);

        let report = self
            .tick_inner(now, mode, ceiling)
            .instrument(DispatchTracer::tick_span(tick, mode.name(), ceiling))
            .await;

        self.metrics.update_outstanding(self.slots.current());
        self.metrics.record_tick(started.elapsed().as_secs_f64());
        report
    }

    async fn tick_inner(self: &Arc<Self>, now: DateTime<Utc>, mode: OperationMode, ceiling: usize) -> TickReport {
        let mut report = TickReport {
            mode: Some(mode),
            ceiling,
            ..TickReport::default()
        };

        self.apply_profitability(now).await;

        for job_id in self.due_jobs(now).await {
            let Some(slot) = self.slots.try_acquire(ceiling) else {
                report.at_capacity = true;
                break;
            };

            if !mode.admits_new_tasks() && self.proxies.sticky_proxy(&job_id).await.is_none() {
                debug!(task.id = %job_id, "{}模式下跳过没有粘性代理的任务", mode.name());
                report.skipped.push(job_id);
                continue;
            }

            // 先认领再申请代理，并发的 tick 不会拿到同一任务的粘性代理
            let Some(job) = self.claim(&job_id, now, false).await else {
                continue;
            };

            let proxy = match self.proxies.assign(&job_id).await {
                Assignment::Assigned(proxy) => proxy,
                Assignment::NotAvailable(_) => {
                    self.defer(&job_id, now).await;
                    self.metrics.record_pool_exhausted();
                    report.deferred.push(job_id);
                    continue;
                }
            };

            report.dispatched.push(job_id);
            self.spawn_dispatch(job, proxy, slot);
        }

        if !report.dispatched.is_empty() || !report.deferred.is_empty() {
            debug!(
                dispatched = report.dispatched.len(),
                deferred = report.deferred.len(),
                outstanding = self.slots.current(),
                "调度完成"
            );
        }
        report
    }

    /// 惰性结束到期的冷却，返回按 (next_run, 系数, id) 排序的到期任务
    async fn due_jobs(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut jobs = self.jobs.lock().await;
        for job in jobs.values_mut() {
            if let JobState::Cooling { until } = job.state {
                if until <= now {
                    debug!(task.id = %job.id, "任务冷却结束");
                    job.state = JobState::Idle;
                }
            }
        }

        let mut due: Vec<&Job> = jobs.values().filter(|job| job.is_due(now)).collect();
        due.sort_by(|a, b| {
            a.next_run
                .cmp(&b.next_run)
                .then_with(|| {
                    a.priority_multiplier
                        .partial_cmp(&b.priority_multiplier)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.id.cmp(&b.id))
        });
        due.into_iter().map(|job| job.id.clone()).collect()
    }

    /// 在 job 表锁内完成 `Idle -> Dispatched`；`force` 时忽略 next_run、停用与冷却
    async fn claim(&self, task_id: &str, now: DateTime<Utc>, force: bool) -> Option<Job> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(task_id)?;
        let eligible = if force {
            !job.is_dispatched()
        } else {
            job.is_due(now)
        };
        if !eligible {
            return None;
        }
        job.state = JobState::Dispatched;
        Some(job.clone())
    }

    /// 撤销认领，回到 Idle
    async fn unclaim(&self, task_id: &str) {
        if let Some(job) = self.jobs.lock().await.get_mut(task_id) {
            job.state = JobState::Idle;
        }
    }

    /// 代理池耗尽：撤销认领并推迟一段随机时间，不计入失败
    async fn defer(&self, task_id: &str, now: DateTime<Utc>) {
        let delay = rand::random_range(
            self.config.pool_exhausted_delay_min_seconds..=self.config.pool_exhausted_delay_max_seconds,
        );
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(task_id) {
            job.state = JobState::Idle;
            job.next_run = later(now, span_from_secs(delay));
            debug!(task.id = task_id, next_run = %job.next_run, "代理池耗尽，任务推迟");
        }
    }

    /// base × multiplier × jitter
    fn next_interval(&self, job: &Job) -> Duration {
        let (low, high) = (self.config.jitter_min, self.config.jitter_max);
        let jitter = if low < high {
            rand::random_range(low..=high)
        } else {
            low
        };
        let seconds = job.base_interval_seconds as f64 * job.priority_multiplier * jitter;
        span_from_secs_f64(seconds)
    }

    fn spawn_dispatch(self: &Arc<Self>, job: Job, proxy: ProxyRecord, slot: SlotGuard) {
        let dispatch_id = Uuid::new_v4().to_string();
        let span = DispatchTracer::dispatch_span(&job.id, &dispatch_id, &proxy.key);
        StructuredLogger::log_dispatch(&job.id, &dispatch_id, &proxy.key, job.priority_multiplier);
        self.metrics.record_dispatch();

        let scheduler = Arc::clone(self);
        tokio::spawn(
            async move {
                let _slot = slot;
                scheduler.run_dispatch(job, proxy, &dispatch_id).await;
            }
            .instrument(span),
        );
    }

    async fn run_dispatch(&self, job: Job, proxy: ProxyRecord, dispatch_id: &str) -> Outcome {
        let started = Instant::now();
        let outcome = self.execute_guarded(&job, &proxy).await;
        let elapsed = started.elapsed();

        StructuredLogger::log_outcome(
            &job.id,
            dispatch_id,
            &proxy.key,
            outcome.kind,
            elapsed.as_millis() as u64,
            outcome.message.as_deref(),
        );
        self.complete(&job.id, &proxy.key, &outcome, elapsed).await;
        outcome
    }

    /// 执行器的错误、超时和 panic 都在这里转换为结果
    async fn execute_guarded(&self, job: &Job, proxy: &ProxyRecord) -> Outcome {
        let executor = Arc::clone(&self.executor);
        let timeout = StdDuration::from_secs(self.config.execution_timeout_seconds);
        let (task_job, task_proxy) = (job.clone(), proxy.clone());
        let started = Instant::now();

        let handle = tokio::spawn(async move {
            tokio::time::timeout(timeout, executor.execute(&task_job, &task_proxy)).await
        });

        let outcome = match handle.await {
            Ok(Ok(Ok(outcome))) => outcome,
            Ok(Ok(Err(e))) => Outcome::from_error(&e),
            Ok(Err(_)) => Outcome::from_error(&SchedulerError::ExecutionTimeout),
            Err(e) if e.is_panic() => Outcome::transient(format!("执行器异常退出: {e}")),
            Err(e) => Outcome::transient(format!("执行被取消: {e}")),
        };

        if outcome.latency_ms.is_some() {
            outcome
        } else {
            outcome.with_latency(started.elapsed().as_millis() as u64)
        }
    }

    /// 完成一次分发：上报代理、写结果日志、更新 Job 状态
    async fn complete(&self, task_id: &str, proxy_key: &str, outcome: &Outcome, elapsed: StdDuration) {
        let now = self.clock.now();

        if let Err(e) = self.proxies.report_outcome(proxy_key, outcome).await {
            warn!(task.id = task_id, "上报代理结果失败: {}", e);
        }
        if outcome.kind.is_proxy_attributable() {
            self.proxies.rotate(task_id).await;
        }

        let record = OutcomeRecord::from_outcome(task_id, outcome, Some(proxy_key), now);
        let report_timeout = StdDuration::from_secs(self.config.outcome_report_timeout_seconds);
        match tokio::time::timeout(report_timeout, self.outcome_log.append(&record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(task.id = task_id, "写入结果日志失败: {}", e),
            Err(_) => warn!(task.id = task_id, "写入结果日志超时"),
        }

        let mut events = Vec::new();
        {
            let mut jobs = self.jobs.lock().await;
            let Some(job) = jobs.get_mut(task_id) else {
                warn!(task.id = task_id, "完成的分发对应的任务已不存在");
                return;
            };

            job.total_runs += 1;
            job.last_run_at = Some(now);
            job.state = JobState::Idle;
            match outcome.kind {
                OutcomeKind::Success => job.consecutive_failures = 0,
                OutcomeKind::TransientFailure | OutcomeKind::DetectionFailure => {
                    job.consecutive_failures += 1
                }
                OutcomeKind::Fatal => {}
            }
            job.next_run = later(now, self.next_interval(job));

            if outcome.kind == OutcomeKind::Fatal {
                job.disable(DisableReason::Fatal, None);
                StructuredLogger::log_task_disabled(task_id, DisableReason::Fatal, None, None);
                events.push(SchedulerEvent::TaskDisabled {
                    task_id: task_id.to_string(),
                    reason: DisableReason::Fatal,
                    until: None,
                });
            } else if job.consecutive_failures >= self.config.failure_streak_threshold {
                let until = later(now, span_from_secs(self.config.cooling_penalty_seconds));
                StructuredLogger::log_job_cooling(task_id, until, job.consecutive_failures);
                events.push(SchedulerEvent::JobCooling {
                    task_id: task_id.to_string(),
                    until,
                    consecutive_failures: job.consecutive_failures,
                });
                job.state = JobState::Cooling { until };
                job.consecutive_failures = 0;
            }
        }

        for event in events {
            self.events.publish(event, now);
        }
        self.metrics
            .record_outcome(task_id, outcome.kind, elapsed.as_secs_f64());
        if let Some(earnings) = outcome.earnings {
            self.metrics
                .record_earnings(task_id, earnings.amount - earnings.cost);
        }
    }

    fn evaluation_due(job: &Job, now: DateTime<Utc>, interval: Duration) -> bool {
        if job.enabled {
            job.last_priority_update
                .map_or(true, |at| now - at >= interval)
        } else {
            job.disable_reason == Some(DisableReason::Unprofitable)
                && job.disabled_until.map_or(true, |until| until <= now)
        }
    }

    /// 每个任务每小时至多评估一次收益；冷却结束的停用任务立即评估
    async fn apply_profitability(&self, now: DateTime<Utc>) {
        let interval = span_from_secs(self.config.priority_update_interval_seconds);
        let candidates: Vec<Job> = {
            let jobs = self.jobs.lock().await;
            jobs.values()
                .filter(|job| Self::evaluation_due(job, now, interval))
                .cloned()
                .collect()
        };

        for job in candidates {
            match self.optimizer.evaluate(&job, now).await {
                Ok(decision) => self.apply_decision(&job.id, decision, now).await,
                Err(e) => warn!(task.id = %job.id, "收益评估失败: {}", e),
            }
        }
    }

    async fn apply_decision(&self, task_id: &str, decision: ProfitabilityDecision, now: DateTime<Utc>) {
        let mut events = Vec::new();
        {
            let mut jobs = self.jobs.lock().await;
            let Some(job) = jobs.get_mut(task_id) else {
                return;
            };
            job.last_priority_update = Some(now);

            match decision {
                ProfitabilityDecision::Keep => {}
                ProfitabilityDecision::SetMultiplier { multiplier, metric } => {
                    let old = job.priority_multiplier;
                    job.set_multiplier(multiplier);
                    if (old - job.priority_multiplier).abs() > f64::EPSILON {
                        StructuredLogger::log_priority_update(
                            task_id,
                            metric.profitability_score,
                            old,
                            job.priority_multiplier,
                        );
                    }
                }
                ProfitabilityDecision::Disable { until, metric } => {
                    job.disable(DisableReason::Unprofitable, Some(until));
                    StructuredLogger::log_task_disabled(
                        task_id,
                        DisableReason::Unprofitable,
                        Some(until),
                        Some(&metric),
                    );
                    events.push(SchedulerEvent::TaskDisabled {
                        task_id: task_id.to_string(),
                        reason: DisableReason::Unprofitable,
                        until: Some(until),
                    });
                }
                ProfitabilityDecision::Enable { multiplier, metric } => {
                    job.enable();
                    job.set_multiplier(multiplier);
                    job.consecutive_failures = 0;
                    debug!(
                        task.id = task_id,
                        samples = metric.sample_count,
                        score = metric.profitability_score,
                        "停用冷却结束，重新评估通过"
                    );
                    StructuredLogger::log_task_enabled(task_id, job.priority_multiplier);
                    events.push(SchedulerEvent::TaskEnabled {
                        task_id: task_id.to_string(),
                    });
                }
            }
        }
        for event in events {
            self.events.publish(event, now);
        }
    }

    /// 立即执行一次指定任务，忽略 next_run，但仍遵守代理分配与单实例规则
    pub async fn run_once(self: &Arc<Self>, task_id: &str) -> SchedulerResult<RunOnceResult> {
        if !self.is_accepting() {
            return Err(SchedulerError::ShuttingDown);
        }
        let now = self.clock.now();
        {
            let jobs = self.jobs.lock().await;
            let job = jobs
                .get(task_id)
                .ok_or_else(|| SchedulerError::task_not_found(task_id))?;
            if job.is_dispatched() {
                return Ok(RunOnceResult::AlreadyRunning);
            }
        }

        let Some(job) = self.claim(task_id, now, true).await else {
            return Ok(RunOnceResult::AlreadyRunning);
        };
        let proxy = match self.proxies.assign(task_id).await {
            Assignment::Assigned(proxy) => proxy,
            Assignment::NotAvailable(counts) => {
                self.unclaim(task_id).await;
                self.metrics.record_pool_exhausted();
                return Ok(RunOnceResult::PoolExhausted { counts });
            }
        };

        let _slot = self.slots.acquire();
        let dispatch_id = Uuid::new_v4().to_string();
        let span = DispatchTracer::dispatch_span(&job.id, &dispatch_id, &proxy.key);
        StructuredLogger::log_dispatch(&job.id, &dispatch_id, &proxy.key, job.priority_multiplier);
        self.metrics.record_dispatch();

        let outcome = self
            .run_dispatch(job, proxy, &dispatch_id)
            .instrument(span)
            .await;
        Ok(RunOnceResult::Completed { outcome })
    }

    /// 当前模式、代理池计数与各任务状态；不修改任何状态
    pub async fn status(&self) -> SchedulerStatus {
        let now = self.clock.now();
        let pool = self.proxies.counts().await;
        let mode = self.mode.lock().await.mode(pool.healthy);

        let mut jobs: Vec<Job> = self.jobs.lock().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));

        let mut statuses = Vec::with_capacity(jobs.len());
        for job in jobs {
            let sticky_proxy = self.proxies.sticky_proxy(&job.id).await.map(|p| p.key);
            statuses.push(JobStatus {
                state: job.state_at(now),
                id: job.id,
                next_run: job.next_run,
                priority_multiplier: job.priority_multiplier,
                enabled: job.enabled,
                disable_reason: job.disable_reason,
                disabled_until: job.disabled_until,
                consecutive_failures: job.consecutive_failures,
                total_runs: job.total_runs,
                last_run_at: job.last_run_at,
                sticky_proxy,
            });
        }

        SchedulerStatus {
            generated_at: now,
            mode,
            max_concurrent_dispatch: self.ceiling_for(mode),
            outstanding: self.slots.current(),
            pool,
            jobs: statuses,
        }
    }

    /// 试算每个任务的收益决策，不应用
    pub async fn preview_priorities(&self) -> SchedulerResult<Vec<PriorityPreview>> {
        let now = self.clock.now();
        let mut jobs: Vec<Job> = self.jobs.lock().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));

        let mut previews = Vec::with_capacity(jobs.len());
        for job in jobs {
            let decision = self.optimizer.evaluate(&job, now).await?;
            previews.push(PriorityPreview {
                task_id: job.id,
                enabled: job.enabled,
                current_multiplier: job.priority_multiplier,
                decision,
            });
        }
        Ok(previews)
    }

    pub async fn export_snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new(self.clock.now());
        snapshot.jobs = self
            .jobs
            .lock()
            .await
            .iter()
            .map(|(id, job)| (id.clone(), job.clone()))
            .collect();
        snapshot.proxies = self
            .proxies
            .records()
            .await
            .into_iter()
            .map(|record| (record.key.clone(), record))
            .collect();
        snapshot
    }

    /// 人工重新启用任务，包括因致命错误停用的任务
    pub async fn enable_task(&self, task_id: &str) -> SchedulerResult<()> {
        let now = self.clock.now();
        let multiplier = {
            let mut jobs = self.jobs.lock().await;
            let job = jobs
                .get_mut(task_id)
                .ok_or_else(|| SchedulerError::task_not_found(task_id))?;
            job.enable();
            job.consecutive_failures = 0;
            if matches!(job.state, JobState::Cooling { .. }) {
                job.state = JobState::Idle;
            }
            if !job.is_dispatched() {
                job.next_run = now;
            }
            job.priority_multiplier
        };

        StructuredLogger::log_task_enabled(task_id, multiplier);
        self.events.publish(
            SchedulerEvent::TaskEnabled {
                task_id: task_id.to_string(),
            },
            now,
        );
        Ok(())
    }

    /// 按固定间隔 tick，直到收到关闭信号；返回被放弃的分发数
    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> usize {
        let mut interval =
            tokio::time::interval(StdDuration::from_secs(self.config.tick_interval_seconds));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("调度循环已启动，间隔 {} 秒", self.config.tick_interval_seconds);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("收到关闭信号，停止调度循环");
                    break;
                }
            }
        }

        self.shutdown().await
    }

    /// 停止接收新分发并等待进行中的分发，超时后放弃剩余的
    pub async fn shutdown(&self) -> usize {
        self.accepting.store(false, atomic::Ordering::SeqCst);

        let outstanding = self.slots.current();
        if outstanding == 0 {
            return 0;
        }
        info!("等待 {} 个进行中的分发完成", outstanding);

        let timeout = StdDuration::from_secs(self.config.shutdown_timeout_seconds);
        match tokio::time::timeout(timeout, self.slots.wait_idle()).await {
            Ok(()) => {
                info!("进行中的分发已全部完成");
                0
            }
            Err(_) => {
                let abandoned = self.slots.current();
                warn!("关闭超时，放弃 {} 个未完成的分发", abandoned);
                abandoned
            }
        }
    }
}
