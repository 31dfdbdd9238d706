use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use claim_config::AppConfig;
use claim_dispatcher::{EventBus, ProbeSummary, ProxyManager, ProxyPolicy, Scheduler, SchedulerDeps};
use claim_domain::{
    Clock, Executor, HealthProbe, OutcomeLog, ProxySource, SnapshotStore, SystemClock,
};
use claim_infrastructure::{
    parse_proxy_lines, DispatchTracer, FileProxySource, JsonSnapshotStore, JsonlOutcomeLog,
    MetricsCollector, TcpConnectProbe,
};
use claim_worker::ProcessExecutor;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn, Instrument};

/// 调度器依赖的外部组件
pub struct Components {
    pub executor: Arc<dyn Executor>,
    pub outcome_log: Arc<dyn OutcomeLog>,
    pub snapshot_store: Arc<dyn SnapshotStore>,
    /// 只有配置了代理文件时才会自动补充
    pub proxy_source: Option<Arc<dyn ProxySource>>,
    pub probe: Arc<dyn HealthProbe>,
    pub clock: Arc<dyn Clock>,
}

impl Components {
    pub fn from_config(config: &AppConfig) -> Self {
        let proxy_source = config
            .proxy_pool
            .proxy_file
            .as_ref()
            .map(|path| Arc::new(FileProxySource::new(path)) as Arc<dyn ProxySource>);

        Self {
            executor: Arc::new(ProcessExecutor::new(config.executor.clone())),
            outcome_log: Arc::new(JsonlOutcomeLog::new(&config.persistence.outcome_log_path)),
            snapshot_store: Arc::new(JsonSnapshotStore::new(&config.persistence.snapshot_path)),
            proxy_source,
            probe: Arc::new(TcpConnectProbe::new(Duration::from_secs(
                config.proxy_pool.probe_timeout_seconds,
            ))),
            clock: Arc::new(SystemClock),
        }
    }
}

/// 一轮代理池维护的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub evicted: usize,
    pub provisioned: usize,
    pub probe: ProbeSummary,
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    scheduler: Arc<Scheduler>,
    proxies: Arc<ProxyManager>,
    snapshot_store: Arc<dyn SnapshotStore>,
    proxy_source: Option<Arc<dyn ProxySource>>,
    probe: Arc<dyn HealthProbe>,
    metrics: MetricsCollector,
}

impl Application {
    /// 按配置创建应用实例并恢复上次的状态
    pub async fn new(config: AppConfig) -> Result<Self> {
        let components = Components::from_config(&config);
        Self::with_components(config, components).await
    }

    pub async fn with_components(config: AppConfig, components: Components) -> Result<Self> {
        info!("初始化应用程序，任务数: {}", config.tasks.len());

        let events = EventBus::default();
        let proxies = Arc::new(ProxyManager::new(
            ProxyPolicy::from(&config.proxy_pool),
            Arc::clone(&components.clock),
            events.clone(),
        ));
        let scheduler = Scheduler::new(
            &config,
            SchedulerDeps {
                proxies: Arc::clone(&proxies),
                executor: components.executor,
                outcome_log: components.outcome_log,
                clock: components.clock,
                events,
            },
        );

        let app = Self {
            config,
            scheduler,
            proxies,
            snapshot_store: components.snapshot_store,
            proxy_source: components.proxy_source,
            probe: components.probe,
            metrics: MetricsCollector::new(),
        };
        app.bootstrap().await?;
        Ok(app)
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn proxies(&self) -> &Arc<ProxyManager> {
        &self.proxies
    }

    /// 快照优先，然后按注册表合并任务，最后补入配置中的静态代理
    async fn bootstrap(&self) -> Result<()> {
        match self.snapshot_store.load().await {
            Ok(Some(snapshot)) => {
                let saved_at = snapshot.saved_at;
                let proxies = self.proxies.restore(snapshot.proxies.into_values()).await;
                let jobs = self.scheduler.restore_jobs(snapshot.jobs.into_values()).await;
                info!(proxies, jobs, saved_at = %saved_at, "已从快照恢复状态");
            }
            Ok(None) => info!("没有可用的快照，以空状态启动"),
            Err(e) => warn!(error = %e, "读取快照失败，以空状态启动"),
        }

        self.scheduler.register_tasks(&self.config.tasks).await;

        let (candidates, _) = parse_proxy_lines(&self.config.proxy_pool.proxies.join("\n"));
        let mut added = 0;
        for candidate in &candidates {
            if self.proxies.add_proxy(candidate).await {
                added += 1;
            }
        }
        if added > 0 {
            self.metrics.record_proxies_added(added);
            info!("已加载 {} 个配置代理", added);
        }

        let counts = self.proxies.counts().await;
        self.metrics.update_pool(&counts);
        info!(pool = %counts, "应用程序初始化完成");
        Ok(())
    }

    /// 移除失效代理、按需补充、探测空闲代理，最后保存快照
    pub async fn maintain(&self) -> Result<MaintenanceReport> {
        async {
            let evicted = self
                .proxies
                .auto_remove_dead(self.config.proxy_pool.eviction_failure_threshold)
                .await
                .len();
            if evicted > 0 {
                self.metrics.record_proxies_evicted(evicted);
            }

            let provisioned = self.provision().await;

            let probe = self
                .proxies
                .probe_all(
                    self.probe.as_ref(),
                    Duration::from_secs(self.config.proxy_pool.probe_timeout_seconds),
                )
                .await;

            self.metrics.update_pool(&self.proxies.counts().await);
            self.save_snapshot().await?;

            Ok::<_, anyhow::Error>(MaintenanceReport {
                evicted,
                provisioned,
                probe,
            })
        }
        .instrument(DispatchTracer::maintenance_span("maintenance"))
        .await
    }

    /// 来源失败只记录日志，不影响本轮维护
    pub async fn provision(&self) -> usize {
        let Some(source) = &self.proxy_source else {
            return 0;
        };
        match self
            .proxies
            .auto_provision(
                source.as_ref(),
                self.config.proxy_pool.min_healthy,
                self.config.proxy_pool.target_count,
            )
            .await
        {
            Ok(added) => {
                if added > 0 {
                    self.metrics.record_proxies_added(added);
                }
                added
            }
            Err(e) => {
                warn!(source = source.name(), error = %e, "自动补充代理失败");
                0
            }
        }
    }

    pub async fn save_snapshot(&self) -> Result<()> {
        let snapshot = self.scheduler.export_snapshot().await;
        self.snapshot_store
            .save(&snapshot)
            .await
            .context("保存快照失败")
    }

    /// 运行调度循环和维护循环直到收到关闭信号；返回被放弃的分发数
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<usize> {
        info!("启动调度服务");

        let maintenance_rx = shutdown_rx.resubscribe();
        let ((), abandoned) = tokio::join!(
            self.maintenance_loop(maintenance_rx),
            Arc::clone(&self.scheduler).run(shutdown_rx),
        );

        self.save_snapshot().await?;
        info!("调度服务已停止");
        Ok(abandoned)
    }

    async fn maintenance_loop(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(Duration::from_secs(
            self.config.proxy_pool.maintenance_interval_seconds,
        ));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.maintain().await {
                        Ok(report) => info!(
                            evicted = report.evicted,
                            provisioned = report.provisioned,
                            probed = report.probe.probed,
                            probe_failed = report.probe.failed,
                            "代理池维护完成"
                        ),
                        Err(e) => warn!(error = %e, "代理池维护失败"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("维护循环收到关闭信号");
                    break;
                }
            }
        }
    }
}
