use std::time::Duration;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgMatches, Command};
use claim_config::{AppConfig, LogFormat};
use claim_infrastructure::{init_logging, init_observability};
use claim_scheduler::{wait_for_shutdown_signal, Application, ShutdownManager};
use serde::Serialize;
use tracing::{error, info, warn};

fn cli() -> Command {
    Command::new("claim-scheduler")
        .version(env!("CARGO_PKG_VERSION"))
        .about("代理感知的认领任务调度系统")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时按默认路径查找")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty", "compact"])
                .global(true),
        )
        .subcommand(
            Command::new("run").about("启动调度循环").arg(
                Arg::new("concurrency")
                    .long("concurrency")
                    .value_name("N")
                    .help("固定并发上限，忽略运行模式给出的上限")
                    .value_parser(value_parser!(usize)),
            ),
        )
        .subcommand(
            Command::new("run-once")
                .about("立即执行一次指定任务，忽略其调度时间")
                .arg(
                    Arg::new("task")
                        .short('t')
                        .long("task")
                        .value_name("ID")
                        .help("任务ID")
                        .required(true),
                ),
        )
        .subcommand(Command::new("preview-priorities").about("试算各任务的收益决策，不做任何修改"))
        .subcommand(Command::new("status").about("输出运行模式、代理池和任务状态"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let (command, args) = matches.subcommand().context("缺少子命令")?;

    let mut config = load_config(args)?;

    if command == "run" {
        if let Some(concurrency) = args.get_one::<usize>("concurrency").copied() {
            if concurrency == 0 {
                return Err(anyhow::anyhow!("--concurrency 必须大于0"));
            }
            config.scheduler.concurrency_override = Some(concurrency);
        }
        init_observability(&config.observability)?;
        return run(config).await;
    }

    init_logging(&config.observability.log_level, config.observability.log_format)?;

    match command {
        "run-once" => {
            let task_id = args
                .get_one::<String>("task")
                .context("缺少 --task 参数")?;
            run_once(config, task_id).await
        }
        "preview-priorities" => {
            let app = Application::new(config).await?;
            let previews = app.scheduler().preview_priorities().await?;
            print_json(&previews)
        }
        "status" => {
            let app = Application::new(config).await?;
            print_json(&app.scheduler().status().await)
        }
        other => Err(anyhow::anyhow!("不支持的子命令: {other}")),
    }
}

/// 全局参数会传播到子命令的匹配结果中
fn load_config(args: &ArgMatches) -> Result<AppConfig> {
    let config_path = args.get_one::<String>("config");
    let mut config = AppConfig::load(config_path.map(String::as_str)).with_context(|| {
        format!(
            "加载配置失败: {}",
            config_path.map(String::as_str).unwrap_or("<默认路径>")
        )
    })?;

    if let Some(level) = args.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = args.get_one::<String>("log-format") {
        config.observability.log_format = format
            .parse::<LogFormat>()
            .map_err(|e| anyhow::anyhow!(e))?;
    }
    Ok(config)
}

async fn run(config: AppConfig) -> Result<()> {
    info!("启动认领调度系统");
    let shutdown_timeout = Duration::from_secs(config.scheduler.shutdown_timeout_seconds + 10);
    let app = Application::new(config).await?;

    let shutdown_manager = ShutdownManager::new();
    let shutdown_rx = shutdown_manager.subscribe().await;

    let app_handle = tokio::spawn(async move { app.run(shutdown_rx).await });

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(shutdown_timeout, app_handle).await {
        Ok(Ok(Ok(abandoned))) => {
            if abandoned > 0 {
                warn!("{} 个分发在关闭时被放弃", abandoned);
            } else {
                info!("应用已优雅关闭");
            }
        }
        Ok(Ok(Err(e))) => error!("应用关闭时发生错误: {e:#}"),
        Ok(Err(e)) => error!("应用任务异常退出: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("认领调度系统已退出");
    Ok(())
}

async fn run_once(config: AppConfig, task_id: &str) -> Result<()> {
    let app = Application::new(config).await?;
    app.provision().await;

    let result = app
        .scheduler()
        .run_once(task_id)
        .await
        .with_context(|| format!("执行任务失败: {task_id}"))?;
    app.save_snapshot().await?;
    print_json(&result)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value).context("序列化输出失败")?;
    println!("{output}");
    Ok(())
}
