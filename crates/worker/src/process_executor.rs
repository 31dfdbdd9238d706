use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use claim_config::ExecutorConfig;
use claim_domain::{Earnings, Executor, Job, Outcome, OutcomeKind, ProxyRecord};
use claim_errors::{SchedulerError, SchedulerResult};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// 认领命令在 stdout 最后一行输出的 JSON 报告
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClaimReport {
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub message: Option<String>,
}

impl ClaimReport {
    /// 从后往前找第一行可解析的 JSON 对象
    pub fn from_lines(lines: &[String]) -> Option<Self> {
        lines
            .iter()
            .rev()
            .map(|line| line.trim())
            .filter(|line| line.starts_with('{'))
            .find_map(|line| serde_json::from_str(line).ok())
    }
}

/// 外部进程执行器
///
/// 任务与代理信息通过环境变量传入：
///
/// | 变量                | 内容                         |
/// |---------------------|------------------------------|
/// | `CLAIM_TASK_ID`     | 任务 ID                      |
/// | `CLAIM_PROXY_URL`   | 带凭据的代理 URL             |
/// | `CLAIM_PROXY_KEY`   | 代理池键                     |
/// | `CLAIM_TASK_PARAMS` | 任务参数 JSON，没有时不设置  |
///
/// 退出码 0 为成功，2 瞬时失败，3 被检测，4 致命错误，其余按瞬时失败处理。
pub struct ProcessExecutor {
    config: ExecutorConfig,
}

impl ProcessExecutor {
    pub const EXIT_SUCCESS: i32 = 0;
    pub const EXIT_TRANSIENT: i32 = 2;
    pub const EXIT_DETECTION: i32 = 3;
    pub const EXIT_FATAL: i32 = 4;

    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    fn build_command(&self, job: &Job, proxy: &ProxyRecord) -> SchedulerResult<Command> {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // 调度器超时后丢弃 future 时一并结束子进程
        cmd.kill_on_drop(true);

        if let Some(ref dir) = self.config.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }

        cmd.env("CLAIM_TASK_ID", &job.id);
        cmd.env("CLAIM_PROXY_URL", proxy.url());
        cmd.env("CLAIM_PROXY_KEY", &proxy.key);

        if let Some(ref parameters) = job.parameters {
            if !parameters.is_object() {
                return Err(SchedulerError::invalid_params(format!(
                    "任务 {} 的参数必须是JSON对象",
                    job.id
                )));
            }
            let encoded = serde_json::to_string(parameters)
                .map_err(|e| SchedulerError::Serialization(e.to_string()))?;
            cmd.env("CLAIM_TASK_PARAMS", encoded);
        }
        Ok(cmd)
    }

    /// 按退出码分类；没有退出码说明进程被信号终止
    pub fn classify(exit_code: Option<i32>, report: Option<ClaimReport>, stderr: &[String]) -> Outcome {
        let message = report
            .as_ref()
            .and_then(|r| r.message.clone())
            .or_else(|| stderr.iter().rev().find(|l| !l.trim().is_empty()).cloned());

        let outcome = match exit_code {
            Some(Self::EXIT_SUCCESS) => {
                let outcome = Outcome::new(OutcomeKind::Success);
                return match report {
                    Some(report) => outcome.with_earnings(Earnings {
                        amount: report.amount,
                        cost: report.cost,
                    }),
                    None => outcome,
                };
            }
            Some(Self::EXIT_TRANSIENT) => Outcome::new(OutcomeKind::TransientFailure),
            Some(Self::EXIT_DETECTION) => Outcome::new(OutcomeKind::DetectionFailure),
            Some(Self::EXIT_FATAL) => Outcome::new(OutcomeKind::Fatal),
            Some(code) => {
                return Outcome::transient(message.unwrap_or_else(|| format!("未知退出码: {code}")))
            }
            None => return Outcome::transient(message.unwrap_or_else(|| "进程被信号终止".to_string())),
        };

        match message {
            Some(message) => outcome.with_message(message),
            None => outcome,
        }
    }
}

async fn read_lines<R>(reader: R) -> Vec<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = Vec::new();
    let mut reader = BufReader::new(reader).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        lines.push(line);
    }
    lines
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(&self, job: &Job, proxy: &ProxyRecord) -> SchedulerResult<Outcome> {
        let started = Instant::now();
        let mut cmd = self.build_command(job, proxy)?;

        debug!(
            task.id = %job.id,
            proxy.key = %proxy.key,
            command = %self.config.command,
            "启动认领命令"
        );
        let mut child = cmd
            .spawn()
            .map_err(|e| SchedulerError::TaskExecution(format!("启动认领命令失败: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SchedulerError::TaskExecution("无法获取stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SchedulerError::TaskExecution("无法获取stderr".to_string()))?;

        let (stdout_lines, stderr_lines) = tokio::join!(read_lines(stdout), read_lines(stderr));

        let status = child
            .wait()
            .await
            .map_err(|e| SchedulerError::TaskExecution(format!("等待认领命令结束失败: {e}")))?;

        let elapsed = started.elapsed();
        let outcome = Self::classify(
            status.code(),
            ClaimReport::from_lines(&stdout_lines),
            &stderr_lines,
        )
        .with_latency(elapsed.as_millis() as u64);

        info!(
            task.id = %job.id,
            exit_code = ?status.code(),
            outcome = outcome.kind.as_str(),
            duration_ms = elapsed.as_millis() as u64,
            "认领命令结束"
        );
        Ok(outcome)
    }

    fn name(&self) -> &str {
        "process"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_report_uses_last_json_line() {
        let stdout = lines(&[
            "{\"amount\": 1.0}",
            "visiting faucet",
            "{\"amount\": 0.25, \"cost\": 0.01}",
            "done",
        ]);
        let report = ClaimReport::from_lines(&stdout).unwrap();
        assert_eq!(report.amount, 0.25);
        assert_eq!(report.cost, 0.01);
        assert!(ClaimReport::from_lines(&lines(&["no json here"])).is_none());
    }

    #[test]
    fn test_exit_codes_map_to_outcome_kinds() {
        let cases = [
            (Some(0), OutcomeKind::Success),
            (Some(2), OutcomeKind::TransientFailure),
            (Some(3), OutcomeKind::DetectionFailure),
            (Some(4), OutcomeKind::Fatal),
            (Some(1), OutcomeKind::TransientFailure),
            (Some(137), OutcomeKind::TransientFailure),
            (None, OutcomeKind::TransientFailure),
        ];
        for (code, kind) in cases {
            assert_eq!(ProcessExecutor::classify(code, None, &[]).kind, kind, "{code:?}");
        }
    }

    #[test]
    fn test_success_carries_earnings() {
        let report = ClaimReport {
            amount: 0.5,
            cost: 0.1,
            message: None,
        };
        let outcome = ProcessExecutor::classify(Some(0), Some(report), &[]);
        let earnings = outcome.earnings.unwrap();
        assert_eq!(earnings.amount, 0.5);
        assert_eq!(earnings.cost, 0.1);

        assert!(ProcessExecutor::classify(Some(0), None, &[]).earnings.is_none());
    }

    #[test]
    fn test_failure_message_prefers_report_then_stderr() {
        let stderr = lines(&["warming up", "captcha shown", ""]);
        let outcome = ProcessExecutor::classify(Some(3), None, &stderr);
        assert_eq!(outcome.message.as_deref(), Some("captcha shown"));

        let report = ClaimReport {
            message: Some("cloudflare block".into()),
            ..ClaimReport::default()
        };
        let outcome = ProcessExecutor::classify(Some(3), Some(report), &stderr);
        assert_eq!(outcome.message.as_deref(), Some("cloudflare block"));
    }
}
