use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("任务未找到: {id}")]
    TaskNotFound { id: String },
    #[error("代理未找到: {key}")]
    ProxyNotFound { key: String },
    #[error("无效的代理地址: {0}")]
    InvalidProxy(String),
    #[error("无效的任务参数: {0}")]
    InvalidTaskParams(String),
    #[error("任务执行错误: {0}")]
    TaskExecution(String),
    #[error("任务执行超时")]
    ExecutionTimeout,
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("网络错误: {0}")]
    Network(String),
    #[error("结果日志错误: {0}")]
    OutcomeLog(String),
    #[error("快照错误: {0}")]
    Snapshot(String),
    #[error("代理来源错误: {0}")]
    ProxySource(String),
    #[error("调度器正在关闭")]
    ShuttingDown,
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl SchedulerError {
    pub fn task_not_found<S: Into<String>>(id: S) -> Self {
        Self::TaskNotFound { id: id.into() }
    }
    pub fn proxy_not_found<S: Into<String>>(key: S) -> Self {
        Self::ProxyNotFound { key: key.into() }
    }
    pub fn invalid_params<S: Into<String>>(msg: S) -> Self {
        Self::InvalidTaskParams(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 需要人工介入的错误：任务配置有误，自动重试没有意义
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SchedulerError::Configuration(_) | SchedulerError::InvalidTaskParams(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests;
