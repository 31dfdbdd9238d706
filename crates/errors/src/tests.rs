use crate::*;

#[test]
fn test_scheduler_error_display() {
    let task_error = SchedulerError::task_not_found("faucet-a");
    assert_eq!(task_error.to_string(), "任务未找到: faucet-a");

    let proxy_error = SchedulerError::proxy_not_found("10.0.0.1:8080");
    assert_eq!(proxy_error.to_string(), "代理未找到: 10.0.0.1:8080");

    let timeout_error = SchedulerError::ExecutionTimeout;
    assert_eq!(timeout_error.to_string(), "任务执行超时");

    let shutdown_error = SchedulerError::ShuttingDown;
    assert_eq!(shutdown_error.to_string(), "调度器正在关闭");
}

#[test]
fn test_fatal_classification() {
    assert!(SchedulerError::invalid_params("missing wallet address").is_fatal());
    assert!(SchedulerError::config_error("bad command").is_fatal());
    assert!(!SchedulerError::Network("reset".to_string()).is_fatal());
    assert!(!SchedulerError::ExecutionTimeout.is_fatal());
}

#[test]
fn test_from_serde_json_error() {
    let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let converted: SchedulerError = err.into();
    assert!(matches!(converted, SchedulerError::Serialization(_)));
}
