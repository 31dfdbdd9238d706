use crate::*;
use std::io::Write;

const SAMPLE: &str = r#"
[scheduler]
tick_interval_seconds = 2
concurrency_override = 4

[proxy_pool]
proxies = ["10.0.0.1:8080", "alice:secret@10.0.0.2:3128"]

[profitability]
negative_score_policy = "disable"

[[tasks]]
id = "faucet-alpha"
base_interval_seconds = 3600

[[tasks]]
id = "faucet-beta"
base_interval_seconds = 1800
enabled = false
parameters = { account = "beta-01" }
"#;

#[test]
fn test_default_config_is_valid() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.proxy_pool.failure_threshold, 3);
    assert_eq!(config.proxy_pool.cooldown_seconds, 300);
    assert_eq!(config.proxy_pool.burn_seconds, 43200);
    assert_eq!(config.operation_mode.normal_threshold, 10);
    assert_eq!(config.operation_mode.low_proxy_threshold, 3);
    assert_eq!(config.scheduler.cooling_penalty_seconds, 1800);
    assert_eq!(config.profitability.disable_cooldown_hours, 24);
}

#[test]
fn test_from_toml_partial_sections() {
    let config = AppConfig::from_toml(SAMPLE).unwrap();
    assert_eq!(config.scheduler.tick_interval_seconds, 2);
    assert_eq!(config.scheduler.concurrency_override, Some(4));
    // 未出现的字段保持默认值
    assert_eq!(config.scheduler.failure_streak_threshold, 3);
    assert_eq!(config.proxy_pool.proxies.len(), 2);
    assert_eq!(
        config.profitability.negative_score_policy,
        NegativeScorePolicy::Disable
    );
    assert_eq!(config.tasks.len(), 2);
    assert!(config.tasks[0].enabled);
    assert!(!config.tasks[1].enabled);
    assert!(config.tasks[1].parameters.is_some());
}

#[test]
fn test_toml_roundtrip_keeps_tasks() {
    let config = AppConfig::from_toml(SAMPLE).unwrap();
    let rendered = config.to_toml().unwrap();
    let reparsed = AppConfig::from_toml(&rendered).unwrap();
    assert_eq!(reparsed.tasks.len(), 2);
    assert_eq!(reparsed.tasks[1].id, "faucet-beta");
}

#[test]
fn test_duplicate_task_ids_rejected() {
    let toml = r#"
[[tasks]]
id = "dup"
base_interval_seconds = 60

[[tasks]]
id = "dup"
base_interval_seconds = 120
"#;
    let err = AppConfig::from_toml(toml).unwrap_err();
    assert!(err.to_string().contains("dup"));
}

#[test]
fn test_invalid_mode_thresholds_rejected() {
    let mut config = AppConfig::default();
    config.operation_mode.low_proxy_threshold = 20;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.operation_mode.low_proxy_concurrency = 5;
    assert!(config.validate().is_err());
}

#[test]
fn test_disable_window_must_cover_three_days() {
    let mut config = AppConfig::default();
    config.profitability.disable_lookback_hours = 48;
    assert!(config.validate().is_err());
}

#[test]
fn test_durations_are_capped() {
    let mut config = AppConfig::default();
    config.tasks = vec![TaskDefinition::new("faucet", MAX_SPAN_SECONDS)];
    assert!(config.validate().is_ok());

    config.tasks = vec![TaskDefinition::new("faucet", u64::MAX)];
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.scheduler.cooling_penalty_seconds = MAX_SPAN_SECONDS + 1;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.scheduler.pool_exhausted_delay_max_seconds = u64::MAX;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.proxy_pool.burn_seconds = u64::MAX;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.profitability.disable_cooldown_hours = i64::MAX;
    assert!(config.validate().is_err());
}

#[test]
fn test_profit_weight_dominates_roi_weight() {
    let mut config = AppConfig::default();
    config.profitability.profit_weight = 0.2;
    config.profitability.roi_weight = 0.8;
    assert!(config.validate().is_err());
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(SAMPLE.as_bytes()).unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let config = AppConfig::load(Some(&path)).unwrap();
    assert_eq!(config.tasks.len(), 2);
    assert_eq!(config.scheduler.tick_interval_seconds, 2);
}

#[test]
fn test_load_missing_file_fails() {
    assert!(AppConfig::load(Some("/definitely/not/here.toml")).is_err());
}

#[test]
fn test_log_format_parse() {
    assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
    assert!("xml".parse::<LogFormat>().is_err());
}
