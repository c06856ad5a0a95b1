use std::time::Duration;

use concierge::config::{GlobalConfig, PlatformKind};
use concierge::AppError;

fn sample_toml() -> &'static str {
    r#"
platform = "telegram"
http_port = 8080
database_path = "data/bot.db"
retention_days = 30

[batching]
window_seconds = 20
history_limit = 6

[dedup]
window_seconds = 3
capacity = 200
retain = 100

[generation]
max_attempts = 2
retry_delay_ms = 500
fallback_message = "One moment please."

[delivery]
typing_delay_ms = 1000

[follow_up]
inactivity_ratio = 0.5

[llm]
base_url = "http://localhost:11434/v1"
model = "llama3"
"#
}

#[test]
fn full_config_parses() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("valid config");

    assert_eq!(config.platform, PlatformKind::Telegram);
    assert_eq!(config.http_port, 8080);
    assert_eq!(config.retention_days, 30);
    assert_eq!(config.batch_window(), Duration::from_secs(20));
    assert_eq!(config.batching.history_limit, 6);
    assert_eq!(config.dedup.capacity, 200);
    assert_eq!(config.generation.max_attempts, 2);
    assert_eq!(config.generation.fallback_message, "One moment please.");
    assert_eq!(config.delivery.typing_delay_ms, 1000);
    assert!((config.follow_up.inactivity_ratio - 0.5).abs() < f64::EPSILON);
    assert_eq!(config.llm.model, "llama3");
}

#[test]
fn minimal_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str("platform = \"messenger\"").expect("valid config");

    assert_eq!(config.platform, PlatformKind::Messenger);
    assert_eq!(config.http_port, 3000);
    assert_eq!(config.retention_days, 90);
    assert_eq!(config.batch_window(), Duration::from_secs(30));
    assert_eq!(config.batching.history_limit, 10);
    assert_eq!(config.dedup.window_seconds, 5);
    assert_eq!(config.dedup.capacity, 1000);
    assert_eq!(config.dedup.retain, 500);
    assert_eq!(config.generation.max_attempts, 3);
    assert_eq!(config.generation.retry_delay_ms, 1000);
    assert_eq!(config.delivery.typing_delay_ms, 1500);
    assert_eq!(config.delivery.follow_up_pause_ms, 3000);
    assert_eq!(config.delivery.auto_split_wait_ms, 2000);
    assert!(config.follow_up.enabled);
    assert_eq!(config.idle_ttl(), Duration::from_secs(24 * 3600));
    assert_eq!(config.sweep_interval(), Duration::from_secs(3600));
    assert_eq!(config.messenger.graph_api_base, "https://graph.facebook.com/v19.0");
    assert_eq!(config.follow_up.catalog().expect("catalog").len(), 8);
}

#[test]
fn secrets_are_never_read_from_toml() {
    let raw = r#"
platform = "messenger"

[messenger]
verify_token = "verify-me"
page_access_token = "leaked"
"#;
    let config = GlobalConfig::from_toml_str(raw).expect("valid config");
    assert_eq!(config.messenger.verify_token, "verify-me");
    assert!(config.messenger.page_access_token.is_empty());
}

#[test]
fn missing_platform_is_rejected() {
    let result = GlobalConfig::from_toml_str("http_port = 3000");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn unknown_platform_is_rejected() {
    let result = GlobalConfig::from_toml_str("platform = \"whatsapp\"");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn zero_batch_window_is_rejected() {
    let raw = "platform = \"messenger\"\n[batching]\nwindow_seconds = 0\n";
    let err = GlobalConfig::from_toml_str(raw).expect_err("should fail");
    assert!(err.to_string().contains("window_seconds"));
}

#[test]
fn zero_attempts_is_rejected() {
    let raw = "platform = \"messenger\"\n[generation]\nmax_attempts = 0\n";
    assert!(GlobalConfig::from_toml_str(raw).is_err());
}

#[test]
fn retain_must_be_below_capacity() {
    let raw = "platform = \"messenger\"\n[dedup]\ncapacity = 100\nretain = 100\n";
    assert!(GlobalConfig::from_toml_str(raw).is_err());
}

#[test]
fn inactivity_ratio_out_of_range_is_rejected() {
    for ratio in ["0.0", "1.5", "-0.2"] {
        let raw = format!("platform = \"messenger\"\n[follow_up]\ninactivity_ratio = {ratio}\n");
        assert!(GlobalConfig::from_toml_str(&raw).is_err(), "ratio {ratio}");
    }
}

#[test]
fn custom_sequences_replace_builtin_catalog() {
    let raw = r#"
platform = "messenger"

[[follow_up.sequences]]
id = "price_check"
delay_seconds = 600
triggers = ["price_asked"]
messages = ["Still thinking about the price?"]
next = "last_call"

[[follow_up.sequences]]
id = "last_call"
delay_seconds = 3600
messages = ["Our sale ends tonight!"]
"#;
    let config = GlobalConfig::from_toml_str(raw).expect("valid config");
    let catalog = config.follow_up.catalog().expect("catalog");
    assert_eq!(catalog.len(), 2);
    assert_eq!(
        catalog.get("price_check").and_then(|s| s.next.as_deref()),
        Some("last_call")
    );
}

#[test]
fn dangling_next_sequence_is_rejected() {
    let raw = r#"
platform = "messenger"

[[follow_up.sequences]]
id = "only"
delay_seconds = 60
messages = ["hi"]
next = "missing"
"#;
    let err = GlobalConfig::from_toml_str(raw).expect_err("should fail");
    assert!(err.to_string().contains("missing"));
}

#[test]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, sample_toml()).expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("load");
    assert_eq!(config.http_port, 8080);
}

#[test]
fn load_from_missing_path_is_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = GlobalConfig::load_from_path(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(AppError::Config(_))));
}
