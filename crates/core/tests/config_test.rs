use star_core::config::*;
use std::env;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_default_config() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());

    // 验证默认值
    assert_eq!(config.relay.timeout_ms, 10_000);
    assert_eq!(config.takeover.max_wait_ms, 15_000);
    assert_eq!(config.dispatcher.bind_host, "0.0.0.0");
    assert!(config.stars.is_empty());
}

#[test]
fn test_config_from_toml() {
    let toml_content = r#"
[dispatcher]
service_id = "main/dispatcher/2.3.1"
star_name = "east"
port = 9100
cluster_secret = "s3cret"

[[stars]]
name = "west"
url = "http://west.internal:8080"

[relay]
timeout_ms = 2500

[heartbeat]
max_init_ms = 5000
max_silence_ms = 1000

[logging]
level = "debug"
format = "json"
"#;

    let config = AppConfig::from_toml(toml_content).unwrap();
    assert_eq!(config.dispatcher.star_name, "east");
    assert_eq!(config.dispatcher.port, Some(9100));
    assert_eq!(config.stars.len(), 1);
    assert_eq!(config.stars[0].name, "west");
    assert_eq!(config.relay.timeout().as_millis(), 2500);
    assert_eq!(config.heartbeat.max_silence().as_millis(), 1000);
    assert_eq!(
        config.dispatcher.parsed_service_id().unwrap().to_string(),
        "main/dispatcher/2.3.1"
    );

    // 序列化后再解析保持一致
    let round_trip = AppConfig::from_toml(&config.to_toml().unwrap()).unwrap();
    assert_eq!(round_trip.stars, config.stars);
}

#[test]
fn test_invalid_config_rejected() {
    let duplicate_stars = r#"
[[stars]]
name = "west"
url = "http://a:8080"

[[stars]]
name = "west"
url = "http://b:8080"
"#;
    assert!(AppConfig::from_toml(duplicate_stars).is_err());

    let bad_format = r#"
[logging]
format = "xml"
"#;
    assert!(AppConfig::from_toml(bad_format).is_err());
}

#[test]
fn test_load_file_with_env_override() {
    let mut file = NamedTempFile::with_suffix(".toml").unwrap();
    writeln!(
        file,
        r#"
[dispatcher]
star_name = "from-file"
cluster_secret = "file-secret"

[relay]
timeout_ms = 3000
"#
    )
    .unwrap();

    env::set_var("STAR__RELAY__TIMEOUT_MS", "4500");
    env::set_var("STAR__DISPATCHER__STAR_NAME", "from-env");
    let config = AppConfig::load(file.path().to_str());
    env::remove_var("STAR__RELAY__TIMEOUT_MS");
    env::remove_var("STAR__DISPATCHER__STAR_NAME");

    let config = config.unwrap();
    assert_eq!(config.relay.timeout_ms, 4500);
    assert_eq!(config.dispatcher.star_name, "from-env");
    assert_eq!(config.dispatcher.cluster_secret, "file-secret");
}

#[test]
fn test_missing_explicit_file_is_error() {
    assert!(AppConfig::load(Some("/nonexistent/star.toml")).is_err());
}
