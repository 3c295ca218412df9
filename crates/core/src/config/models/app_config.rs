use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use super::{
    dispatcher_star::{DispatcherConfig, StarEntryConfig},
    network::{HeartbeatConfig, RelayConfig, TakeoverConfig},
    observability::{LoggingConfig, TokenConfig},
};

const DEFAULT_CONFIG_PATHS: [&str; 3] = ["config/star.toml", "star.toml", "/etc/star/config.toml"];

/// 系统配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dispatcher: DispatcherConfig,
    pub stars: Vec<StarEntryConfig>,
    pub relay: RelayConfig,
    pub takeover: TakeoverConfig,
    pub heartbeat: HeartbeatConfig,
    pub token: TokenConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序:
    /// 1. 内置默认值
    /// 2. 配置文件（TOML），未指定时依次尝试默认路径
    /// 3. 环境变量覆盖（前缀 `STAR`，层级分隔符 `__`，如 `STAR__RELAY__TIMEOUT_MS`）
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("STAR")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// 从TOML字符串加载配置
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.dispatcher
            .validate()
            .context("Dispatcher配置验证失败")?;

        let mut names = HashSet::new();
        for star in &self.stars {
            star.validate().context("star配置验证失败")?;
            if !names.insert(star.name.as_str()) {
                return Err(anyhow::anyhow!("重复的star名称: {}", star.name));
            }
        }

        self.relay.validate().context("中继配置验证失败")?;
        self.takeover.validate().context("接管配置验证失败")?;
        self.heartbeat.validate().context("存活连接配置验证失败")?;
        self.token.validate().context("令牌配置验证失败")?;
        self.logging.validate().context("日志配置验证失败")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.stars.is_empty());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml_str = r#"
[dispatcher]
star_name = "home"
url = "http://localhost:9000"
cluster_secret = "s3cret"

[[stars]]
name = "eu"
url = "http://eu.internal:9000"

[relay]
timeout_ms = 2500
"#;
        let config = AppConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.dispatcher.star_name, "home");
        assert_eq!(config.stars.len(), 1);
        assert_eq!(config.relay.timeout_ms, 2500);
        assert_eq!(config.takeover.poll_interval_ms, 100);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_duplicate_star_names_rejected() {
        let toml_str = r#"
[[stars]]
name = "eu"
url = "http://a:1"

[[stars]]
name = "eu"
url = "http://b:1"
"#;
        assert!(AppConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.dispatcher.service_id, config.dispatcher.service_id);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[dispatcher]\nport = 9123\n\n[logging]\nformat = \"json\"\n"
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(config.dispatcher.port, Some(9123));
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_load_missing_file() {
        assert!(AppConfig::load(Some("/nonexistent/star.toml")).is_err());
    }
}
