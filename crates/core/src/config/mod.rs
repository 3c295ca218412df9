//! 配置管理
//!
//! 配置按以下顺序合并：内置默认值、TOML配置文件、`STAR__` 前缀的环境变量。
//! 命令行参数由二进制入口在加载之后覆盖。
//!
//! ```rust,no_run
//! use star_core::config::AppConfig;
//!
//! let config = AppConfig::load(Some("config/star.toml")).unwrap();
//! println!("relay timeout: {:?}", config.relay.timeout());
//! ```

pub mod models;

pub use models::*;
