use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use star::app::{Application, Launch, LaunchOptions};
use star_core::AppConfig;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // 解析命令行参数
    let matches = Command::new("star-dispatcher")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Star Dispatcher：服务注册中心、API网关与跨集群请求路由")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时依次查找默认位置"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("监听端口，优先于配置和端口文件")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("url")
                .short('u')
                .long("url")
                .value_name("URL")
                .help("本Dispatcher对外的网关地址，未指定端口时从中取端口"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let options = LaunchOptions {
        port: matches.get_one::<u16>("port").copied(),
        url: matches.get_one::<String>("url").cloned(),
    };

    // 加载配置
    let config = match AppConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("加载配置失败: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    // 初始化日志系统
    let log_level = matches
        .get_one::<String>("log-level")
        .unwrap_or(&config.logging.level);
    let log_format = matches
        .get_one::<String>("log-format")
        .unwrap_or(&config.logging.format);
    if let Err(e) = init_logging(log_level, log_format) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    match run(config, options).await {
        Ok(code) => code,
        Err(e) => {
            error!("Dispatcher启动失败: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig, options: LaunchOptions) -> Result<ExitCode> {
    let app = match Application::launch(config, options).await? {
        Launch::Ready(app) => app,
        Launch::Yielded(incumbent) => {
            info!("端口已由 {} 持有，本进程退出", incumbent);
            return Ok(ExitCode::SUCCESS);
        }
    };

    let reason = app.run().await.context("Dispatcher运行失败")?;
    info!("Star Dispatcher已退出（{}）", reason);
    Ok(ExitCode::SUCCESS)
}

/// 初始化日志系统
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}
