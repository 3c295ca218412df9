use star_core::config::AppConfig;

fn main() -> anyhow::Result<()> {
    println!("=== Star Dispatcher配置示例 ===\n");

    // 1. 内置默认值
    println!("1. 默认配置:");
    let default_config = AppConfig::default();
    println!("   服务标识: {}", default_config.dispatcher.service_id);
    println!("   监听地址: {}", default_config.dispatcher.bind_host);
    println!("   中继超时: {:?}", default_config.relay.timeout());
    println!("   接管最长等待: {:?}\n", default_config.takeover.max_wait());

    // 2. 从TOML字符串加载
    println!("2. 从TOML字符串加载配置:");
    let toml_config = r#"
[dispatcher]
service_id = "main/dispatcher/2.0.0"
star_name = "east"
port = 9100
cluster_secret = "change-me"

[[stars]]
name = "west"
url = "http://west.internal:8080"

[heartbeat]
max_init_ms = 5000
max_silence_ms = 2000
"#;
    let config = AppConfig::from_toml(toml_config)?;
    println!("   star: {}", config.dispatcher.star_name);
    println!("   服务标识: {}", config.dispatcher.parsed_service_id()?);
    for star in &config.stars {
        println!("   远程star: {} -> {}", star.name, star.url);
    }
    println!();

    // 3. 文件 + 环境变量
    println!("3. 从默认位置加载（环境变量 STAR__<SECTION>__<KEY> 覆盖）:");
    match AppConfig::load(None) {
        Ok(config) => println!("   日志级别: {}", config.logging.level),
        Err(e) => println!("   加载失败: {e:#}"),
    }
    println!();

    // 4. 序列化回TOML
    println!("4. 导出TOML:");
    println!("{}", config.to_toml()?);

    Ok(())
}
