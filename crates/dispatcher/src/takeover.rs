//! 端口接管
//!
//! 启动时、开放服务端口之前执行一次：如果目标端口上已经有一个Dispatcher，
//! 只有版本严格更新的一方才会要求对方停止并接管端口，否则本进程让出。
//! 这不是选举，只在两个进程之间单方面比较版本。

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use tokio::net::TcpListener;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use star_core::{
    config::{DispatcherConfig, TakeoverConfig},
    constants::{DEFAULT_DISPATCHER_PORT, HEADER_CLUSTER_UUID},
    models::ServiceId,
    StarError, StarResult,
};

/// 接管结果
#[derive(Debug)]
pub enum TakeoverOutcome {
    /// 端口已绑定，本进程继续启动
    Proceed(TcpListener),
    /// 端口上运行着不更旧的Dispatcher，本进程应以退出码0结束
    Yield { incumbent: ServiceId },
}

/// 计算期望端口：命令行端口、命令行URL、配置、端口文件、默认值，依次取第一个可用的
pub fn desired_port(
    cli_port: Option<u16>,
    cli_url: Option<&str>,
    config: &DispatcherConfig,
) -> u16 {
    cli_port
        .or_else(|| cli_url.and_then(port_from_url))
        .or(config.port)
        .or_else(|| config.url.as_deref().and_then(port_from_url))
        .or_else(|| config.port_file.as_deref().and_then(read_port_file))
        .unwrap_or(DEFAULT_DISPATCHER_PORT)
}

/// 从URL中取显式端口，没有端口时按协议取默认端口
pub fn port_from_url(url: &str) -> Option<u16> {
    let (scheme, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit('@').next()?;

    match host_port.rsplit_once(':') {
        Some((host, port)) if !host.ends_with(']') || host_port.starts_with('[') => {
            port.parse().ok().or_else(|| default_port(scheme))
        }
        _ => default_port(scheme),
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

pub fn read_port_file(path: &str) -> Option<u16> {
    let content = std::fs::read_to_string(path).ok()?;
    match content.trim().parse() {
        Ok(port) => Some(port),
        Err(e) => {
            warn!("端口文件 {} 内容无效: {}", path, e);
            None
        }
    }
}

/// 绑定成功后记录端口，供下一个实例定位
pub fn write_port_file(path: impl AsRef<Path>, port: u16) -> StarResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, port.to_string())?;
    debug!("端口 {} 已写入 {}", port, path.display());
    Ok(())
}

/// 未配置集群密钥时，同一主机上相继启动的Dispatcher共享的密钥文件
///
/// 配置了端口文件时放在其旁边，否则按端口放在临时目录下。
pub fn local_secret_path(config: &DispatcherConfig, port: u16) -> PathBuf {
    match &config.port_file {
        Some(port_file) => PathBuf::from(format!("{port_file}.secret")),
        None => std::env::temp_dir()
            .join("star-dispatcher")
            .join(format!("{port}.secret")),
    }
}

pub fn read_local_secret(path: impl AsRef<Path>) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let secret = content.trim();
    (!secret.is_empty()).then(|| secret.to_string())
}

/// 绑定成功后记录本进程使用的密钥，下一个实例据此发送停止请求
pub fn write_local_secret(path: impl AsRef<Path>, secret: &str) -> StarResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, secret)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    debug!("本机密钥已写入 {}", path.display());
    Ok(())
}

pub struct TakeoverController {
    own_id: ServiceId,
    cluster_secret: String,
    config: TakeoverConfig,
    http_client: reqwest::Client,
}

impl TakeoverController {
    pub fn new(own_id: ServiceId, cluster_secret: impl Into<String>, config: TakeoverConfig) -> StarResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.probe_timeout())
            .build()
            .map_err(|e| StarError::Internal(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            own_id,
            cluster_secret: cluster_secret.into(),
            config,
            http_client,
        })
    }

    /// 执行接管流程。返回 `Err(StarError::Fatal)` 时进程应以非零退出码结束。
    pub async fn run(&self, bind_ip: IpAddr, port: u16) -> StarResult<TakeoverOutcome> {
        let bind_addr = SocketAddr::new(bind_ip, port);

        let incumbent = match self.probe(port).await? {
            None => {
                debug!("端口 {} 上没有运行中的Dispatcher", port);
                return TcpListener::bind(bind_addr)
                    .await
                    .map(TakeoverOutcome::Proceed)
                    .map_err(|e| StarError::Fatal(format!("绑定 {bind_addr} 失败: {e}")));
            }
            Some(id) => id,
        };

        if !self.own_id.is_newer_than(&incumbent) {
            info!(
                "端口 {} 上已运行 {}，本进程 {} 不更新，让出端口",
                port, incumbent, self.own_id
            );
            return Ok(TakeoverOutcome::Yield { incumbent });
        }

        info!(
            "本进程 {} 比端口 {} 上的 {} 更新，请求其停止",
            self.own_id, port, incumbent
        );
        self.request_stop(port).await;

        self.wait_for_port(bind_addr).await.map(TakeoverOutcome::Proceed)
    }

    /// 探测端口上的Dispatcher版本，无应答返回 `None`
    async fn probe(&self, port: u16) -> StarResult<Option<ServiceId>> {
        let url = format!("http://127.0.0.1:{port}/version");
        let response = match self
            .http_client
            .get(&url)
            .header(HEADER_CLUSTER_UUID, &self.cluster_secret)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!("探测 {} 无应答: {}", url, e);
                return Ok(None);
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StarError::Fatal(format!("读取 {url} 响应失败: {e}")))?;
        if !status.is_success() {
            return Err(StarError::Fatal(format!(
                "端口 {port} 被占用，/version 返回 HTTP {status}"
            )));
        }

        let raw: String = serde_json::from_str(&body).unwrap_or_else(|_| body.trim().to_string());
        ServiceId::parse(&raw)
            .map(Some)
            .map_err(|e| StarError::Fatal(format!("无法解析端口 {port} 上的服务标识 '{raw}': {e}")))
    }

    async fn request_stop(&self, port: u16) {
        let url = format!("http://127.0.0.1:{port}/stop");
        match self
            .http_client
            .post(&url)
            .header(HEADER_CLUSTER_UUID, &self.cluster_secret)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => debug!("已请求 {} 停止", url),
            Ok(response) => warn!("停止请求返回 HTTP {}", response.status()),
            // 对端可能在应答前就已经退出
            Err(e) => debug!("停止请求失败: {}", e),
        }
    }

    async fn wait_for_port(&self, bind_addr: SocketAddr) -> StarResult<TcpListener> {
        let deadline = Instant::now() + self.config.max_wait();
        loop {
            match TcpListener::bind(bind_addr).await {
                Ok(listener) => {
                    info!("已接管端口 {}", bind_addr.port());
                    return Ok(listener);
                }
                Err(e) if Instant::now() >= deadline => {
                    error!(
                        "等待端口 {} 释放超时（{:?}）: {}",
                        bind_addr.port(),
                        self.config.max_wait(),
                        e
                    );
                    return Err(StarError::Fatal(format!(
                        "{:?} 内未能接管端口 {}",
                        self.config.max_wait(),
                        bind_addr.port()
                    )));
                }
                Err(_) => sleep(self.config.poll_interval()).await,
            }
        }
    }
}
