use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use star_api::{create_app, AppState};
use star_core::{models::ServiceId, AppConfig, ShutdownManager, ShutdownReason};
use star_dispatcher::{
    takeover::{desired_port, local_secret_path, read_local_secret, write_local_secret, write_port_file},
    DispatcherIdentity, StarsManager, TakeoverController, TakeoverOutcome,
};
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};

const FALLBACK_STAR_NAME: &str = "local";

/// 命令行中可以覆盖配置的启动参数
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub port: Option<u16>,
    pub url: Option<String>,
}

/// 端口接管的结果
pub enum Launch {
    /// 已持有端口，可以开始服务
    Ready(Application),
    /// 端口上运行着不更旧的Dispatcher，本进程应正常退出
    Yielded(ServiceId),
}

/// Dispatcher进程
pub struct Application {
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// 解析身份、执行端口接管并组装各组件
    pub async fn launch(config: AppConfig, options: LaunchOptions) -> Result<Launch> {
        let service_id = config
            .dispatcher
            .parsed_service_id()
            .context("解析Dispatcher服务标识失败")?;

        let bind_ip: IpAddr = config
            .dispatcher
            .bind_host
            .parse()
            .with_context(|| format!("无效的监听地址: {}", config.dispatcher.bind_host))?;
        let port = desired_port(options.port, options.url.as_deref(), &config.dispatcher);

        let local_secret = config.dispatcher.cluster_secret.is_empty();
        let cluster_secret = if local_secret {
            warn!("未配置集群密钥，使用本机共享密钥，其他star将无法访问本Dispatcher");
            inherited_local_secret(&config, port).unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
        } else {
            config.dispatcher.cluster_secret.clone()
        };

        info!("启动 {}，目标端口 {}", service_id, port);

        let takeover = TakeoverController::new(service_id.clone(), &cluster_secret, config.takeover.clone())?;
        let listener = match takeover.run(bind_ip, port).await? {
            TakeoverOutcome::Proceed(listener) => listener,
            TakeoverOutcome::Yield { incumbent } => return Ok(Launch::Yielded(incumbent)),
        };

        let local_addr = listener.local_addr().context("读取监听地址失败")?;
        if let Some(path) = &config.dispatcher.port_file {
            if let Err(e) = write_port_file(path, local_addr.port()) {
                warn!("写入端口文件 {} 失败: {}", path, e);
            }
        }
        if local_secret {
            let path = local_secret_path(&config.dispatcher, local_addr.port());
            if let Err(e) = write_local_secret(&path, &cluster_secret) {
                warn!("写入本机密钥 {} 失败: {}", path.display(), e);
            }
        }

        let star_name = resolve_star_name(&config.dispatcher.star_name);
        let gateway_url = options
            .url
            .clone()
            .or_else(|| config.dispatcher.url.clone())
            .unwrap_or_else(|| default_gateway_url(local_addr));

        let identity = Arc::new(DispatcherIdentity::new(
            service_id,
            star_name.clone(),
            gateway_url.clone(),
            cluster_secret,
        ));
        let stars = Arc::new(StarsManager::new(star_name, gateway_url, &config.stars));
        let state = AppState::new(identity, stars, &config, bind_ip, ShutdownManager::new())?;

        info!(
            "star {} 的Dispatcher监听 {}，网关地址 {}",
            state.identity.star_name, local_addr, state.identity.gateway_url
        );

        Ok(Launch::Ready(Self { listener, state }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().context("读取监听地址失败")
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// 开始服务，直到收到信号或停止请求
    pub async fn run(self) -> Result<ShutdownReason> {
        let Self { listener, state } = self;
        let shutdown = state.shutdown.clone();
        let heartbeats = state.heartbeats.clone();

        {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                wait_for_shutdown_signal().await;
                shutdown.shutdown(ShutdownReason::Signal).await;
            });
        }

        let app = create_app(state).into_make_service_with_connect_info::<SocketAddr>();
        let graceful = {
            let shutdown = shutdown.clone();
            async move {
                let reason = shutdown.wait_for_shutdown().await;
                info!("开始优雅关闭: {}", reason);
            }
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(graceful)
            .await
            .context("HTTP服务异常退出")?;

        heartbeats.close_all().await;

        let reason = shutdown.reason().await.unwrap_or(ShutdownReason::Signal);
        info!("Dispatcher已停止: {}", reason);
        Ok(reason)
    }
}

/// 端口上一个Dispatcher留下的本机密钥，接管时用它发送停止请求
fn inherited_local_secret(config: &AppConfig, port: u16) -> Option<String> {
    if port == 0 {
        return None;
    }
    read_local_secret(local_secret_path(&config.dispatcher, port))
}

/// 未配置star名时使用主机名
fn resolve_star_name(configured: &str) -> String {
    if !configured.trim().is_empty() {
        return configured.trim().to_string();
    }
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_STAR_NAME.to_string())
}

fn default_gateway_url(local_addr: SocketAddr) -> String {
    let host = match local_addr.ip() {
        ip if ip.is_unspecified() => "127.0.0.1".to_string(),
        IpAddr::V6(ip) => format!("[{ip}]"),
        ip => ip.to_string(),
    };
    format!("http://{}:{}", host, local_addr.port())
}

/// 等待Ctrl+C或SIGTERM
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
