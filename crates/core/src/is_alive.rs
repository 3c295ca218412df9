//! 进程间存活连接
//!
//! 两个进程之间的一条TCP连接，双方周期性交换一个哨兵字节。任何一方
//! 崩溃、挂起或网络中断，另一方都会在 `max_silence` 内察觉，并触发
//! 注册的连接丢失回调。连接不会自动重连。

use std::fmt;
use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::HeartbeatConfig;
use crate::errors::{StarError, StarResult};

const SENTINEL: u8 = b'*';

pub type LostConnectionCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsAliveState {
    Idle,
    Initializing,
    Running,
    Stopped,
}

impl fmt::Display for IsAliveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IsAliveState::Idle => "IDLE",
            IsAliveState::Initializing => "INITIALIZING",
            IsAliveState::Running => "RUNNING",
            IsAliveState::Stopped => "STOPPED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy)]
enum Endpoint {
    /// 监听一个端口，等待对端连接
    Server(SocketAddr),
    /// 主动连接到对端
    Client(SocketAddr),
}

struct Shared {
    state: watch::Sender<IsAliveState>,
    stop: watch::Sender<bool>,
    callbacks: Mutex<Vec<LostConnectionCallback>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Shared {
    /// 连接丢失：每个回调只执行一次，单个回调panic不影响其余回调
    fn connection_lost(&self) {
        self.state.send_replace(IsAliveState::Stopped);
        let callbacks: Vec<_> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(callback)).is_err() {
                error!("存活连接丢失回调执行时panic");
            }
        }
    }

    fn is_stop_requested(&self) -> bool {
        *self.stop.borrow()
    }
}

pub struct IsAliveConnection {
    endpoint: Endpoint,
    max_init: Duration,
    max_silence: Duration,
    shared: Arc<Shared>,
}

impl IsAliveConnection {
    /// 服务端角色：`start` 时绑定 `bind`（端口为0时由系统分配）
    pub fn server(bind: SocketAddr, config: &HeartbeatConfig) -> Self {
        Self::new(Endpoint::Server(bind), config)
    }

    /// 客户端角色：`start` 时连接 `target`
    pub fn client(target: SocketAddr, config: &HeartbeatConfig) -> Self {
        Self::new(Endpoint::Client(target), config)
    }

    fn new(endpoint: Endpoint, config: &HeartbeatConfig) -> Self {
        let (state, _) = watch::channel(IsAliveState::Idle);
        let (stop, _) = watch::channel(false);
        Self {
            endpoint,
            max_init: config.max_init(),
            max_silence: config.max_silence(),
            shared: Arc::new(Shared {
                state,
                stop,
                callbacks: Mutex::new(Vec::new()),
                local_addr: Mutex::new(None),
            }),
        }
    }

    pub fn on_lost_connection<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(callback));
    }

    /// 启动连接。服务端角色在返回前完成绑定，此后 `local_addr` 可用。
    pub async fn start(&self) -> StarResult<()> {
        let mut started = false;
        self.shared.state.send_if_modified(|state| {
            if *state == IsAliveState::Idle {
                *state = IsAliveState::Initializing;
                started = true;
            }
            started
        });
        if !started {
            return Err(StarError::illegal_input(format!(
                "存活连接无法启动，当前状态: {}",
                self.state()
            )));
        }

        let listener = match self.endpoint {
            Endpoint::Server(bind) => match TcpListener::bind(bind).await {
                Ok(listener) => {
                    let addr = listener.local_addr()?;
                    *self
                        .shared
                        .local_addr
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(addr);
                    debug!("存活连接监听于 {}", addr);
                    Some(listener)
                }
                Err(e) => {
                    self.shared.state.send_replace(IsAliveState::Stopped);
                    return Err(e.into());
                }
            },
            Endpoint::Client(_) => None,
        };

        let endpoint = self.endpoint;
        let max_init = self.max_init;
        let max_silence = self.max_silence;
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            run(endpoint, listener, max_init, max_silence, shared).await;
        });

        Ok(())
    }

    /// 停止连接，可重复调用，不会触发丢失回调
    pub fn stop(&self) {
        if !self.shared.stop.send_replace(true) {
            debug!("停止存活连接");
        }
        self.shared.state.send_replace(IsAliveState::Stopped);
    }

    pub fn state(&self) -> IsAliveState {
        *self.shared.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == IsAliveState::Running
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self
            .shared
            .local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// 等待连接建立或结束，返回是否处于运行状态
    pub async fn wait_until_running(&self) -> bool {
        let mut rx = self.shared.state.subscribe();
        let running = match rx
            .wait_for(|state| matches!(state, IsAliveState::Running | IsAliveState::Stopped))
            .await
        {
            Ok(state) => *state == IsAliveState::Running,
            Err(_) => false,
        };
        running
    }
}

impl Drop for IsAliveConnection {
    fn drop(&mut self) {
        self.shared.stop.send_replace(true);
    }
}

async fn run(
    endpoint: Endpoint,
    listener: Option<TcpListener>,
    max_init: Duration,
    max_silence: Duration,
    shared: Arc<Shared>,
) {
    let mut stop_rx = shared.stop.subscribe();

    let stream = tokio::select! {
        _ = stop_requested(&mut stop_rx) => return,
        result = timeout(max_init, establish(endpoint, listener)) => match result {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!("存活连接建立失败: {}", e);
                if !shared.is_stop_requested() {
                    shared.connection_lost();
                }
                return;
            }
            Err(_) => {
                warn!("存活连接在 {:?} 内未能建立", max_init);
                if !shared.is_stop_requested() {
                    shared.connection_lost();
                }
                return;
            }
        },
    };

    if let Err(e) = stream.set_nodelay(true) {
        debug!("设置TCP_NODELAY失败: {}", e);
    }
    shared.state.send_if_modified(|state| {
        if *state == IsAliveState::Initializing {
            *state = IsAliveState::Running;
            true
        } else {
            false
        }
    });
    info!("存活连接已建立: {:?}", stream.peer_addr().ok());

    match heartbeat_loop(stream, &mut stop_rx, max_silence).await {
        None => debug!("存活连接已停止"),
        Some(reason) => {
            if shared.is_stop_requested() {
                return;
            }
            warn!("存活连接丢失: {}", reason);
            shared.connection_lost();
        }
    }
}

async fn establish(endpoint: Endpoint, listener: Option<TcpListener>) -> std::io::Result<TcpStream> {
    match (endpoint, listener) {
        (Endpoint::Server(_), Some(listener)) => {
            let (stream, peer) = listener.accept().await?;
            debug!("存活连接接受来自 {} 的连接", peer);
            Ok(stream)
        }
        (Endpoint::Client(target), _) => TcpStream::connect(target).await,
        (Endpoint::Server(bind), None) => Err(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            format!("存活连接未绑定: {bind}"),
        )),
    }
}

/// 返回 `None` 表示被 `stop` 中断，否则返回丢失原因
async fn heartbeat_loop(
    mut stream: TcpStream,
    stop_rx: &mut watch::Receiver<bool>,
    max_silence: Duration,
) -> Option<String> {
    let interval = max_silence / 2;
    loop {
        let exchange = async {
            stream.write_all(&[SENTINEL]).await?;
            let mut buf = [0u8; 1];
            stream.read_exact(&mut buf).await?;
            if buf[0] != SENTINEL {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("收到非预期的字节: {:#04x}", buf[0]),
                ));
            }
            Ok(())
        };

        tokio::select! {
            _ = stop_requested(stop_rx) => return None,
            result = timeout(max_silence, exchange) => match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Some(e.to_string()),
                Err(_) => return Some(format!("{max_silence:?} 内未收到对端响应")),
            },
        }

        tokio::select! {
            _ = stop_requested(stop_rx) => return None,
            _ = sleep(interval) => {}
        }
    }
}

async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    // 发送端由 Shared 持有，不会先于任务被释放
    let _ = rx.wait_for(|stopped| *stopped).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn fast_config() -> HeartbeatConfig {
        HeartbeatConfig {
            max_init_ms: 1_000,
            max_silence_ms: 200,
        }
    }

    fn localhost() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    async fn connected_pair() -> (IsAliveConnection, IsAliveConnection) {
        let server = IsAliveConnection::server(localhost(), &fast_config());
        server.start().await.unwrap();
        let addr = server.local_addr().unwrap();

        let client = IsAliveConnection::client(addr, &fast_config());
        client.start().await.unwrap();

        assert!(client.wait_until_running().await);
        assert!(server.wait_until_running().await);
        (server, client)
    }

    fn counter(conn: &IsAliveConnection) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        conn.on_lost_connection(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[tokio::test]
    async fn test_connect_and_stay_alive() {
        let (server, client) = connected_pair().await;
        let lost = counter(&server);

        sleep(Duration::from_millis(600)).await;
        assert!(server.is_running());
        assert!(client.is_running());
        assert_eq!(lost.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_peer_stop_fires_callback_once() {
        let (server, client) = connected_pair().await;
        let lost = counter(&server);
        let client_lost = counter(&client);

        client.stop();
        drop(client);

        let deadline = Instant::now() + Duration::from_secs(2);
        while lost.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            sleep(Duration::from_millis(20)).await;
        }
        sleep(Duration::from_millis(300)).await;

        assert_eq!(lost.load(Ordering::SeqCst), 1);
        assert_eq!(client_lost.load(Ordering::SeqCst), 0);
        assert_eq!(server.state(), IsAliveState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_silent() {
        let (server, _client) = connected_pair().await;
        let lost = counter(&server);

        server.stop();
        server.stop();
        sleep(Duration::from_millis(300)).await;

        assert_eq!(server.state(), IsAliveState::Stopped);
        assert_eq!(lost.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_server_init_timeout_fires_callback() {
        let config = HeartbeatConfig {
            max_init_ms: 100,
            max_silence_ms: 200,
        };
        let server = IsAliveConnection::server(localhost(), &config);
        let lost = counter(&server);
        server.start().await.unwrap();

        assert!(!server.wait_until_running().await);
        assert_eq!(lost.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_block_others() {
        let (server, client) = connected_pair().await;
        server.on_lost_connection(|| panic!("boom"));
        let lost = counter(&server);

        drop(client);

        let deadline = Instant::now() + Duration::from_secs(2);
        while lost.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(lost.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let server = IsAliveConnection::server(localhost(), &fast_config());
        server.start().await.unwrap();
        assert!(server.start().await.is_err());
        server.stop();
    }
}
