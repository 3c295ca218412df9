use std::fmt;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

/// 关闭原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C / SIGTERM
    Signal,
    /// 收到 `POST /stop`，通常是更新版本的Dispatcher在接管端口
    StopRequested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal => write!(f, "系统信号"),
            ShutdownReason::StopRequested => write!(f, "停止请求"),
        }
    }
}

#[derive(Default)]
struct ShutdownState {
    sender: Option<broadcast::Sender<ShutdownReason>>,
    reason: Option<ShutdownReason>,
}

/// 优雅关闭管理器
///
/// 第一次 `shutdown` 之后的订阅者会立即收到同一个原因。
#[derive(Clone)]
pub struct ShutdownManager {
    state: Arc<RwLock<ShutdownState>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self {
            state: Arc::new(RwLock::new(ShutdownState {
                sender: Some(sender),
                reason: None,
            })),
        }
    }

    pub async fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        let state = self.state.read().await;
        match (&state.sender, state.reason) {
            (Some(sender), _) => sender.subscribe(),
            (None, reason) => {
                let (tx, rx) = broadcast::channel(1);
                let _ = tx.send(reason.unwrap_or(ShutdownReason::Signal));
                rx
            }
        }
    }

    /// 触发关闭，重复调用无效果
    pub async fn shutdown(&self, reason: ShutdownReason) {
        let mut state = self.state.write().await;
        if state.reason.is_some() {
            debug!("关闭已经触发过，忽略: {}", reason);
            return;
        }

        info!("触发系统关闭，原因: {}", reason);
        state.reason = Some(reason);

        if let Some(sender) = state.sender.take() {
            debug!("发送关闭信号给 {} 个订阅者", sender.receiver_count());
            let _ = sender.send(reason);
        }
    }

    pub async fn reason(&self) -> Option<ShutdownReason> {
        self.state.read().await.reason
    }

    pub async fn is_shutdown(&self) -> bool {
        self.reason().await.is_some()
    }

    /// 等待关闭信号，返回关闭原因
    pub async fn wait_for_shutdown(&self) -> ShutdownReason {
        let mut rx = self.subscribe().await;
        match rx.recv().await {
            Ok(reason) => reason,
            Err(_) => self.reason().await.unwrap_or(ShutdownReason::Signal),
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
