use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use star_core::{config::HeartbeatConfig, IsAliveConnection, StarError, StarResult};

use crate::registry::ServiceRegistry;

/// 连接与其代数，代数区分同一实例先后打开的连接
type Connections = Arc<Mutex<HashMap<Uuid, (u64, IsAliveConnection)>>>;

/// 已注册实例的存活连接
///
/// 每个实例最多一条服务端连接，连接丢失时自动注销该实例。
pub struct InstanceHeartbeats {
    registry: Arc<dyn ServiceRegistry>,
    config: HeartbeatConfig,
    bind_ip: IpAddr,
    connections: Connections,
    next_generation: AtomicU64,
}

impl InstanceHeartbeats {
    pub fn new(registry: Arc<dyn ServiceRegistry>, config: HeartbeatConfig, bind_ip: IpAddr) -> Self {
        Self {
            registry,
            config,
            bind_ip,
            connections: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// 为实例打开一条服务端存活连接，返回监听端口
    pub async fn open(&self, instance_id: Uuid) -> StarResult<u16> {
        let instance = self
            .registry
            .instance(instance_id)
            .await
            .ok_or_else(|| StarError::not_found(format!("未注册的实例: {instance_id}")))?;

        let connection = IsAliveConnection::server(SocketAddr::new(self.bind_ip, 0), &self.config);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let registry = Arc::clone(&self.registry);
        let connections = Arc::clone(&self.connections);
        let runtime = tokio::runtime::Handle::current();
        connection.on_lost_connection(move || {
            runtime.spawn(connection_lost(registry, connections, instance_id, generation));
        });

        connection.start().await?;
        let port = connection
            .local_addr()
            .map(|addr| addr.port())
            .ok_or_else(|| StarError::Internal("存活连接没有监听地址".to_string()))?;

        // 替换旧连接时先停止，避免旧连接的回调注销实例
        if let Some((_, previous)) = self
            .connections
            .lock()
            .await
            .insert(instance_id, (generation, connection))
        {
            previous.stop();
        }

        info!("实例 {} ({}) 的存活连接监听端口 {}", instance.id, instance_id, port);
        Ok(port)
    }

    /// 停止实例的存活连接，不会触发注销
    pub async fn close(&self, instance_id: Uuid) {
        if let Some((_, connection)) = self.connections.lock().await.remove(&instance_id) {
            connection.stop();
        }
    }

    pub async fn close_all(&self) {
        let mut connections = self.connections.lock().await;
        for (_, (_, connection)) in connections.drain() {
            connection.stop();
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }
}

/// 只有仍是该实例当前连接时才注销，已被新连接取代的旧连接不做任何事
async fn connection_lost(
    registry: Arc<dyn ServiceRegistry>,
    connections: Connections,
    instance_id: Uuid,
    generation: u64,
) {
    {
        let mut connections = connections.lock().await;
        match connections.get(&instance_id) {
            Some((current, _)) if *current != generation => {
                debug!("实例 {} 的旧存活连接已被取代，忽略丢失", instance_id);
                return;
            }
            Some(_) => {
                connections.remove(&instance_id);
            }
            None => {}
        }
    }

    warn!("实例 {} 的存活连接丢失，注销该实例", instance_id);
    registry.unregister(instance_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use star_core::models::{RegisteredInstance, ServiceId};
    use tokio::time::{sleep, Instant};

    use crate::registry::Services;

    fn config() -> HeartbeatConfig {
        HeartbeatConfig {
            max_init_ms: 1_000,
            max_silence_ms: 200,
        }
    }

    #[tokio::test]
    async fn test_unknown_instance_rejected() {
        let heartbeats = InstanceHeartbeats::new(
            Arc::new(Services::new()),
            config(),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
        );
        assert!(matches!(
            heartbeats.open(Uuid::new_v4()).await,
            Err(StarError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_lost_connection_unregisters_instance() {
        let services = Arc::new(Services::new());
        let instance = RegisteredInstance::new(
            ServiceId::parse("grp/svc/1.0").unwrap(),
            Uuid::new_v4(),
            "http://127.0.0.1:1",
        );
        let instance_id = instance.instance_id;
        services.register(instance).await;

        let heartbeats = InstanceHeartbeats::new(services.clone(), config(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        let port = heartbeats.open(instance_id).await.unwrap();

        let client = IsAliveConnection::client(SocketAddr::from(([127, 0, 0, 1], port)), &config());
        client.start().await.unwrap();
        assert!(client.wait_until_running().await);
        assert_eq!(heartbeats.len().await, 1);

        // 服务进程退出
        drop(client);

        let deadline = Instant::now() + Duration::from_secs(3);
        while services.instance(instance_id).await.is_some() && Instant::now() < deadline {
            sleep(Duration::from_millis(20)).await;
        }
        assert!(services.instance(instance_id).await.is_none());
        assert_eq!(heartbeats.len().await, 0);
    }

    #[tokio::test]
    async fn test_superseded_connection_loss_is_ignored() {
        let services = Arc::new(Services::new());
        let instance = RegisteredInstance::new(
            ServiceId::parse("grp/svc/1.0").unwrap(),
            Uuid::new_v4(),
            "http://127.0.0.1:1",
        );
        let instance_id = instance.instance_id;
        services.register(instance).await;

        let heartbeats = InstanceHeartbeats::new(services.clone(), config(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        heartbeats.open(instance_id).await.unwrap();
        heartbeats.open(instance_id).await.unwrap();
        assert_eq!(heartbeats.len().await, 1);

        // 第一条连接的丢失通知晚于第二条连接打开
        let registry: Arc<dyn ServiceRegistry> = services.clone();
        connection_lost(registry.clone(), heartbeats.connections.clone(), instance_id, 0).await;
        assert!(services.instance(instance_id).await.is_some());
        assert_eq!(heartbeats.len().await, 1);

        connection_lost(registry, heartbeats.connections.clone(), instance_id, 1).await;
        assert!(services.instance(instance_id).await.is_none());
        assert_eq!(heartbeats.len().await, 0);
    }

    #[tokio::test]
    async fn test_close_does_not_unregister() {
        let services = Arc::new(Services::new());
        let instance = RegisteredInstance::new(
            ServiceId::parse("grp/svc/1.0").unwrap(),
            Uuid::new_v4(),
            "http://127.0.0.1:1",
        );
        let instance_id = instance.instance_id;
        services.register(instance).await;

        let heartbeats = InstanceHeartbeats::new(services.clone(), config(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        heartbeats.open(instance_id).await.unwrap();
        heartbeats.close(instance_id).await;

        sleep(Duration::from_millis(300)).await;
        assert!(services.instance(instance_id).await.is_some());
        assert_eq!(heartbeats.len().await, 0);
    }
}
