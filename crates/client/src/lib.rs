//! 服务端使用的Dispatcher客户端
//!
//! 服务进程通过它注册自己、发送生命周期通知、经Dispatcher中继请求，
//! 并挂上一条存活连接，让Dispatcher在进程消失时自动注销。

use std::net::SocketAddr;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use star_core::{
    config::HeartbeatConfig,
    constants::{HEADER_CLUSTER_UUID, HEADER_SERVICE_UUID},
    models::{
        InstanceRequest, RelayRequest, RelayResponse, ServiceId, ServiceRegistrationRequest,
        ServiceRegistrationResponse,
    },
    IsAliveConnection, StarError, StarResult,
};

#[derive(Debug, Deserialize)]
struct IsAlivePort {
    port: u16,
}

pub struct DispatcherClient {
    dispatcher_url: String,
    cluster_secret: String,
    http_client: reqwest::Client,
}

impl DispatcherClient {
    pub fn new(
        dispatcher_url: impl Into<String>,
        cluster_secret: impl Into<String>,
        timeout: Duration,
    ) -> StarResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StarError::Internal(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            dispatcher_url: dispatcher_url.into().trim_end_matches('/').to_string(),
            cluster_secret: cluster_secret.into(),
            http_client,
        })
    }

    pub fn dispatcher_url(&self) -> &str {
        &self.dispatcher_url
    }

    pub async fn register(
        &self,
        request: &ServiceRegistrationRequest,
    ) -> StarResult<ServiceRegistrationResponse> {
        let response: ServiceRegistrationResponse = self
            .call(Method::POST, "/service/register", Some(request), Some(request.instance_id))
            .await?;
        info!(
            "已在star {} 注册 {} ({})",
            response.star_name, response.service_id, response.instance_id
        );
        Ok(response)
    }

    /// 注销实例；Dispatcher不可达时只记录警告
    pub async fn unregister(&self, instance_id: Uuid) -> StarResult<()> {
        let result: StarResult<Value> = self
            .call(
                Method::POST,
                "/service/unregister",
                Some(&InstanceRequest { instance_id }),
                Some(instance_id),
            )
            .await;
        match result {
            Ok(_) => {
                info!("实例 {} 已注销", instance_id);
                Ok(())
            }
            Err(StarError::Network(e)) => {
                warn!("注销实例 {} 失败: {}", instance_id, e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn about_to_restart(&self, instance_id: Uuid) -> StarResult<()> {
        let _: Value = self
            .call(
                Method::POST,
                "/service/about-to-restart",
                Some(&InstanceRequest { instance_id }),
                Some(instance_id),
            )
            .await?;
        debug!("已通知实例 {} 即将重启", instance_id);
        Ok(())
    }

    pub async fn relay(&self, request: &RelayRequest) -> StarResult<Vec<RelayResponse<String>>> {
        self.call(Method::POST, "/relay", Some(request), None).await
    }

    pub async fn relay_single(&self, request: &RelayRequest) -> StarResult<RelayResponse<String>> {
        self.call(Method::POST, "/relay-single", Some(request), None).await
    }

    /// Dispatcher自身的服务标识
    pub async fn version(&self) -> StarResult<ServiceId> {
        let raw: String = self.call::<(), _>(Method::GET, "/version", None, None).await?;
        ServiceId::parse(&raw)
    }

    /// 请求Dispatcher为实例打开存活连接，并以客户端身份连上去
    ///
    /// 连接丢失（Dispatcher退出）时调用 `on_lost`。返回的连接被丢弃时自动停止。
    pub async fn attach_is_alive<F>(
        &self,
        instance_id: Uuid,
        config: &HeartbeatConfig,
        on_lost: F,
    ) -> StarResult<IsAliveConnection>
    where
        F: FnOnce() + Send + 'static,
    {
        let IsAlivePort { port } = self
            .call(
                Method::POST,
                "/service/is-alive",
                Some(&InstanceRequest { instance_id }),
                Some(instance_id),
            )
            .await?;
        let target = self.resolve_dispatcher_addr(port).await?;

        let connection = IsAliveConnection::client(target, config);
        connection.on_lost_connection(on_lost);
        connection.start().await?;

        debug!("实例 {} 的存活连接已连接 {}", instance_id, target);
        Ok(connection)
    }

    async fn resolve_dispatcher_addr(&self, port: u16) -> StarResult<SocketAddr> {
        let url = reqwest::Url::parse(&self.dispatcher_url)
            .map_err(|e| StarError::illegal_input(format!("无效的Dispatcher地址 {}: {e}", self.dispatcher_url)))?;
        let host = url
            .host_str()
            .ok_or_else(|| StarError::illegal_input(format!("Dispatcher地址缺少主机: {}", self.dispatcher_url)))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        let addr = tokio::net::lookup_host((host.as_str(), port))
            .await?
            .next()
            .ok_or_else(|| StarError::Network(format!("无法解析主机 {host}")));
        addr
    }

    async fn call<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        instance_id: Option<Uuid>,
    ) -> StarResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.dispatcher_url, path);
        let mut builder = self
            .http_client
            .request(method, &url)
            .header(HEADER_CLUSTER_UUID, &self.cluster_secret);
        if let Some(instance_id) = instance_id {
            builder = builder.header(HEADER_SERVICE_UUID, instance_id.to_string());
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| StarError::Network(format!("请求 {url} 失败: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| StarError::Serialization(format!("解析 {url} 的响应失败: {e}")))
    }
}

/// 把Dispatcher的错误响应还原为对应的错误类型
fn status_error(status: StatusCode, body: &str) -> StarError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {status}"));

    match status {
        StatusCode::BAD_REQUEST => StarError::IllegalInput(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StarError::NotAuthorized(message),
        StatusCode::NOT_FOUND => StarError::NotFound(message),
        StatusCode::SERVICE_UNAVAILABLE => StarError::ServiceUnavailable(message),
        _ => StarError::Network(message),
    }
}
