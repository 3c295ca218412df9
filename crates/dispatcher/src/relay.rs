use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use futures::future::join_all;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info, warn};

use star_core::{
    constants::{
        HEADER_CLUSTER_UUID, HEADER_SERVICE_ID, HEADER_STAR_GATEWAY, HEADER_STAR_NAME,
        HEADER_STAR_TARGET,
    },
    models::{
        RegisteredInstance, RelayRequest, RelayResponse, StarInfo, UserToken, DISPATCHER_SERVICE,
        LOCAL_STAR, STATUS_NOT_FOUND,
    },
    StarError, StarResult,
};

use crate::identity::DispatcherIdentity;
use crate::registry::ServiceRegistry;
use crate::stars::StarsManager;
use crate::token::TokenService;

#[derive(Debug, Clone)]
enum RelayTarget {
    Local,
    Remote(StarInfo),
}

/// 中继路由
///
/// 把一个逻辑上的“调用服务X”请求翻译成对本地实例和远程star的HTTP调用，
/// 并发执行后按目标合并结果。单个目标失败只体现为该目标的响应状态。
pub struct RelayRouter {
    registry: Arc<dyn ServiceRegistry>,
    stars: Arc<StarsManager>,
    identity: Arc<DispatcherIdentity>,
    tokens: Arc<TokenService>,
    http_client: reqwest::Client,
}

impl RelayRouter {
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        stars: Arc<StarsManager>,
        identity: Arc<DispatcherIdentity>,
        tokens: Arc<TokenService>,
        timeout: Duration,
    ) -> StarResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StarError::Internal(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            registry,
            stars,
            identity,
            tokens,
            http_client,
        })
    }

    pub fn stars(&self) -> &Arc<StarsManager> {
        &self.stars
    }

    /// 中继到所有目标star，每个目标恰好产生一个响应
    pub async fn relay(&self, request: &RelayRequest) -> StarResult<Vec<RelayResponse<String>>> {
        request.validate()?;
        let targets = self.targets(request).await?;
        debug!(
            "中继 {} {} 到 {} 个目标",
            request.method(),
            request.service_name(),
            targets.len()
        );

        let calls = targets
            .into_iter()
            .map(|target| self.call_target(request, target));
        Ok(join_all(calls).await)
    }

    /// 只取第一个目标的结果
    pub async fn relay_single(&self, request: &RelayRequest) -> StarResult<RelayResponse<String>> {
        request.validate()?;
        let target = self
            .targets(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StarError::not_found(format!("没有可中继的目标: {}", request.service_name())))?;

        match target {
            RelayTarget::Local => match self.call_local(request).await {
                Ok(response) => Ok(response),
                Err(e @ StarError::NotFound(_)) => Err(e),
                Err(e) => {
                    warn!("本地中继失败: {}", e);
                    Ok(self.local_failure(&e))
                }
            },
            remote => Ok(self.call_target(request, remote).await),
        }
    }

    async fn targets(&self, request: &RelayRequest) -> StarResult<Vec<RelayTarget>> {
        if let Some(star) = request.star() {
            if self.stars.is_local(star) {
                return Ok(vec![RelayTarget::Local]);
            }
            return match self.stars.remote(star).await {
                Some(info) => Ok(vec![RelayTarget::Remote(info)]),
                None => Err(StarError::not_found(format!("未知的star: {star}"))),
            };
        }

        let mut targets = Vec::new();
        if request.include_local_star() {
            targets.push(RelayTarget::Local);
        }
        targets.extend(self.stars.remotes().await.into_iter().map(RelayTarget::Remote));
        Ok(targets)
    }

    async fn call_target(&self, request: &RelayRequest, target: RelayTarget) -> RelayResponse<String> {
        match target {
            RelayTarget::Local => match self.call_local(request).await {
                Ok(response) => response,
                Err(e) => {
                    debug!("本地中继失败: {}", e);
                    self.local_failure(&e)
                }
            },
            RelayTarget::Remote(star) => match self.call_remote(request, &star).await {
                Ok(response) => {
                    self.stars.set_active(&star.name, true).await;
                    response
                }
                Err(e) => {
                    warn!("中继到star {} 失败: {}", star.name, e);
                    self.stars.set_active(&star.name, false).await;
                    RelayResponse::unavailable(star.name, star.url)
                }
            },
        }
    }

    fn local_failure(&self, error: &StarError) -> RelayResponse<String> {
        match error {
            StarError::NotFound(_) => {
                RelayResponse::failure(self.stars.local_name(), self.stars.local_url(), STATUS_NOT_FOUND)
            }
            _ => RelayResponse::unavailable(self.stars.local_name(), self.stars.local_url()),
        }
    }

    /// 解析目标实例，`@dispatcher` 指向本Dispatcher自身
    async fn local_endpoint(&self, request: &RelayRequest) -> StarResult<(String, Option<RegisteredInstance>)> {
        if request.service_name() == DISPATCHER_SERVICE {
            return Ok((self.identity.gateway_url.clone(), None));
        }

        let resolved = self.registry.resolve(request.service_name()).await?;
        let instance = resolved
            .first()
            .cloned()
            .ok_or_else(|| StarError::not_found(format!("没有可用的服务实例: {}", resolved.id)))?;
        Ok((instance.base_url.clone(), Some(instance)))
    }

    async fn call_local(&self, request: &RelayRequest) -> StarResult<RelayResponse<String>> {
        let (base_url, instance) = self.local_endpoint(request).await?;
        let url = join_url(&base_url, request.service_path());

        let method = reqwest::Method::from_bytes(request.method().as_str().as_bytes())
            .map_err(|e| StarError::illegal_input(format!("无效的HTTP方法: {e}")))?;
        let bearer = match request.user_token() {
            Some(token) => token.to_string(),
            None => self.tokens.issue(&UserToken::service())?,
        };

        let mut builder = self
            .http_client
            .request(method, &url)
            .query(request.params())
            .bearer_auth(bearer)
            .header(HEADER_CLUSTER_UUID, &self.identity.cluster_secret)
            .header(HEADER_STAR_NAME, self.stars.local_name())
            .header(HEADER_STAR_GATEWAY, &self.identity.gateway_url)
            .header(HEADER_SERVICE_ID, self.identity.service_id.to_string());

        if let Some(body) = request.payload_bytes()? {
            let content_type = if request.is_binary() {
                "application/octet-stream"
            } else {
                "application/json"
            };
            builder = builder.header(CONTENT_TYPE, content_type).body(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                if e.is_connect() {
                    if let Some(instance) = &instance {
                        info!(
                            "实例 {} ({}) 拒绝连接，从注册中心移除",
                            instance.id, instance.instance_id
                        );
                        self.registry.unregister(instance.instance_id).await;
                    }
                }
                return Err(StarError::ServiceUnavailable(format!("调用 {url} 失败: {e}")));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(StarError::ServiceUnavailable(format!(
                "调用 {url} 返回 HTTP {status}"
            )));
        }

        let content = if request.is_binary() {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| StarError::Network(format!("读取 {url} 响应失败: {e}")))?;
            general_purpose::STANDARD.encode(bytes)
        } else {
            response
                .text()
                .await
                .map_err(|e| StarError::Network(format!("读取 {url} 响应失败: {e}")))?
        };

        RelayResponse::builder()
            .star_name(self.stars.local_name())
            .star_url(self.stars.local_url())
            .status(status.as_u16())
            .content(content)
            .build()
    }

    /// 转发到远程star的 `/relay`
    ///
    /// 对端按 `@local` 处理，不会继续扇出。对端自称的star名可能与本地配置不同，
    /// 结果统一按本地配置的名称和地址标记。
    async fn call_remote(&self, request: &RelayRequest, star: &StarInfo) -> StarResult<RelayResponse<String>> {
        let url = format!("{}/relay", star.url);
        let forwarded = request.pinned_to(LOCAL_STAR);

        let response = self
            .http_client
            .post(&url)
            .json(&forwarded)
            .header(HEADER_CLUSTER_UUID, &self.identity.cluster_secret)
            .header(HEADER_STAR_TARGET, &star.name)
            .header(HEADER_STAR_NAME, self.stars.local_name())
            .header(HEADER_STAR_GATEWAY, &self.identity.gateway_url)
            .send()
            .await
            .map_err(|e| StarError::ServiceUnavailable(format!("连接star {} 失败: {e}", star.name)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StarError::ServiceUnavailable(format!(
                "star {} 返回 HTTP {status}",
                star.name
            )));
        }

        let mut responses: Vec<RelayResponse<String>> = response
            .json()
            .await
            .map_err(|e| StarError::Serialization(format!("解析star {} 的响应失败: {e}", star.name)))?;

        if responses.is_empty() {
            return Err(StarError::ServiceUnavailable(format!(
                "star {} 没有返回任何结果",
                star.name
            )));
        }
        Ok(responses.swap_remove(0).with_star(&star.name, &star.url))
    }
}

fn join_url(base_url: &str, path: Option<&str>) -> String {
    match path.map(str::trim).filter(|p| !p.is_empty()) {
        Some(path) if path.starts_with('/') => format!("{base_url}{path}"),
        Some(path) => format!("{base_url}/{path}"),
        None => base_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Services;
    use crate::test_utils::{echo_service, failing_service, spawn_server, test_router, unused_addr};
    use star_core::models::{RelayMethod, ServiceId, STATUS_SERVICE_UNAVAILABLE};
    use uuid::Uuid;

    async fn register(services: &Services, id: &str, base_url: String) -> Uuid {
        let instance = RegisteredInstance::new(ServiceId::parse(id).unwrap(), Uuid::new_v4(), base_url);
        let uuid = instance.instance_id;
        services.register(instance).await;
        uuid
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://h:1", Some("/a")), "http://h:1/a");
        assert_eq!(join_url("http://h:1", Some("a")), "http://h:1/a");
        assert_eq!(join_url("http://h:1", None), "http://h:1");
        assert_eq!(join_url("http://h:1", Some("  ")), "http://h:1");
    }

    #[tokio::test]
    async fn test_local_relay_hits_latest_version() {
        let v1 = spawn_server(echo_service("v1")).await;
        let v2 = spawn_server(echo_service("v2")).await;

        let services = Arc::new(Services::new());
        register(&services, "grp/svc/1.0", format!("http://{v1}")).await;
        register(&services, "grp/svc/2.0", format!("http://{v2}")).await;

        let router = test_router(services.clone(), &[]);
        let request = RelayRequest::builder("svc")
            .method(RelayMethod::Post)
            .service_path("/echo")
            .payload(r#"{"n":1}"#)
            .param("q", "7")
            .build()
            .unwrap();

        let responses = router.relay(&request).await.unwrap();
        assert_eq!(responses.len(), 1);
        let response = &responses[0];
        assert_eq!(response.status(), 200);
        assert_eq!(response.star_name(), "home");

        let body: serde_json::Value = serde_json::from_str(response.content().unwrap()).unwrap();
        assert_eq!(body["tag"], "v2");
        assert_eq!(body["method"], "POST");
        assert_eq!(body["query"]["q"], "7");
        assert_eq!(body["body"], r#"{"n":1}"#);
        assert_eq!(body["clusterUuid"], "secret");
        assert!(body["authorization"].as_str().unwrap().starts_with("Bearer "));
    }

    #[tokio::test]
    async fn test_fan_out_returns_one_response_per_star() {
        let local = spawn_server(echo_service("local")).await;
        let services = Arc::new(Services::new());
        register(&services, "grp/svc/1.0", format!("http://{local}")).await;

        // 远程star不可达
        let remote = unused_addr();
        let router = test_router(services, &[("eu", format!("http://{remote}"))]);

        let request = RelayRequest::builder("svc").service_path("/echo").build().unwrap();
        let responses = router.relay(&request).await.unwrap();

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].star_name(), "home");
        assert_eq!(responses[0].status(), 200);
        assert_eq!(responses[1].star_name(), "eu");
        assert_eq!(responses[1].status(), STATUS_SERVICE_UNAVAILABLE);
        assert!(responses[1].content().is_none());
        assert!(!router.stars().remote("eu").await.unwrap().is_active);
    }

    /// 远程Dispatcher：只在请求按 `@local` 转发时才在本地应答
    fn remote_dispatcher(own_name: &'static str) -> axum::Router {
        axum::Router::new().route(
            "/relay",
            axum::routing::post(move |axum::Json(request): axum::Json<RelayRequest>| async move {
                let status = if request.is_local_only() { 200 } else { STATUS_SERVICE_UNAVAILABLE };
                let response = RelayResponse::builder()
                    .star_name(own_name)
                    .star_url("http://west.internal")
                    .status(status)
                    .content(format!("{{\"service\":\"{}\"}}", request.service_name()))
                    .build()
                    .unwrap();
                axum::Json(vec![response])
            }),
        )
    }

    #[tokio::test]
    async fn test_remote_star_answers_under_configured_name() {
        let remote = spawn_server(remote_dispatcher("west-host-01")).await;
        let remote_url = format!("http://{remote}");
        let router = test_router(Arc::new(Services::new()), &[("west", remote_url.clone())]);

        let request = RelayRequest::builder("svc")
            .include_local_star(false)
            .build()
            .unwrap();
        let responses = router.relay(&request).await.unwrap();

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status(), 200);
        assert_eq!(responses[0].star_name(), "west");
        assert_eq!(responses[0].star_url(), remote_url);
        assert_eq!(responses[0].content().unwrap(), r#"{"service":"svc"}"#);
        assert!(router.stars().remote("west").await.unwrap().is_active);

        let pinned = RelayRequest::builder("svc").star("west").build().unwrap();
        let single = router.relay_single(&pinned).await.unwrap();
        assert_eq!(single.status(), 200);
        assert_eq!(single.star_name(), "west");
    }

    #[tokio::test]
    async fn test_blank_request_is_illegal_input() {
        let router = test_router(Arc::new(Services::new()), &[]);
        let blank: RelayRequest = serde_json::from_str(r#"{"serviceName":""}"#).unwrap();

        assert!(matches!(router.relay(&blank).await, Err(StarError::IllegalInput(_))));
        assert!(matches!(
            router.relay_single(&blank).await,
            Err(StarError::IllegalInput(_))
        ));
    }

    #[tokio::test]
    async fn test_failing_target_yields_unavailable() {
        let broken = spawn_server(failing_service()).await;
        let services = Arc::new(Services::new());
        register(&services, "grp/svc/1.0", format!("http://{broken}")).await;

        let router = test_router(services, &[]);
        let request = RelayRequest::builder("svc").service_path("/echo").build().unwrap();

        let responses = router.relay(&request).await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status(), STATUS_SERVICE_UNAVAILABLE);
        assert!(responses[0].content().is_none());
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let router = test_router(Arc::new(Services::new()), &[]);
        let request = RelayRequest::builder("missing").build().unwrap();

        let responses = router.relay(&request).await.unwrap();
        assert_eq!(responses[0].status(), STATUS_NOT_FOUND);

        assert!(matches!(
            router.relay_single(&request).await,
            Err(StarError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_prunes_instance() {
        let services = Arc::new(Services::new());
        let uuid = register(&services, "grp/svc/1.0", format!("http://{}", unused_addr())).await;

        let router = test_router(services.clone(), &[]);
        let request = RelayRequest::builder("svc").local_only().build().unwrap();

        let response = router.relay_single(&request).await.unwrap();
        assert_eq!(response.status(), STATUS_SERVICE_UNAVAILABLE);
        assert!(services.instance(uuid).await.is_none());
    }

    #[tokio::test]
    async fn test_exclude_local_and_unknown_star() {
        let router = test_router(Arc::new(Services::new()), &[]);

        let request = RelayRequest::builder("svc")
            .include_local_star(false)
            .build()
            .unwrap();
        assert!(router.relay(&request).await.unwrap().is_empty());

        let pinned = RelayRequest::builder("svc").star("nowhere").build().unwrap();
        assert!(matches!(router.relay(&pinned).await, Err(StarError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_binary_payload_roundtrip() {
        let echo = spawn_server(echo_service("bin")).await;
        let services = Arc::new(Services::new());
        register(&services, "grp/blob/1.0", format!("http://{echo}")).await;

        let router = test_router(services, &[]);
        let request = RelayRequest::builder("blob")
            .method(RelayMethod::Put)
            .service_path("/raw")
            .binary_payload(&[0, 1, 2, 255])
            .build()
            .unwrap();

        let response = router.relay_single(&request).await.unwrap();
        let bytes = general_purpose::STANDARD
            .decode(response.content().unwrap())
            .unwrap();
        assert_eq!(bytes, vec![0, 1, 2, 255]);
    }
}
