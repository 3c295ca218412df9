use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::Query,
    http::{HeaderMap, Method, StatusCode, Uri},
    routing::any,
    Json, Router,
};
use serde_json::json;

use star_core::{config::StarEntryConfig, constants::HEADER_CLUSTER_UUID, models::ServiceId};

use crate::identity::DispatcherIdentity;
use crate::registry::{ServiceRegistry, Services};
use crate::relay::RelayRouter;
use crate::stars::StarsManager;
use crate::token::TokenService;

pub const TEST_SECRET: &str = "secret";

/// 在随机端口上启动一个axum服务
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// 一个当前没有进程监听的本地地址
pub fn unused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// 回显请求的假服务：`/raw` 原样返回请求体，其余路径返回请求摘要
pub fn echo_service(tag: &'static str) -> Router {
    Router::new()
        .route("/raw", any(|body: Bytes| async move { body }))
        .fallback(
            move |method: Method,
                  uri: Uri,
                  Query(query): Query<HashMap<String, String>>,
                  headers: HeaderMap,
                  body: String| async move {
                let header = |name: &str| {
                    headers
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string()
                };
                Json(json!({
                    "tag": tag,
                    "method": method.as_str(),
                    "path": uri.path(),
                    "query": query,
                    "body": body,
                    "clusterUuid": header(HEADER_CLUSTER_UUID),
                    "authorization": header("authorization"),
                }))
            },
        )
}

pub fn failing_service() -> Router {
    Router::new().fallback(|| async { StatusCode::INTERNAL_SERVER_ERROR })
}

pub fn test_identity(gateway_url: &str) -> Arc<DispatcherIdentity> {
    Arc::new(DispatcherIdentity::new(
        ServiceId::parse("main/dispatcher/1.0").unwrap(),
        "home",
        gateway_url,
        TEST_SECRET,
    ))
}

pub fn test_router_with_gateway(
    services: Arc<Services>,
    remotes: &[(&str, String)],
    gateway_url: &str,
) -> RelayRouter {
    let entries: Vec<StarEntryConfig> = remotes
        .iter()
        .map(|(name, url)| StarEntryConfig {
            name: name.to_string(),
            url: url.clone(),
        })
        .collect();
    let stars = Arc::new(StarsManager::new("home", gateway_url, &entries));
    let registry: Arc<dyn ServiceRegistry> = services;

    RelayRouter::new(
        registry,
        stars,
        test_identity(gateway_url),
        Arc::new(TokenService::new(TEST_SECRET, 1)),
        Duration::from_secs(2),
    )
    .unwrap()
}

pub fn test_router(services: Arc<Services>, remotes: &[(&str, String)]) -> RelayRouter {
    test_router_with_gateway(services, remotes, "http://127.0.0.1:1")
}
