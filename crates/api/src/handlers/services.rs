use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::{Extensions, HeaderMap},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::{info, warn};

use star_core::constants::HEADER_SERVICE_UUID;
use star_core::models::{InstanceRequest, ServiceRegistrationRequest, ServiceRegistrationResponse};
use star_dispatcher::ServiceRegistry;

use crate::{
    error::{ApiError, ApiResult},
    routes::AppState,
};

const FALLBACK_REMOTE_HOST: &str = "127.0.0.1";

/// 注册服务实例
///
/// 请求没有给出URL时，用调用方地址和监听端口拼出实例的基础URL。
/// 携带 `x-service-uuid` 时必须与请求中的实例ID一致。
pub async fn register(
    State(state): State<AppState>,
    extensions: Extensions,
    headers: HeaderMap,
    Json(request): Json<ServiceRegistrationRequest>,
) -> ApiResult<Json<ServiceRegistrationResponse>> {
    let header_uuid = headers
        .get(HEADER_SERVICE_UUID)
        .and_then(|value| value.to_str().ok());
    if let Some(raw) = header_uuid {
        if raw.parse::<uuid::Uuid>().ok() != Some(request.instance_id) {
            return Err(ApiError::BadRequest(format!(
                "{HEADER_SERVICE_UUID} 与注册请求的instanceId不一致: {raw}"
            )));
        }
    }

    let has_url = request
        .url
        .as_deref()
        .is_some_and(|url| !url.trim().is_empty());
    if !has_url && request.listen_port == 0 {
        return Err(ApiError::BadRequest(
            "注册请求必须提供url或listenPort".to_string(),
        ));
    }

    let remote_host = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| FALLBACK_REMOTE_HOST.to_string());

    let instance = request.into_instance(&remote_host);
    let response = ServiceRegistrationResponse {
        instance_id: instance.instance_id,
        service_id: instance.id.clone(),
        star_name: state.identity.star_name.clone(),
        dispatcher_id: state.identity.service_id.clone(),
        registered_at: chrono::Utc::now(),
    };

    info!(
        "注册服务实例: {} ({}) -> {}",
        instance.id, instance.instance_id, instance.base_url
    );
    if let Some(previous) = state.registry.register(instance).await {
        info!("实例 {} 重新注册，替换 {}", previous.instance_id, previous.id);
    }

    Ok(Json(response))
}

/// 注销服务实例，同时关闭其存活连接
pub async fn unregister(
    State(state): State<AppState>,
    Json(request): Json<InstanceRequest>,
) -> ApiResult<impl IntoResponse> {
    state.heartbeats.close(request.instance_id).await;
    let removed = state.registry.unregister(request.instance_id).await;

    match &removed {
        Some(instance) => info!("注销服务实例: {} ({})", instance.id, instance.instance_id),
        None => warn!("注销未知实例: {}", request.instance_id),
    }

    Ok(Json(json!({
        "instanceId": request.instance_id,
        "removed": removed.is_some(),
    })))
}

/// 实例即将重启，重新注册前不再参与路由
pub async fn about_to_restart(
    State(state): State<AppState>,
    Json(request): Json<InstanceRequest>,
) -> ApiResult<impl IntoResponse> {
    if !state.registry.mark_restarting(request.instance_id).await {
        return Err(ApiError::Star(star_core::StarError::not_found(format!(
            "未注册的实例: {}",
            request.instance_id
        ))));
    }

    info!("实例 {} 即将重启", request.instance_id);
    Ok(Json(json!({ "instanceId": request.instance_id })))
}

/// 为实例打开存活连接，返回实例应连接的端口
pub async fn is_alive(
    State(state): State<AppState>,
    Json(request): Json<InstanceRequest>,
) -> ApiResult<impl IntoResponse> {
    let port = state.heartbeats.open(request.instance_id).await?;
    Ok(Json(json!({ "port": port })))
}

/// 注册中心快照，按组、服务名、版本排列
pub async fn list_services(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.registry.snapshot().await))
}
