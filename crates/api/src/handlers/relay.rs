use axum::{
    extract::{Extension, State},
    http::HeaderMap,
    Json,
};
use tracing::{debug, warn};

use star_core::models::{RelayRequest, RelayResponse, UserToken, DISPATCHER_SERVICE};

use crate::{
    error::{ApiError, ApiResult},
    middleware::bearer_token,
    routes::AppState,
};

/// `@dispatcher` 会以集群密钥调用Dispatcher自身，只对持有集群密钥的调用方开放
fn authorize_target(request: &RelayRequest, caller: &UserToken) -> ApiResult<()> {
    if request.service_name() == DISPATCHER_SERVICE && !caller.is_service() {
        warn!("拒绝 {} 中继到 {}", caller.name, DISPATCHER_SERVICE);
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

/// 终端用户的令牌随请求一起转发给目标服务；服务间调用由Dispatcher签发令牌
fn with_caller_token(request: RelayRequest, caller: &UserToken, headers: &HeaderMap) -> RelayRequest {
    if request.user_token().is_some() || caller.is_service() || caller.is_guest() {
        return request;
    }
    request.with_user_token(bearer_token(headers).map(str::to_string))
}

/// 中继到所有匹配的star，每个star一条结果
pub async fn relay(
    State(state): State<AppState>,
    Extension(caller): Extension<UserToken>,
    headers: HeaderMap,
    Json(request): Json<RelayRequest>,
) -> ApiResult<Json<Vec<RelayResponse<String>>>> {
    debug!(
        "中继请求: {} {} -> {}",
        request.method(),
        request.service_path().unwrap_or("/"),
        request.service_name()
    );

    authorize_target(&request, &caller)?;
    let request = with_caller_token(request, &caller, &headers);
    let responses = state.router.relay(&request).await?;
    Ok(Json(responses))
}

/// 中继到单个目标
pub async fn relay_single(
    State(state): State<AppState>,
    Extension(caller): Extension<UserToken>,
    headers: HeaderMap,
    Json(request): Json<RelayRequest>,
) -> ApiResult<Json<RelayResponse<String>>> {
    authorize_target(&request, &caller)?;
    let request = with_caller_token(request, &caller, &headers);
    let response = state.router.relay_single(&request).await?;
    Ok(Json(response))
}
