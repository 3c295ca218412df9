use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info};

use star_core::{
    constants::HEADER_CLUSTER_UUID,
    models::{Role, UserToken},
};

use crate::error::ApiError;
use crate::routes::AppState;

pub const BEARER_PREFIX: &str = "Bearer ";

pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    debug!("开始处理请求: {} {}", method, uri);

    let response = next.run(request).await;
    let duration = start.elapsed();

    info!(
        "完成请求处理: {} {} - 状态: {} - 耗时: {:?}",
        method,
        uri,
        response.status(),
        duration
    );

    response
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}

pub fn trace_layer(
) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>
{
    TraceLayer::new_for_http()
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// 确定调用方身份并放入请求扩展
///
/// 集群密钥匹配时为 `SERVICE`，否则校验 Bearer 令牌，都没有时为 `GUEST`。
/// 携带了无效令牌的请求直接拒绝。
pub async fn resolve_token(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers();

    let cluster_secret = headers
        .get(HEADER_CLUSTER_UUID)
        .and_then(|value| value.to_str().ok());

    let token = match (cluster_secret, bearer_token(headers)) {
        (Some(secret), _) if state.identity.is_cluster_secret(secret) => UserToken::service(),
        (_, Some(raw)) => state
            .tokens
            .verify(raw)
            .map_err(|e| ApiError::Unauthorized(e.to_string()))?,
        _ => UserToken::guest(),
    };

    request.extensions_mut().insert(token);
    Ok(next.run(request).await)
}

/// 要求调用方至少具有其中一个角色
pub async fn require_roles(
    State(roles): State<&'static [Role]>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .extensions()
        .get::<UserToken>()
        .cloned()
        .unwrap_or_else(UserToken::guest);

    if token.has_any_role(roles) {
        return Ok(next.run(request).await);
    }

    if token.is_guest() {
        Err(ApiError::Unauthorized("缺少集群密钥或用户令牌".to_string()))
    } else {
        debug!("用户 {} 缺少所需角色 {:?}", token.name, roles);
        Err(ApiError::Forbidden)
    }
}
