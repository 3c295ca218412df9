use axum::{extract::State, response::IntoResponse, Json};
use serde_json::{json, Value};
use tracing::info;

use star_core::{constants::SYSTEM_NAME, ShutdownReason};

use crate::{error::ApiResult, routes::AppState};

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": SYSTEM_NAME,
        "serviceId": state.identity.service_id.to_string(),
        "star": state.identity.star_name,
        "instances": state.registry.len().await,
    }))
}

/// 返回Dispatcher的服务标识，例如 `"main/dispatcher/1.0.0"`
pub async fn version(State(state): State<AppState>) -> Json<String> {
    Json(state.identity.service_id.to_string())
}

/// 请求本进程停止；响应先于监听端口关闭返回
pub async fn stop(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    info!("收到停止请求");
    state.shutdown.shutdown(ShutdownReason::StopRequested).await;
    Ok(Json(json!({ "stopping": true })))
}

pub async fn list_stars(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.stars().stars().await))
}
