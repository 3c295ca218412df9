use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use star_dispatcher::PublishReport;

use crate::{error::ApiResult, routes::AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishParams {
    pub class_name: String,
    #[serde(default)]
    pub local_star_only: bool,
}

/// 发布MiniBus消息，请求体原样投递给每个实例
pub async fn publish(
    State(state): State<AppState>,
    Query(params): Query<PublishParams>,
    body: String,
) -> ApiResult<Json<PublishReport>> {
    let report = state
        .minibus
        .publish(&body, &params.class_name, params.local_star_only)
        .await?;
    Ok(Json(report))
}
