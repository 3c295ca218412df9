//! # Star API
//!
//! Dispatcher的HTTP接口：服务注册与生命周期通知、中继网关、MiniBus发布、
//! 版本探测和停止控制。
//!
//! ## 端点
//!
//! ### 公开接口
//! - `GET /health` - 健康检查
//! - `GET /version` - 返回Dispatcher的服务标识（端口接管时用于比较版本）
//! - `GET /stars` - 联邦中已知的star
//!
//! ### 服务接口（需要集群密钥）
//! - `POST /service/register` - 注册服务实例
//! - `POST /service/unregister` - 注销服务实例
//! - `POST /service/about-to-restart` - 标记实例即将重启
//! - `POST /service/is-alive` - 为实例打开存活连接，返回端口
//! - `GET /services` - 注册中心快照
//! - `POST /minibus/publish?className=...` - 发布MiniBus消息
//! - `POST /stop` - 请求Dispatcher停止
//!
//! ### 中继接口（集群密钥或用户令牌）
//! - `POST /relay` - 中继到所有匹配的star，返回按star拆分的结果列表
//! - `POST /relay-single` - 中继到单个目标
//!
//! ## 认证
//!
//! 每个请求先经过 [`middleware::resolve_token`]：`x-cluster-uuid` 与集群密钥一致时
//! 调用方为 `SERVICE`，否则校验 `Authorization: Bearer` 令牌，都没有时为 `GUEST`。
//! 受保护的路由再由 [`middleware::require_roles`] 检查角色。
//!
//! ## 使用示例
//!
//! ```bash
//! curl -X POST http://localhost:8080/relay \
//!   -H "Content-Type: application/json" \
//!   -H "x-cluster-uuid: $CLUSTER_SECRET" \
//!   -d '{"serviceName": "orders", "servicePath": "/list"}'
//! ```

use axum::Router;
use tower::ServiceBuilder;

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use routes::AppState;

use crate::middleware::{cors_layer, request_logging, resolve_token, trace_layer};

/// 创建API应用，带上日志、跨域和调用方身份解析中间件
pub fn create_app(state: AppState) -> Router {
    routes::create_routes(state.clone()).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(cors_layer())
            .layer(axum::middleware::from_fn(request_logging))
            .layer(axum::middleware::from_fn_with_state(state, resolve_token)),
    )
}
