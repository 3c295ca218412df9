use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::IpAddr;
use std::sync::Arc;

use star_core::{models::Role, AppConfig, ShutdownManager, StarResult};
use star_dispatcher::{
    DispatcherIdentity, InstanceHeartbeats, MiniBus, RelayRouter, ServiceRegistry, Services,
    StarsManager, TokenService,
};

use crate::handlers::{
    minibus::publish,
    relay::{relay, relay_single},
    services::{about_to_restart, is_alive, list_services, register, unregister},
    system::{health_check, list_stars, stop, version},
};
use crate::middleware::require_roles;

const SERVICE_ROLES: &[Role] = &[Role::Service, Role::Admin];
const CALLER_ROLES: &[Role] = &[Role::User, Role::Service, Role::Admin];

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Services>,
    pub router: Arc<RelayRouter>,
    pub minibus: Arc<MiniBus>,
    pub heartbeats: Arc<InstanceHeartbeats>,
    pub identity: Arc<DispatcherIdentity>,
    pub tokens: Arc<TokenService>,
    pub shutdown: ShutdownManager,
}

impl AppState {
    /// 组装Dispatcher的各个组件，存活连接监听在 `heartbeat_ip` 上
    pub fn new(
        identity: Arc<DispatcherIdentity>,
        stars: Arc<StarsManager>,
        config: &AppConfig,
        heartbeat_ip: IpAddr,
        shutdown: ShutdownManager,
    ) -> StarResult<Self> {
        let registry = Arc::new(Services::new());
        let dyn_registry: Arc<dyn ServiceRegistry> = registry.clone();

        // 未单独配置令牌密钥时使用集群密钥签名
        let token_secret = config
            .token
            .secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .unwrap_or(&identity.cluster_secret);
        let tokens = Arc::new(TokenService::new(token_secret, config.token.expiration_hours));

        let router = Arc::new(RelayRouter::new(
            dyn_registry.clone(),
            stars,
            identity.clone(),
            tokens.clone(),
            config.relay.timeout(),
        )?);
        let minibus = Arc::new(MiniBus::new(
            router.clone(),
            dyn_registry.clone(),
            identity.clone(),
            config.relay.timeout(),
        )?);
        let heartbeats = Arc::new(InstanceHeartbeats::new(
            dyn_registry,
            config.heartbeat.clone(),
            heartbeat_ip,
        ));

        Ok(Self {
            registry,
            router,
            minibus,
            heartbeats,
            identity,
            tokens,
            shutdown,
        })
    }

    pub fn stars(&self) -> &Arc<StarsManager> {
        self.router.stars()
    }
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    // 服务生命周期与控制接口，只接受集群密钥
    let control = Router::new()
        .route("/service/register", post(register))
        .route("/service/unregister", post(unregister))
        .route("/service/about-to-restart", post(about_to_restart))
        .route("/service/is-alive", post(is_alive))
        .route("/services", get(list_services))
        .route("/minibus/publish", post(publish))
        .route("/stop", post(stop))
        .route_layer(middleware::from_fn_with_state(SERVICE_ROLES, require_roles));

    // 中继接口，终端用户与服务均可调用
    let relaying = Router::new()
        .route("/relay", post(relay))
        .route("/relay-single", post(relay_single))
        .route_layer(middleware::from_fn_with_state(CALLER_ROLES, require_roles));

    Router::new()
        .route("/health", get(health_check))
        .route("/version", get(version))
        .route("/stars", get(list_stars))
        .merge(control)
        .merge(relaying)
        .with_state(state)
}
