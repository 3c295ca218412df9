//! # 系统常量定义
//!
//! Dispatcher网格内部调用使用的请求头、默认端口和内部路径

/// 系统名称
pub const SYSTEM_NAME: &str = "star-dispatcher";

/// 系统版本
pub const SYSTEM_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 未配置端口时使用的默认端口
pub const DEFAULT_DISPATCHER_PORT: u16 = 8080;

/// 集群共享密钥，证明调用方是可信的网格成员
pub const HEADER_CLUSTER_UUID: &str = "x-cluster-uuid";
/// 调用方实例ID
pub const HEADER_SERVICE_UUID: &str = "x-service-uuid";
/// 调用方服务标识
pub const HEADER_SERVICE_ID: &str = "x-service-id";
/// 发起方star名称
pub const HEADER_STAR_NAME: &str = "x-star-name";
/// 发起方Dispatcher地址
pub const HEADER_STAR_GATEWAY: &str = "x-star-gateway";
/// 跨star转发时的目标star
pub const HEADER_STAR_TARGET: &str = "x-star-target";

/// 服务接收MiniBus消息的路径
pub const MINIBUS_EVENT_PATH: &str = "/minibus/event";
/// Dispatcher接收MiniBus发布请求的路径
pub const MINIBUS_PUBLISH_PATH: &str = "/minibus/publish";
