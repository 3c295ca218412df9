//! Dispatcher核心组件
//!
//! 服务注册中心、star联邦、中继路由、MiniBus广播、实例存活连接和启动时的端口接管。
//! 各组件由组合根创建并以 `Arc` 共享，不依赖任何全局状态。

pub mod heartbeats;
pub mod identity;
pub mod minibus;
pub mod registry;
pub mod relay;
pub mod stars;
pub mod takeover;
pub mod token;

#[cfg(test)]
pub mod test_utils;

pub use heartbeats::InstanceHeartbeats;
pub use identity::DispatcherIdentity;
pub use minibus::{MiniBus, PublishReport};
pub use registry::{ResolvedService, ServiceRegistry, ServiceVariations, Services};
pub use relay::RelayRouter;
pub use stars::StarsManager;
pub use takeover::{TakeoverController, TakeoverOutcome};
pub use token::TokenService;
