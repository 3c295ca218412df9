pub mod app_config;
pub mod dispatcher_star;
pub mod network;
pub mod observability;

pub use app_config::AppConfig;
pub use dispatcher_star::{DispatcherConfig, StarEntryConfig};
pub use network::{HeartbeatConfig, RelayConfig, TakeoverConfig};
pub use observability::{LoggingConfig, TokenConfig};
