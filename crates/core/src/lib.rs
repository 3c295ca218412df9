pub mod config;
pub mod constants;
pub mod errors;
pub mod is_alive;
pub mod models;
pub mod shutdown;

pub use config::AppConfig;
pub use errors::*;
pub use is_alive::{IsAliveConnection, IsAliveState};
pub use shutdown::{ShutdownManager, ShutdownReason};
