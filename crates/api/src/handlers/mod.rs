pub mod minibus;
pub mod relay;
pub mod services;
pub mod system;
