//! # 数据模型
//!
//! 定义Dispatcher控制面的核心数据结构：服务标识、注册实例、中继请求/响应、
//! 用户令牌和star描述。所有模型都实现了序列化和反序列化，JSON字段统一使用camelCase。
//!
//! ## 核心模型
//!
//! - [`ServiceId`] - `group/name/version` 服务标识，按版本全序比较
//! - [`RegisteredInstance`] - 注册中心里的一个服务实例
//! - [`RelayRequest`] / [`RelayResponse`] - 中继请求与按star拆分的结果
//! - [`UserToken`] - 终端用户或服务间调用的身份
//! - [`StarInfo`] - 联邦中的一个star
//!
//! ## 示例
//!
//! ```rust
//! use star_core::models::{RelayMethod, RelayRequest, ServiceId};
//!
//! let id = ServiceId::parse("grp/svc/2.0").unwrap();
//! assert!(id.is_newer_than(&ServiceId::parse("grp/svc/1.0").unwrap()));
//!
//! let request = RelayRequest::builder("svc")
//!     .method(RelayMethod::Post)
//!     .service_path("/orders")
//!     .payload(r#"{"id":1}"#)
//!     .build()
//!     .unwrap();
//! assert!(request.include_local_star());
//! ```

pub mod instance;
pub mod relay;
pub mod service_id;
pub mod star;
pub mod user_token;

pub use instance::*;
pub use relay::*;
pub use service_id::*;
pub use star::*;
pub use user_token::*;
