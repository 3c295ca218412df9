//! Star Dispatcher进程的组合根
//!
//! [`app::Application`] 负责端口接管、组装注册中心与中继组件，并运行HTTP服务。

pub mod app;
