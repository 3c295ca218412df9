use serde::{Deserialize, Serialize};

/// 已知的star（一个Dispatcher及其注册的服务）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarInfo {
    pub name: String,
    pub url: String,
    pub is_active: bool,
    pub is_local: bool,
}
