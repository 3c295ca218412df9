use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ServiceId;

/// 已注册的服务实例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredInstance {
    pub id: ServiceId,
    pub instance_id: Uuid,
    pub base_url: String,
    pub start_time: DateTime<Utc>,
    /// 实例已通知即将重启，解析时跳过
    #[serde(default)]
    pub restarting: bool,
}

impl RegisteredInstance {
    pub fn new(id: ServiceId, instance_id: Uuid, base_url: impl Into<String>) -> Self {
        Self {
            id,
            instance_id,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            start_time: Utc::now(),
            restarting: false,
        }
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn is_live(&self) -> bool {
        !self.restarting
    }
}

/// 服务注册请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRegistrationRequest {
    pub id: ServiceId,
    pub instance_id: Uuid,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub listen_port: u16,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "Utc::now")]
    pub start_time: DateTime<Utc>,
}

fn default_protocol() -> String {
    "http".to_string()
}

impl ServiceRegistrationRequest {
    /// 计算实例的基础URL：优先使用显式URL，否则由协议、调用方地址和监听端口拼出
    pub fn base_url(&self, remote_host: &str) -> String {
        match self.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("{}://{}:{}", self.protocol, remote_host, self.listen_port),
        }
    }

    pub fn into_instance(self, remote_host: &str) -> RegisteredInstance {
        let base_url = self.base_url(remote_host);
        RegisteredInstance::new(self.id, self.instance_id, base_url).with_start_time(self.start_time)
    }
}

/// 服务注册响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRegistrationResponse {
    pub instance_id: Uuid,
    pub service_id: ServiceId,
    pub star_name: String,
    pub dispatcher_id: ServiceId,
    pub registered_at: DateTime<Utc>,
}

/// 以实例ID为作用域的生命周期通知（注销、即将重启、心跳连接）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRequest {
    pub instance_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: Option<&str>) -> ServiceRegistrationRequest {
        ServiceRegistrationRequest {
            id: ServiceId::parse("grp/svc/1.0").unwrap(),
            instance_id: Uuid::new_v4(),
            protocol: "http".to_string(),
            listen_port: 9000,
            url: url.map(str::to_string),
            start_time: Utc::now(),
        }
    }

    #[test]
    fn test_base_url_from_remote_host() {
        assert_eq!(request(None).base_url("10.0.0.5"), "http://10.0.0.5:9000");
        assert_eq!(request(Some("  ")).base_url("10.0.0.5"), "http://10.0.0.5:9000");
    }

    #[test]
    fn test_base_url_prefers_explicit_url() {
        let instance = request(Some("http://svc.internal:8081/")).into_instance("10.0.0.5");
        assert_eq!(instance.base_url, "http://svc.internal:8081");
        assert!(instance.is_live());
    }

    #[test]
    fn test_registration_request_json_defaults() {
        let json = serde_json::json!({
            "id": "grp/svc/1.0",
            "instanceId": "6f1c1f52-5f2c-4b8e-9a57-0a7b1d6c9e10",
            "listenPort": 9000
        });
        let request: ServiceRegistrationRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.protocol, "http");
        assert!(request.url.is_none());
        assert_eq!(request.id.name(), "svc");
    }
}
