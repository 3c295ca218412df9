use serde::{Deserialize, Serialize};

use crate::constants::SYSTEM_VERSION;
use crate::errors::StarResult;
use crate::models::{ServiceId, DEFAULT_GROUP};

fn default_service_id() -> String {
    format!("{DEFAULT_GROUP}/dispatcher/{SYSTEM_VERSION}")
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// 本进程的服务标识，接管协议按它的版本决定谁让出端口
    pub service_id: String,
    /// 本地star名称，为空时使用主机名
    pub star_name: String,
    /// 对外地址，同时决定监听端口
    pub url: Option<String>,
    pub port: Option<u16>,
    pub bind_host: String,
    /// 集群共享密钥，为空时启动时随机生成（仅适合单star）
    pub cluster_secret: String,
    /// 成功绑定后记录端口的文件
    pub port_file: Option<String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            service_id: default_service_id(),
            star_name: String::new(),
            url: None,
            port: None,
            bind_host: default_bind_host(),
            cluster_secret: String::new(),
            port_file: None,
        }
    }
}

impl DispatcherConfig {
    pub fn parsed_service_id(&self) -> StarResult<ServiceId> {
        ServiceId::parse(&self.service_id)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.parsed_service_id()
            .map_err(|e| anyhow::anyhow!("Dispatcher服务标识无效: {e}"))?;

        if let Some(url) = &self.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(anyhow::anyhow!("Dispatcher地址必须以http://或https://开头: {url}"));
            }
        }

        if self.port == Some(0) {
            return Err(anyhow::anyhow!("Dispatcher端口必须大于0"));
        }

        if self.bind_host.trim().is_empty() {
            return Err(anyhow::anyhow!("监听地址不能为空"));
        }

        Ok(())
    }
}

/// 联邦中的远程star
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarEntryConfig {
    pub name: String,
    pub url: String,
}

impl StarEntryConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow::anyhow!("star名称不能为空"));
        }
        if self.name.starts_with('@') {
            return Err(anyhow::anyhow!("star名称不能以@开头: {}", self.name));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(anyhow::anyhow!(
                "star {} 的地址必须以http://或https://开头: {}",
                self.name,
                self.url
            ));
        }
        Ok(())
    }
}
