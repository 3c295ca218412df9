use star_core::models::ServiceId;

/// 本Dispatcher在网格中的身份
#[derive(Debug, Clone)]
pub struct DispatcherIdentity {
    pub service_id: ServiceId,
    pub star_name: String,
    /// 其他进程访问本Dispatcher的地址，不含结尾的 `/`
    pub gateway_url: String,
    pub cluster_secret: String,
}

impl DispatcherIdentity {
    pub fn new(
        service_id: ServiceId,
        star_name: impl Into<String>,
        gateway_url: impl Into<String>,
        cluster_secret: impl Into<String>,
    ) -> Self {
        Self {
            service_id,
            star_name: star_name.into(),
            gateway_url: gateway_url.into().trim_end_matches('/').to_string(),
            cluster_secret: cluster_secret.into(),
        }
    }

    /// 校验请求携带的集群密钥
    pub fn is_cluster_secret(&self, candidate: &str) -> bool {
        !self.cluster_secret.is_empty() && candidate == self.cluster_secret
    }
}
