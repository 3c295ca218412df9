use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use star_core::{
    constants::{HEADER_CLUSTER_UUID, HEADER_STAR_NAME, MINIBUS_EVENT_PATH, MINIBUS_PUBLISH_PATH},
    models::{RegisteredInstance, RelayMethod, RelayRequest, DISPATCHER_SERVICE},
    StarError, StarResult,
};

use crate::identity::DispatcherIdentity;
use crate::registry::ServiceRegistry;
use crate::relay::RelayRouter;

/// 一次发布的投递统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    /// 转发到的远程star数
    pub remote_stars: usize,
    pub remote_failures: usize,
    /// 投递到的本地实例数
    pub local_instances: usize,
    pub local_failures: usize,
}

/// MiniBus：向所有已注册服务广播消息
///
/// 每个目标只投递一次，失败不重试，也不影响其他目标。
pub struct MiniBus {
    router: Arc<RelayRouter>,
    registry: Arc<dyn ServiceRegistry>,
    identity: Arc<DispatcherIdentity>,
    http_client: reqwest::Client,
}

impl MiniBus {
    pub fn new(
        router: Arc<RelayRouter>,
        registry: Arc<dyn ServiceRegistry>,
        identity: Arc<DispatcherIdentity>,
        timeout: Duration,
    ) -> StarResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StarError::Internal(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            router,
            registry,
            identity,
            http_client,
        })
    }

    pub async fn publish(
        &self,
        message: &str,
        class_name: &str,
        local_star_only: bool,
    ) -> StarResult<PublishReport> {
        if class_name.trim().is_empty() {
            return Err(StarError::illegal_input("MiniBus消息类型不能为空"));
        }

        let mut report = PublishReport::default();

        if !local_star_only {
            let request = RelayRequest::builder(DISPATCHER_SERVICE)
                .method(RelayMethod::Post)
                .service_path(MINIBUS_PUBLISH_PATH)
                .payload(message)
                .param("className", class_name)
                .param("localStarOnly", "true")
                .include_local_star(false)
                .build()?;

            let responses = self.router.relay(&request).await?;
            report.remote_stars = responses.len();
            report.remote_failures = responses.iter().filter(|r| !r.is_ok()).count();
        }

        let instances = self.registry.all_instances().await;
        report.local_instances = instances.len();
        let deliveries = instances
            .iter()
            .map(|instance| self.deliver(instance, message, class_name));
        report.local_failures = join_all(deliveries)
            .await
            .into_iter()
            .filter(|delivered| !delivered)
            .count();

        info!(
            "MiniBus发布 {}: 本地 {}/{}，远程star {}/{}",
            class_name,
            report.local_instances - report.local_failures,
            report.local_instances,
            report.remote_stars - report.remote_failures,
            report.remote_stars
        );
        Ok(report)
    }

    async fn deliver(&self, instance: &RegisteredInstance, message: &str, class_name: &str) -> bool {
        let url = format!("{}{}", instance.base_url, MINIBUS_EVENT_PATH);
        let result = self
            .http_client
            .post(&url)
            .query(&[("className", class_name)])
            .header(HEADER_CLUSTER_UUID, &self.identity.cluster_secret)
            .header(HEADER_STAR_NAME, &self.identity.star_name)
            .header(CONTENT_TYPE, "application/json")
            .body(message.to_string())
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("MiniBus消息已投递到 {}", instance.id);
                true
            }
            Ok(response) => {
                warn!("MiniBus投递到 {} 失败: HTTP {}", instance.id, response.status());
                false
            }
            Err(e) => {
                warn!("MiniBus投递到 {} 失败: {}", instance.id, e);
                false
            }
        }
    }
}
