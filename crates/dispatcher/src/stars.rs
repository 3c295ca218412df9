use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{info, warn};

use star_core::{config::StarEntryConfig, models::{StarInfo, LOCAL_STAR}};

#[derive(Debug, Clone)]
struct RemoteStar {
    name: String,
    url: String,
    is_active: bool,
}

impl RemoteStar {
    fn info(&self) -> StarInfo {
        StarInfo {
            name: self.name.clone(),
            url: self.url.clone(),
            is_active: self.is_active,
            is_local: false,
        }
    }
}

/// 联邦中的star集合
///
/// 远程star列表只在配置重新加载时整体替换，其余时间只读；
/// `is_active` 跟随最近一次中继到该star的结果。
pub struct StarsManager {
    local_name: String,
    local_url: String,
    remotes: RwLock<Vec<RemoteStar>>,
}

impl StarsManager {
    pub fn new(
        local_name: impl Into<String>,
        local_url: impl Into<String>,
        remotes: &[StarEntryConfig],
    ) -> Self {
        let local_name = local_name.into();
        let remotes = Self::build_remotes(&local_name, remotes, &HashMap::new());
        Self {
            local_name,
            local_url: local_url.into().trim_end_matches('/').to_string(),
            remotes: RwLock::new(remotes),
        }
    }

    fn build_remotes(
        local_name: &str,
        entries: &[StarEntryConfig],
        previous: &HashMap<String, bool>,
    ) -> Vec<RemoteStar> {
        entries
            .iter()
            .filter(|entry| {
                if entry.name == local_name {
                    warn!("忽略与本地star同名的远程star配置: {}", entry.name);
                    false
                } else {
                    true
                }
            })
            .map(|entry| RemoteStar {
                name: entry.name.clone(),
                url: entry.url.trim_end_matches('/').to_string(),
                is_active: previous.get(&entry.name).copied().unwrap_or(true),
            })
            .collect()
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn local_url(&self) -> &str {
        &self.local_url
    }

    /// `@local` 或本地star名称
    pub fn is_local(&self, star: &str) -> bool {
        star == LOCAL_STAR || star == self.local_name
    }

    pub fn local_info(&self) -> StarInfo {
        StarInfo {
            name: self.local_name.clone(),
            url: self.local_url.clone(),
            is_active: true,
            is_local: true,
        }
    }

    pub async fn remote(&self, name: &str) -> Option<StarInfo> {
        self.remotes
            .read()
            .await
            .iter()
            .find(|star| star.name == name)
            .map(RemoteStar::info)
    }

    pub async fn remotes(&self) -> Vec<StarInfo> {
        self.remotes.read().await.iter().map(RemoteStar::info).collect()
    }

    /// 本地star在前，其余按配置顺序
    pub async fn stars(&self) -> Vec<StarInfo> {
        let mut stars = vec![self.local_info()];
        stars.extend(self.remotes().await);
        stars
    }

    pub async fn set_active(&self, name: &str, active: bool) {
        let mut remotes = self.remotes.write().await;
        if let Some(star) = remotes.iter_mut().find(|star| star.name == name) {
            if star.is_active != active {
                if active {
                    info!("star {} 恢复可用", name);
                } else {
                    warn!("star {} 不可用", name);
                }
                star.is_active = active;
            }
        }
    }

    /// 替换远程star列表，同名star保留可用状态
    pub async fn reload(&self, entries: &[StarEntryConfig]) {
        let mut remotes = self.remotes.write().await;
        let previous: HashMap<String, bool> = remotes
            .iter()
            .map(|star| (star.name.clone(), star.is_active))
            .collect();
        *remotes = Self::build_remotes(&self.local_name, entries, &previous);
        info!("远程star列表已更新，共 {} 个", remotes.len());
    }
}
