use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use star_core::{
    models::{RegisteredInstance, ServiceId, Version, DEFAULT_GROUP, DEFAULT_VERSION},
    StarError, StarResult,
};

/// 同一个 (group, name) 下按版本分桶的实例
///
/// 桶内实例保持注册顺序，空桶会被立即清理。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceVariations {
    pub group: String,
    pub name: String,
    pub versions: BTreeMap<Version, Vec<RegisteredInstance>>,
}

impl ServiceVariations {
    fn new(group: &str, name: &str) -> Self {
        Self {
            group: group.to_string(),
            name: name.to_string(),
            versions: BTreeMap::new(),
        }
    }

    /// 从高到低第一个有存活实例的版本
    fn highest_live(&self) -> Option<(&Version, &Vec<RegisteredInstance>)> {
        self.versions
            .iter()
            .rev()
            .find(|(_, instances)| instances.iter().any(RegisteredInstance::is_live))
    }

    fn lowest_live(&self) -> Option<(&Version, &Vec<RegisteredInstance>)> {
        self.versions
            .iter()
            .find(|(_, instances)| instances.iter().any(RegisteredInstance::is_live))
    }
}

/// 解析结果：选中的服务版本及其存活实例的快照
#[derive(Debug, Clone)]
pub struct ResolvedService {
    pub id: ServiceId,
    pub instances: Vec<RegisteredInstance>,
}

impl ResolvedService {
    /// 按注册顺序选第一个实例
    pub fn first(&self) -> Option<&RegisteredInstance> {
        self.instances.first()
    }
}

/// 服务选择器：`name`、`name/version`、`group/name`、`group/name/version`
#[derive(Debug, Clone, PartialEq, Eq)]
struct Selector {
    group: Option<String>,
    name: String,
    version: Option<Version>,
}

impl Selector {
    fn parse(raw: &str) -> StarResult<Self> {
        let raw = raw.trim();
        let parts: Vec<&str> = raw.split('/').collect();
        let (group, name, version) = match parts.as_slice() {
            [name] => (None, *name, None),
            [name, version] if version.starts_with(|c: char| c.is_ascii_digit()) => {
                (None, *name, Some(*version))
            }
            [group, name] => (Some(*group), *name, None),
            [group, name, version] => (Some(*group), *name, Some(*version)),
            _ => {
                return Err(StarError::illegal_input(format!(
                    "无法解析服务选择器: '{raw}'"
                )))
            }
        };

        // 与注册时使用同一套规范化规则
        let normalized = ServiceId::new(
            group.unwrap_or(DEFAULT_GROUP),
            name,
            version.unwrap_or(DEFAULT_VERSION),
        )?;

        Ok(Self {
            group: group.map(|_| normalized.group().to_string()),
            name: normalized.name().to_string(),
            version: version.map(|_| normalized.version().clone()),
        })
    }

    fn matches(&self, variations: &ServiceVariations) -> bool {
        variations.name == self.name
            && self
                .group
                .as_deref()
                .map_or(true, |group| group == variations.group)
    }
}

/// 服务注册中心接口
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// 注册实例，按实例ID幂等；返回被替换的旧记录
    async fn register(&self, instance: RegisteredInstance) -> Option<RegisteredInstance>;

    async fn unregister(&self, instance_id: Uuid) -> Option<RegisteredInstance>;

    /// 标记实例即将重启，解析时跳过直到重新注册
    async fn mark_restarting(&self, instance_id: Uuid) -> bool;

    /// 把服务选择器解析为一个具体版本，未指定版本时取最高存活版本
    async fn resolve(&self, selector: &str) -> StarResult<ResolvedService>;

    async fn instance(&self, instance_id: Uuid) -> Option<RegisteredInstance>;

    async fn all_instances(&self) -> Vec<RegisteredInstance>;
}

#[derive(Default)]
struct RegistryState {
    /// group -> name -> variations
    groups: BTreeMap<String, BTreeMap<String, ServiceVariations>>,
    /// 实例ID -> 所在的服务标识
    index: HashMap<Uuid, ServiceId>,
}

impl RegistryState {
    fn remove(&mut self, instance_id: Uuid) -> Option<RegisteredInstance> {
        let id = self.index.remove(&instance_id)?;

        let names = self.groups.get_mut(id.group())?;
        let variations = names.get_mut(id.name())?;
        let bucket = variations.versions.get_mut(id.version())?;

        let position = bucket.iter().position(|i| i.instance_id == instance_id)?;
        let removed = bucket.remove(position);

        if bucket.is_empty() {
            variations.versions.remove(id.version());
        }
        if variations.versions.is_empty() {
            names.remove(id.name());
        }
        if names.is_empty() {
            self.groups.remove(id.group());
        }

        Some(removed)
    }

    fn find(&self, instance_id: Uuid) -> Option<&RegisteredInstance> {
        let id = self.index.get(&instance_id)?;
        self.groups
            .get(id.group())?
            .get(id.name())?
            .versions
            .get(id.version())?
            .iter()
            .find(|i| i.instance_id == instance_id)
    }

    fn find_mut(&mut self, instance_id: Uuid) -> Option<&mut RegisteredInstance> {
        let id = self.index.get(&instance_id)?;
        self.groups
            .get_mut(id.group())?
            .get_mut(id.name())?
            .versions
            .get_mut(id.version())?
            .iter_mut()
            .find(|i| i.instance_id == instance_id)
    }

    fn matching<'a>(
        &'a self,
        selector: &'a Selector,
    ) -> impl Iterator<Item = &'a ServiceVariations> + 'a {
        self.groups
            .values()
            .flat_map(|names| names.values())
            .filter(move |variations| selector.matches(variations))
    }
}

/// 内存中的服务注册中心
///
/// 由组合根持有并以 `Arc` 共享，锁内只做短小的操作，读取返回快照。
#[derive(Default)]
pub struct Services {
    state: RwLock<RegistryState>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按选择器取最高存活版本
    pub async fn highest_version(&self, selector: &str) -> StarResult<Option<ServiceId>> {
        let selector = Selector::parse(selector)?;
        let state = self.state.read().await;
        Ok(state
            .matching(&selector)
            .filter_map(|v| v.highest_live().map(|(version, _)| (v, version)))
            .max_by(|(_, a), (_, b)| a.cmp(b))
            .and_then(|(v, version)| ServiceId::new(&v.group, &v.name, version.as_str()).ok()))
    }

    /// 按选择器取最低存活版本
    pub async fn lowest_version(&self, selector: &str) -> StarResult<Option<ServiceId>> {
        let selector = Selector::parse(selector)?;
        let state = self.state.read().await;
        Ok(state
            .matching(&selector)
            .filter_map(|v| v.lowest_live().map(|(version, _)| (v, version)))
            .min_by(|(_, a), (_, b)| a.cmp(b))
            .and_then(|(v, version)| ServiceId::new(&v.group, &v.name, version.as_str()).ok()))
    }

    pub async fn list_variations(&self, group: &str) -> Vec<ServiceVariations> {
        let state = self.state.read().await;
        state
            .groups
            .get(group)
            .map(|names| names.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn groups(&self) -> Vec<String> {
        self.state.read().await.groups.keys().cloned().collect()
    }

    /// 全部服务的快照，按 group、name 排序
    pub async fn snapshot(&self) -> Vec<ServiceVariations> {
        let state = self.state.read().await;
        state
            .groups
            .values()
            .flat_map(|names| names.values().cloned())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.index.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ServiceRegistry for Services {
    async fn register(&self, instance: RegisteredInstance) -> Option<RegisteredInstance> {
        let mut state = self.state.write().await;

        let mut instance = instance;
        instance.restarting = false;
        let instance_id = instance.instance_id;
        let id = instance.id.clone();

        // 同一个实例重新注册时，如果标识不变则原位替换以保持顺序
        if state.index.get(&instance_id) == Some(&id) {
            if let Some(existing) = state.find_mut(instance_id) {
                let previous = std::mem::replace(existing, instance);
                debug!("实例 {} 重新注册为 {}", instance_id, id);
                return Some(previous);
            }
        }

        let previous = state.remove(instance_id);
        if let Some(prev) = &previous {
            info!("实例 {} 从 {} 迁移到 {}", instance_id, prev.id, id);
        }

        state
            .groups
            .entry(id.group().to_string())
            .or_default()
            .entry(id.name().to_string())
            .or_insert_with(|| ServiceVariations::new(id.group(), id.name()))
            .versions
            .entry(id.version().clone())
            .or_default()
            .push(instance);
        state.index.insert(instance_id, id.clone());

        info!("注册服务实例: {} ({})", id, instance_id);
        previous
    }

    async fn unregister(&self, instance_id: Uuid) -> Option<RegisteredInstance> {
        let removed = self.state.write().await.remove(instance_id);
        match &removed {
            Some(instance) => info!("注销服务实例: {} ({})", instance.id, instance_id),
            None => debug!("注销未知实例: {}", instance_id),
        }
        removed
    }

    async fn mark_restarting(&self, instance_id: Uuid) -> bool {
        let mut state = self.state.write().await;
        match state.find_mut(instance_id) {
            Some(instance) => {
                instance.restarting = true;
                info!("服务实例即将重启: {} ({})", instance.id, instance_id);
                true
            }
            None => false,
        }
    }

    async fn resolve(&self, selector: &str) -> StarResult<ResolvedService> {
        let parsed = Selector::parse(selector)?;
        let state = self.state.read().await;

        let candidate = match &parsed.version {
            Some(version) => state
                .matching(&parsed)
                .filter_map(|v| v.versions.get_key_value(version).map(|bucket| (v, bucket)))
                .find(|(_, (_, instances))| instances.iter().any(RegisteredInstance::is_live)),
            None => state
                .matching(&parsed)
                .filter_map(|v| v.highest_live().map(|bucket| (v, bucket)))
                .max_by(|(_, (a, _)), (_, (b, _))| a.cmp(b)),
        };

        let (variations, (version, instances)) = candidate
            .ok_or_else(|| StarError::not_found(format!("没有可用的服务实例: {selector}")))?;

        let id = ServiceId::new(&variations.group, &variations.name, version.as_str())?;
        let instances = instances
            .iter()
            .filter(|i| i.is_live())
            .cloned()
            .collect();

        Ok(ResolvedService { id, instances })
    }

    async fn instance(&self, instance_id: Uuid) -> Option<RegisteredInstance> {
        self.state.read().await.find(instance_id).cloned()
    }

    async fn all_instances(&self) -> Vec<RegisteredInstance> {
        let state = self.state.read().await;
        state
            .groups
            .values()
            .flat_map(|names| names.values())
            .flat_map(|variations| variations.versions.values())
            .flat_map(|instances| instances.iter().cloned())
            .collect()
    }
}
