//! 按服务名索引的实例缓存

use dashmap::DashMap;
use std::sync::Arc;

use crate::discovery::service_set::ServiceSet;

/// 服务名 → 实例集合
///
/// 不同服务名之间没有全局锁；集合一旦创建就在进程生命周期内保留
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: DashMap<String, Arc<ServiceSet>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取已存在的实例集合
    pub fn get(&self, name: &str) -> Option<Arc<ServiceSet>> {
        self.services.get(name).map(|set| set.value().clone())
    }

    /// 获取实例集合，不存在时创建
    pub fn get_or_create(&self, name: &str) -> Arc<ServiceSet> {
        if let Some(set) = self.services.get(name) {
            return set.value().clone();
        }
        self.services
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ServiceSet::new()))
            .value()
            .clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// 已知的服务名
    pub fn names(&self) -> Vec<String> {
        self.services.iter().map(|entry| entry.key().clone()).collect()
    }
}
