//! 服务实例集合

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::discovery::instance::ServiceInfo;

/// 单个服务名下的实例集合
///
/// 以 `address:port` 为键，读写由内部锁串行化。所有方法都是非阻塞的内存操作，
/// 状态变化的日志由调用方负责。
#[derive(Debug, Default)]
pub struct ServiceSet {
    data: RwLock<HashMap<String, ServiceInfo>>,
}

impl ServiceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入实例；键已存在时不做任何修改
    ///
    /// 返回 true 当且仅当实例是新插入的
    pub fn put(&self, instance: ServiceInfo) -> bool {
        let key = instance.endpoint();
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        if data.contains_key(&key) {
            return false;
        }
        data.insert(key, instance);
        true
    }

    /// 移除实例；键不存在时不做任何修改
    ///
    /// 返回 true 当且仅当确实发生了移除
    pub fn remove(&self, instance: &ServiceInfo) -> bool {
        let key = instance.endpoint();
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key)
            .is_some()
    }

    /// 当前实例的快照（无序），与集合后续的修改互不影响
    pub fn list(&self) -> Vec<ServiceInfo> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn contains(&self, instance: &ServiceInfo) -> bool {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&instance.endpoint())
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
