//! 服务发现工厂
//!
//! 根据配置选定后端，启动时调用一次

use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::discovery::backend::consul::ConsulDiscovery;
use crate::discovery::backend::etcd::EtcdDiscovery;
use crate::discovery::backend::{InstanceSettings, ServiceDiscovery};
use crate::discovery::config::{BackendType, DiscoveryConfig};
use crate::error::Result;

/// 服务发现工厂
pub struct DiscoveryFactory;

impl DiscoveryFactory {
    /// 从应用配置创建服务发现后端
    ///
    /// etcd 后端会在返回前完成连接、全量加载与监听建立；连接失败直接返回错误
    pub async fn create(config: &Config) -> Result<Arc<dyn ServiceDiscovery>> {
        let settings = InstanceSettings::from_application(&config.application);
        Self::create_with_settings(settings, &config.discovery).await
    }

    /// 使用显式的实例信息创建服务发现后端
    pub async fn create_with_settings(
        settings: InstanceSettings,
        config: &DiscoveryConfig,
    ) -> Result<Arc<dyn ServiceDiscovery>> {
        let discovery: Arc<dyn ServiceDiscovery> = match config.backend {
            BackendType::Etcd => Arc::new(EtcdDiscovery::connect(settings, config).await?),
            BackendType::Consul => Arc::new(ConsulDiscovery::connect(settings, config)?),
        };

        info!(
            backend = config.backend.as_str(),
            url = %discovery.url(),
            "service discovery initialized"
        );
        Ok(discovery)
    }
}
