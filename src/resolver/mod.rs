//! 客户端 resolver
//!
//! 把服务名解析为服务发现后端当前已知的实例地址集合，并推送给负载均衡层。
//! 默认只在显式调用 [`DiscoveryResolver::resolve_now`] 时解析；
//! 配置了刷新间隔时由后台任务周期性推送。

pub mod balance;
pub mod target;

pub use balance::{BalanceChannelConn, balanced_channel};
pub use target::ResolverTarget;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::{ResolverConfig, ServiceDiscovery, ServiceInfo};
use crate::error::{DiscoveryError, Result};

/// 解析出的一个地址
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedAddress {
    /// `address:port`
    pub addr: String,
    /// TLS 校验使用的服务名
    pub server_name: String,
}

/// 一次解析的完整结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverState {
    pub addresses: Vec<ResolvedAddress>,
}

impl ResolverState {
    pub fn from_instances(instances: &[ServiceInfo]) -> Self {
        Self {
            addresses: instances
                .iter()
                .map(|instance| ResolvedAddress {
                    addr: instance.endpoint(),
                    server_name: instance.name.clone(),
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// 接收解析结果的一方（通常是负载均衡通道）
#[async_trait]
pub trait ClientConn: Send + Sync {
    /// 以完整的地址集合替换当前集合
    async fn update_state(&self, state: ResolverState) -> Result<()>;
}

/// 按 scheme 注册的 resolver 构建器
#[derive(Clone)]
pub struct ResolverBuilder {
    discovery: Arc<dyn ServiceDiscovery>,
    refresh_interval: Option<Duration>,
}

impl ResolverBuilder {
    pub fn new(discovery: Arc<dyn ServiceDiscovery>) -> Self {
        Self {
            discovery,
            refresh_interval: None,
        }
    }

    pub fn from_config(discovery: Arc<dyn ServiceDiscovery>, config: &ResolverConfig) -> Self {
        Self::new(discovery).with_refresh_interval(config.refresh_interval())
    }

    pub fn with_refresh_interval(mut self, interval: Option<Duration>) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// 与后端一致的 scheme
    pub fn scheme(&self) -> &'static str {
        self.discovery.scheme_name()
    }

    /// 服务对应的 target
    pub fn target(&self, service_name: &str) -> ResolverTarget {
        ResolverTarget::new(self.scheme(), service_name)
    }

    /// 构建 resolver 并立即解析一次
    ///
    /// 没有可用实例时返回 [`DiscoveryError::NoAvailableInstance`]，不会推送空集合
    pub async fn build<C: ClientConn + 'static>(
        &self,
        target: &ResolverTarget,
        conn: C,
    ) -> Result<DiscoveryResolver<C>> {
        if target.scheme != self.scheme() {
            return Err(DiscoveryError::invalid_target(
                target.to_string(),
                format!("scheme {} is not handled by {}", target.scheme, self.scheme()),
            ));
        }

        let resolver = DiscoveryResolver {
            inner: Arc::new(ResolverInner {
                discovery: self.discovery.clone(),
                service_name: target.service_name.clone(),
                conn,
            }),
            cancel: CancellationToken::new(),
        };
        resolver.resolve_now().await?;

        if let Some(interval) = self.refresh_interval {
            resolver.spawn_refresh(interval);
        }
        info!(target = %target, "resolver built");
        Ok(resolver)
    }
}

/// 单个服务名的 resolver
///
/// 丢弃时停止后台刷新
pub struct DiscoveryResolver<C: ClientConn + 'static> {
    inner: Arc<ResolverInner<C>>,
    cancel: CancellationToken,
}

struct ResolverInner<C> {
    discovery: Arc<dyn ServiceDiscovery>,
    service_name: String,
    conn: C,
}

impl<C: ClientConn + 'static> ResolverInner<C> {
    async fn resolve(&self) -> Result<()> {
        let instances = self.discovery.service_instances(&self.service_name).await;
        if instances.is_empty() {
            warn!(service = %self.service_name, "no available instance");
            return Err(DiscoveryError::NoAvailableInstance(
                self.service_name.clone(),
            ));
        }

        let state = ResolverState::from_instances(&instances);
        debug!(
            service = %self.service_name,
            addresses = state.addresses.len(),
            "resolved service addresses"
        );
        self.conn.update_state(state).await
    }
}

impl<C: ClientConn + 'static> DiscoveryResolver<C> {
    pub fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    /// 立即解析并推送一次
    pub async fn resolve_now(&self) -> Result<()> {
        self.inner.resolve().await
    }

    /// 停止后台刷新
    pub fn close(&self) {
        self.cancel.cancel();
    }

    fn spawn_refresh(&self, interval: Duration) {
        let inner = self.inner.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 第一次 tick 立即完成，构建时已经解析过
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match inner.resolve().await {
                    Ok(()) => {}
                    Err(DiscoveryError::ResolverClosed(name)) => {
                        debug!(service = %name, "client connection closed, stopping refresh");
                        break;
                    }
                    Err(e) => {
                        // 保留上一次的地址集合
                        warn!(service = %inner.service_name, error = %e, "periodic resolve failed");
                    }
                }
            }
        });
    }
}

impl<C: ClientConn + 'static> Drop for DiscoveryResolver<C> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
