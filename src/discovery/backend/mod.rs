//! 服务发现后端抽象和实现

pub mod consul;
pub mod etcd;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::config::ApplicationConfig;
use crate::discovery::instance::ServiceInfo;
use crate::discovery::state::DiscoveryState;
use crate::error::{DiscoveryError, Result};
use crate::types::AppType;
use crate::utils;

/// 服务发现后端 trait
///
/// 由 etcd（租约 + 监听）与 Consul（健康检查 + 监听）两个后端实现，
/// 启动时根据配置选定其一，之后只通过该 trait 使用。
#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    /// 将本进程的地址与端口注册到注册中心
    ///
    /// 启动时调用一次；失败直接返回，不在内部重试
    async fn register(&self) -> Result<()>;

    /// 注销本进程
    async fn deregister(&self) -> Result<()>;

    /// 获取服务当前已知的实例
    ///
    /// 本地无缓存时同步地从注册中心拉取一次，并顺带建立监听，
    /// 之后的调用直接读取缓存
    async fn service_instances(&self, service_name: &str) -> Vec<ServiceInfo>;

    /// 后端 scheme，例如 `etcd`
    fn scheme_name(&self) -> &'static str;

    /// `scheme://url`，供 RPC 客户端层构造 resolver target
    fn scheme_url(&self) -> String {
        format!("{}://{}", self.scheme_name(), self.url())
    }

    /// 注册中心地址
    fn url(&self) -> &str;

    /// 当前生命周期状态
    fn state(&self) -> DiscoveryState;

    /// 取消所有后台任务并等待其退出
    async fn shutdown(&self);
}

/// 本进程的注册信息
#[derive(Debug, Clone)]
pub struct InstanceSettings {
    /// 服务名称
    pub name: String,
    /// 对外公布的地址
    pub address: String,
    /// 服务端口
    pub port: u16,
    /// 应用类型
    pub app_type: AppType,
}

impl InstanceSettings {
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
            app_type: AppType::default(),
        }
    }

    pub fn with_app_type(mut self, app_type: AppType) -> Self {
        self.app_type = app_type;
        self
    }

    /// 从应用配置构建，未配置地址时使用本机 IPv4
    pub fn from_application(app: &ApplicationConfig) -> Self {
        let address = app
            .address
            .as_deref()
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(str::to_string)
            .unwrap_or_else(utils::local_ipv4);
        Self::new(app.name.clone(), address, app.port).with_app_type(app.app_type)
    }

    pub fn endpoint(&self) -> String {
        utils::endpoint(&self.address, self.port)
    }

    pub fn service_info(&self) -> ServiceInfo {
        ServiceInfo::new(self.name.clone(), self.address.clone(), self.port)
    }
}

/// 为一次性网络请求加上超时
pub(crate) async fn with_timeout<T>(
    operation: &'static str,
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| DiscoveryError::Timeout { operation, timeout })?
}
