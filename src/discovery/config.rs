//! 服务发现配置

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 服务发现配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// 后端类型：etcd, consul
    #[serde(default)]
    pub backend: BackendType,

    /// 注册中心地址；etcd 支持逗号分隔的多个 endpoint
    #[serde(default)]
    pub url: Option<String>,

    /// 命名空间；未配置时 etcd 使用 `default`，Consul 为空
    #[serde(default)]
    pub namespace: Option<String>,

    /// 建立连接的超时时间（秒）
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,

    /// 注册等一次性网络请求的超时时间（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// 租约配置（etcd）
    #[serde(default)]
    pub lease: LeaseConfig,

    /// 健康检查配置（Consul）
    #[serde(default)]
    pub health_check: HealthCheckConfig,

    /// 监听配置
    #[serde(default)]
    pub watch: WatchConfig,

    /// resolver 配置
    #[serde(default)]
    pub resolver: ResolverConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::default(),
            url: None,
            namespace: None,
            dial_timeout_secs: default_dial_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            lease: LeaseConfig::default(),
            health_check: HealthCheckConfig::default(),
            watch: WatchConfig::default(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl DiscoveryConfig {
    /// 注册中心地址（未配置时使用后端默认值）
    pub fn url_or_default(&self) -> String {
        match self.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => self.backend.default_url().to_string(),
        }
    }

    /// 命名空间（未配置时使用后端默认值）
    pub fn namespace_or_default(&self) -> String {
        match self.namespace.as_deref().map(str::trim) {
            Some(ns) if !ns.is_empty() => ns.to_string(),
            _ => self.backend.default_namespace().to_string(),
        }
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 后端类型
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// 租约 + 前缀监听
    #[default]
    Etcd,
    /// 健康检查 + 阻塞查询监听
    Consul,
}

impl BackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Etcd => "etcd",
            BackendType::Consul => "consul",
        }
    }

    fn default_url(&self) -> &'static str {
        match self {
            BackendType::Etcd => "127.0.0.1:2379",
            BackendType::Consul => "127.0.0.1:8500",
        }
    }

    fn default_namespace(&self) -> &'static str {
        match self {
            BackendType::Etcd => "default",
            BackendType::Consul => "",
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "etcd" => Ok(BackendType::Etcd),
            "consul" => Ok(BackendType::Consul),
            _ => Err(format!("Unknown backend type: {}", s)),
        }
    }
}

/// 租约配置（etcd）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// 租约 TTL（秒）
    #[serde(default = "default_lease_ttl_secs")]
    pub ttl_secs: i64,

    /// 观察到自身 key 被删除后，发起重新注册前的等待时间（毫秒）
    ///
    /// 用于等待紧随其后的新租约 PUT 事件先到达
    #[serde(default = "default_reregister_delay_ms")]
    pub reregister_delay_ms: u64,

    /// 重新注册的最大尝试次数
    #[serde(default = "default_reregister_max_attempts")]
    pub reregister_max_attempts: usize,

    /// 重新注册失败后的退避基数（毫秒）
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// 重新注册失败后的退避上限（秒）
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_lease_ttl_secs(),
            reregister_delay_ms: default_reregister_delay_ms(),
            reregister_max_attempts: default_reregister_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_secs: default_backoff_max_secs(),
        }
    }
}

impl LeaseConfig {
    pub fn reregister_delay(&self) -> Duration {
        Duration::from_millis(self.reregister_delay_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }
}

/// 健康检查配置（Consul）
///
/// 时长字段使用 Consul 的时长字符串格式，原样提交
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// 探测间隔
    #[serde(default = "default_check_interval")]
    pub interval: String,

    /// 探测超时
    #[serde(default = "default_check_timeout")]
    pub timeout: String,

    /// 持续失败多久后自动注销
    #[serde(default = "default_deregister_after")]
    pub deregister_critical_after: String,

    /// 存活探测路径
    #[serde(default = "default_check_path")]
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: default_check_interval(),
            timeout: default_check_timeout(),
            deregister_critical_after: default_deregister_after(),
            path: default_check_path(),
        }
    }
}

/// 监听配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Consul 阻塞查询的最长等待时间（秒）
    #[serde(default = "default_watch_wait_secs")]
    pub wait_secs: u64,

    /// 连续失败多少次后放弃该监听，等待下一次查询重新建立
    #[serde(default = "default_watch_max_failures")]
    pub max_consecutive_failures: usize,

    /// 失败重试退避基数（毫秒）
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// 失败重试退避上限（秒）
    #[serde(default = "default_watch_backoff_max_secs")]
    pub backoff_max_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            wait_secs: default_watch_wait_secs(),
            max_consecutive_failures: default_watch_max_failures(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_secs: default_watch_backoff_max_secs(),
        }
    }
}

impl WatchConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }
}

/// resolver 配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// 周期性重新解析的间隔（秒）；未配置时只在客户端显式触发时解析
    #[serde(default)]
    pub refresh_interval_secs: Option<u64>,
}

impl ResolverConfig {
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

fn default_dial_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    3
}

fn default_lease_ttl_secs() -> i64 {
    2
}

fn default_reregister_delay_ms() -> u64 {
    1000
}

fn default_reregister_max_attempts() -> usize {
    5
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_max_secs() -> u64 {
    30
}

fn default_check_interval() -> String {
    "3s".to_string()
}

fn default_check_timeout() -> String {
    "5s".to_string()
}

fn default_deregister_after() -> String {
    "300s".to_string()
}

fn default_check_path() -> String {
    "/ping".to_string()
}

fn default_watch_wait_secs() -> u64 {
    300
}

fn default_watch_max_failures() -> usize {
    10
}

fn default_watch_backoff_max_secs() -> u64 {
    20
}
