//! Flare 服务注册与发现
//!
//! 进程启动时把自身地址注册到 etcd 或 Consul，同时维护其他服务实例的本地缓存，
//! 并通过 resolver 把实例地址提供给 tonic 负载均衡通道。

pub mod config;
pub mod discovery;
pub mod error;
pub mod health;
pub mod logging;
pub mod resolver;
pub mod retry;
pub mod types;
pub mod utils;

// Re-exports
pub use config::{ApplicationConfig, Config, LoggingConfig};
pub use discovery::{
    BackendType, ConsulDiscovery, DiscoveryConfig, DiscoveryFactory, DiscoveryState,
    EtcdDiscovery, InstanceSettings, ServiceDiscovery, ServiceInfo, ServiceRegistry, ServiceSet,
};
pub use error::{DiscoveryError, ErrorCategory, ErrorCode, Result};
pub use health::{DiscoveryHealth, HealthReport, HealthStatus};
pub use logging::init_tracing;
pub use resolver::{
    BalanceChannelConn, ClientConn, DiscoveryResolver, ResolvedAddress, ResolverBuilder,
    ResolverState, ResolverTarget, balanced_channel,
};
pub use types::AppType;
