//! 服务注册与发现模块
//!
//! 本进程向注册中心（etcd 或 Consul）注册自身地址，同时维护其他服务实例的
//! 本地缓存，并通过监听保持更新。

pub mod backend;
pub mod config;
pub mod factory;
pub mod instance;
pub mod registry;
pub mod service_set;
pub mod state;

pub use backend::consul::{
    CheckStatus, ConsulDiscovery, ConsulStore, HealthEntry, HealthStore, ServiceRegistration,
};
pub use backend::etcd::{EtcdDiscovery, EtcdStore, KvEvent, KvEventKind, KvSnapshot, LeaseStore};
pub use backend::{InstanceSettings, ServiceDiscovery};
pub use config::{
    BackendType, DiscoveryConfig, HealthCheckConfig, LeaseConfig, ResolverConfig, WatchConfig,
};
pub use factory::DiscoveryFactory;
pub use instance::ServiceInfo;
pub use registry::ServiceRegistry;
pub use service_set::ServiceSet;
pub use state::DiscoveryState;
