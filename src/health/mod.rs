//! 健康检查模块
//!
//! 将服务发现后端的生命周期状态映射为服务健康状态，供存活探测与运维接口使用

use serde::Serialize;
use std::sync::Arc;

use crate::discovery::{DiscoveryState, ServiceDiscovery};

/// 健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Unknown,
    Serving,
    NotServing,
}

impl From<DiscoveryState> for HealthStatus {
    fn from(state: DiscoveryState) -> Self {
        match state {
            DiscoveryState::Uninitialized => HealthStatus::Unknown,
            DiscoveryState::Connected | DiscoveryState::Registered | DiscoveryState::Watching => {
                HealthStatus::Serving
            }
            DiscoveryState::Degraded => HealthStatus::NotServing,
        }
    }
}

/// 一次健康检查的结果
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub backend: &'static str,
    pub url: String,
    pub state: DiscoveryState,
    pub status: HealthStatus,
}

/// 服务发现健康检查
#[derive(Clone)]
pub struct DiscoveryHealth {
    discovery: Arc<dyn ServiceDiscovery>,
}

impl DiscoveryHealth {
    pub fn new(discovery: Arc<dyn ServiceDiscovery>) -> Self {
        Self { discovery }
    }

    pub fn status(&self) -> HealthStatus {
        self.discovery.state().into()
    }

    pub fn is_serving(&self) -> bool {
        self.status() == HealthStatus::Serving
    }

    pub fn report(&self) -> HealthReport {
        let state = self.discovery.state();
        HealthReport {
            backend: self.discovery.scheme_name(),
            url: self.discovery.url().to_string(),
            state,
            status: state.into(),
        }
    }
}
