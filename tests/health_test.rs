//! 健康检查测试

mod common;

use std::sync::Arc;

use common::StaticDiscovery;
use flare_discovery::discovery::DiscoveryState;
use flare_discovery::health::{DiscoveryHealth, HealthStatus};

#[test]
fn test_status_follows_discovery_state() {
    let discovery = Arc::new(StaticDiscovery::new());
    let health = DiscoveryHealth::new(discovery.clone());

    for (state, expected) in [
        (DiscoveryState::Uninitialized, HealthStatus::Unknown),
        (DiscoveryState::Connected, HealthStatus::Serving),
        (DiscoveryState::Registered, HealthStatus::Serving),
        (DiscoveryState::Watching, HealthStatus::Serving),
        (DiscoveryState::Degraded, HealthStatus::NotServing),
    ] {
        discovery.set_state(state);
        assert_eq!(health.status(), expected, "state {}", state);
    }
}

#[test]
fn test_report_names_backend() {
    let discovery = Arc::new(StaticDiscovery::new());
    discovery.set_state(DiscoveryState::Degraded);
    let report = DiscoveryHealth::new(discovery).report();

    assert_eq!(report.backend, "etcd");
    assert_eq!(report.url, "127.0.0.1:2379");
    assert_eq!(report.status, HealthStatus::NotServing);

    let json = serde_json::to_value(&report).expect("serialize report");
    assert_eq!(json["state"], "degraded");
    assert_eq!(json["status"], "not_serving");
}
