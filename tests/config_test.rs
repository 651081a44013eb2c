//! 配置、类型与工具函数测试

use std::time::Duration;

use flare_discovery::config::Config;
use flare_discovery::discovery::{BackendType, DiscoveryConfig, InstanceSettings, ServiceInfo};
use flare_discovery::error::DiscoveryError;
use flare_discovery::types::AppType;
use flare_discovery::utils;

const FULL_CONFIG: &str = r#"
[application]
name = "order"
port = 9000
app_type = "grpc"
address = "10.0.0.1"

[discovery]
backend = "consul"
url = "consul.internal:8500"
namespace = "prod"
request_timeout_secs = 2

[discovery.health_check]
path = "/healthz"

[discovery.watch]
wait_secs = 60

[discovery.resolver]
refresh_interval_secs = 15

[logging]
level = "debug"
json = true
"#;

#[test]
fn test_full_config_parses() {
    let config = Config::from_toml_str(FULL_CONFIG).expect("parse config");

    assert_eq!(config.application.name, "order");
    assert_eq!(config.application.app_type, AppType::Grpc);
    assert_eq!(config.discovery.backend, BackendType::Consul);
    assert_eq!(config.discovery.url_or_default(), "consul.internal:8500");
    assert_eq!(config.discovery.namespace_or_default(), "prod");
    assert_eq!(config.discovery.request_timeout(), Duration::from_secs(2));
    assert_eq!(config.discovery.health_check.path, "/healthz");
    assert_eq!(config.discovery.health_check.interval, "3s");
    assert_eq!(config.discovery.watch.wait(), Duration::from_secs(60));
    assert_eq!(
        config.discovery.resolver.refresh_interval(),
        Some(Duration::from_secs(15))
    );
    assert!(config.logging.json);

    let settings = InstanceSettings::from_application(&config.application);
    assert_eq!(settings.endpoint(), "10.0.0.1:9000");
    assert_eq!(settings.service_info(), ServiceInfo::new("order", "10.0.0.1", 9000));
}

#[test]
fn test_minimal_config_uses_defaults() {
    let config = Config::from_toml_str(
        r#"
        [application]
        name = "user"
        port = 8080
        "#,
    )
    .expect("parse config");

    let discovery = &config.discovery;
    assert_eq!(discovery.backend, BackendType::Etcd);
    assert_eq!(discovery.url_or_default(), "127.0.0.1:2379");
    assert_eq!(discovery.namespace_or_default(), "default");
    assert_eq!(discovery.dial_timeout(), Duration::from_secs(5));
    assert_eq!(discovery.request_timeout(), Duration::from_secs(3));
    assert_eq!(discovery.lease.ttl_secs, 2);
    assert_eq!(discovery.lease.reregister_delay(), Duration::from_secs(1));
    assert_eq!(discovery.resolver.refresh_interval(), None);
    assert_eq!(config.application.app_type, AppType::Grpc);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_consul_defaults() {
    let config = DiscoveryConfig {
        backend: BackendType::Consul,
        ..DiscoveryConfig::default()
    };
    assert_eq!(config.url_or_default(), "127.0.0.1:8500");
    assert_eq!(config.namespace_or_default(), "");
}

#[test]
fn test_invalid_configs_are_rejected() {
    for content in [
        "[application]\nname = \"\"\nport = 1",
        "[application]\nname = \"a/b\"\nport = 1",
        "[application]\nname = \"a\"\nport = 1\n[discovery.lease]\nttl_secs = 0",
        "[application]\nname = \"a\"\nport = 1\n[discovery]\nbackend = \"zookeeper\"",
        "[application]\nname = \"a\"",
    ] {
        assert!(
            matches!(Config::from_toml_str(content), Err(DiscoveryError::Config(_))),
            "config should be rejected: {}",
            content
        );
    }
}

#[test]
fn test_backend_and_app_type_parsing() {
    assert_eq!("ETCD".parse::<BackendType>(), Ok(BackendType::Etcd));
    assert_eq!("consul".parse::<BackendType>(), Ok(BackendType::Consul));
    assert!("dns".parse::<BackendType>().is_err());

    assert_eq!("queue".parse::<AppType>(), Ok(AppType::Queue));
    assert_eq!("1".parse::<AppType>(), Ok(AppType::Web));
    assert_eq!(AppType::Cron.code(), 4);
    assert_eq!(AppType::Grpc.to_string(), "gRPC");
}

#[test]
fn test_endpoint_helpers() {
    assert_eq!(utils::endpoint("10.0.0.1", 80), "10.0.0.1:80");
    assert_eq!(utils::split_endpoint("10.0.0.1:80"), Some(("10.0.0.1", 80)));
    assert_eq!(utils::split_endpoint("fe80::1:443"), Some(("fe80::1", 443)));
    assert_eq!(utils::split_endpoint("10.0.0.1"), None);
    assert_eq!(utils::split_endpoint(":80"), None);
    assert_eq!(utils::split_endpoint("host:port"), None);

    assert_eq!(utils::with_http_scheme("127.0.0.1:8500/"), "http://127.0.0.1:8500");
    assert_eq!(utils::with_http_scheme("https://consul"), "https://consul");

    let ip = utils::local_ipv4();
    assert!(ip.parse::<std::net::Ipv4Addr>().is_ok(), "not an IPv4 address: {}", ip);
    assert_eq!(utils::local_ipv4(), ip, "detected address is cached");
}

#[test]
fn test_service_info_endpoint_round_trip() {
    let instance = ServiceInfo::from_endpoint("user", "10.0.0.5:9000").expect("valid endpoint");
    assert_eq!(instance, ServiceInfo::new("user", "10.0.0.5", 9000));
    assert_eq!(instance.endpoint(), "10.0.0.5:9000");
    assert!(instance.is_at("10.0.0.5", 9000));
    assert!(!instance.is_at("10.0.0.5", 9001));
    assert!(ServiceInfo::from_endpoint("user", "10.0.0.5").is_none());

    let json = serde_json::to_string(&instance).expect("encode");
    assert_eq!(json, r#"{"name":"user","address":"10.0.0.5","port":9000}"#);
}
