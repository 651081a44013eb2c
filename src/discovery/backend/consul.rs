//! Consul 服务发现后端
//!
//! 健康检查 + 阻塞查询监听：注册时提交 HTTP 存活探测，由 Consul 负责剔除；
//! 每个被查询过的服务名维持一个阻塞查询循环，按聚合健康状态增删缓存实例。

use async_trait::async_trait;
use dashmap::DashSet;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::{InstanceSettings, ServiceDiscovery, with_timeout};
use crate::discovery::config::{DiscoveryConfig, HealthCheckConfig, WatchConfig};
use crate::discovery::instance::ServiceInfo;
use crate::discovery::registry::ServiceRegistry;
use crate::discovery::state::{DiscoveryState, StateFlags};
use crate::error::{DiscoveryError, Result};
use crate::retry::{BackoffPolicy, ExponentialBackoffPolicy};
use crate::utils;

/// 聚合健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckStatus {
    Passing,
    Warning,
    Critical,
    Maintenance,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Passing => "passing",
            CheckStatus::Warning => "warning",
            CheckStatus::Critical => "critical",
            CheckStatus::Maintenance => "maintenance",
        }
    }

    pub fn is_passing(&self) -> bool {
        matches!(self, CheckStatus::Passing)
    }

    /// 解析 Consul 返回的状态字符串，未知状态视为 critical
    pub fn parse(status: &str) -> Self {
        match status {
            "passing" => CheckStatus::Passing,
            "warning" => CheckStatus::Warning,
            "maintenance" => CheckStatus::Maintenance,
            _ => CheckStatus::Critical,
        }
    }

    /// 按 maintenance > critical > warning > passing 聚合多个检查
    ///
    /// 维护模式由特殊的 check ID 标识；没有任何检查时视为 passing
    pub fn aggregate<'a>(checks: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut aggregated = CheckStatus::Passing;
        for (check_id, status) in checks {
            if check_id == "_node_maintenance" || check_id.starts_with("_service_maintenance:") {
                return CheckStatus::Maintenance;
            }
            aggregated = match (aggregated, CheckStatus::parse(status)) {
                (_, CheckStatus::Maintenance) | (CheckStatus::Maintenance, _) => {
                    CheckStatus::Maintenance
                }
                (_, CheckStatus::Critical) | (CheckStatus::Critical, _) => CheckStatus::Critical,
                (_, CheckStatus::Warning) | (CheckStatus::Warning, _) => CheckStatus::Warning,
                (current, _) => current,
            };
        }
        aggregated
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一个实例及其聚合健康状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthEntry {
    pub service: ServiceInfo,
    pub status: CheckStatus,
}

impl HealthEntry {
    pub fn new(service: ServiceInfo, status: CheckStatus) -> Self {
        Self { service, status }
    }
}

/// 提交给 Consul agent 的服务注册
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRegistration {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    pub tags: Vec<String>,
    pub meta: HashMap<String, String>,
    pub check: AgentCheck,
}

/// HTTP 存活探测
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct AgentCheck {
    #[serde(rename = "HTTP")]
    pub http: String,
    pub interval: String,
    pub timeout: String,
    pub deregister_critical_service_after: String,
}

impl ServiceRegistration {
    /// 实例 ID 为 `address:port`，探测地址为 `http://address:port<path>`
    pub fn new(settings: &InstanceSettings, namespace: &str, check: &HealthCheckConfig) -> Self {
        let endpoint = settings.endpoint();
        let path = if check.path.starts_with('/') {
            check.path.clone()
        } else {
            format!("/{}", check.path)
        };

        Self {
            id: endpoint.clone(),
            name: settings.name.clone(),
            address: settings.address.clone(),
            port: settings.port,
            namespace: namespace.to_string(),
            tags: vec![
                settings.name.clone(),
                settings.address.clone(),
                settings.app_type.as_str().to_string(),
            ],
            meta: HashMap::from([(
                "appType".to_string(),
                settings.app_type.code().to_string(),
            )]),
            check: AgentCheck {
                http: format!("http://{}{}", endpoint, path),
                interval: check.interval.clone(),
                timeout: check.timeout.clone(),
                deregister_critical_service_after: check.deregister_critical_after.clone(),
            },
        }
    }
}

/// 健康检查型注册中心
///
/// [`ConsulStore`] 是基于 Consul HTTP API 的实现
#[async_trait]
pub trait HealthStore: Send + Sync + 'static {
    /// 向本地 agent 注册服务（含健康检查）
    async fn register_service(&self, registration: &ServiceRegistration) -> Result<()>;

    /// 从本地 agent 注销服务
    async fn deregister_service(&self, service_id: &str) -> Result<()>;

    /// 通过本地 agent 查询服务实例及其聚合健康状态
    async fn agent_service_health(&self, name: &str, namespace: &str) -> Result<Vec<HealthEntry>>;

    /// 阻塞查询：在 `index` 之后有变化或 `wait` 到期时返回新的 index 与全量实例
    async fn watch_service_health(
        &self,
        name: &str,
        namespace: &str,
        index: u64,
        wait: Duration,
    ) -> Result<(u64, Vec<HealthEntry>)>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceEntry {
    #[serde(default)]
    aggregated_status: String,
    service: ServiceBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthServiceEntry {
    #[serde(default)]
    node: NodeBody,
    service: ServiceBody,
    #[serde(default)]
    checks: Vec<CheckBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NodeBody {
    #[serde(default)]
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceBody {
    #[serde(default)]
    service: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    port: u16,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CheckBody {
    #[serde(rename = "CheckID", default)]
    check_id: String,
    #[serde(default)]
    status: String,
}

impl ServiceBody {
    /// 服务未单独设置地址时使用节点地址
    fn into_service_info(self, fallback_name: &str, node_address: &str) -> ServiceInfo {
        let name = if self.service.is_empty() {
            fallback_name.to_string()
        } else {
            self.service
        };
        let address = if self.address.is_empty() {
            node_address.to_string()
        } else {
            self.address
        };
        ServiceInfo::new(name, address, self.port)
    }
}

/// 基于 Consul HTTP API 的 [`HealthStore`]
#[derive(Clone)]
pub struct ConsulStore {
    http_client: HttpClient,
    consul_url: String,
}

impl ConsulStore {
    pub fn new(url: &str, dial_timeout: Duration) -> Result<Self> {
        let http_client = HttpClient::builder()
            .connect_timeout(dial_timeout)
            .build()
            .map_err(|e| DiscoveryError::Connect {
                backend: "consul",
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            http_client,
            consul_url: utils::with_http_scheme(url),
        })
    }

    fn namespace_query(namespace: &str) -> Vec<(&'static str, String)> {
        if namespace.is_empty() {
            Vec::new()
        } else {
            vec![("ns", namespace.to_string())]
        }
    }
}

#[async_trait]
impl HealthStore for ConsulStore {
    async fn register_service(&self, registration: &ServiceRegistration) -> Result<()> {
        let url = format!("{}/v1/agent/service/register", self.consul_url);
        self.http_client
            .put(&url)
            .json(registration)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn deregister_service(&self, service_id: &str) -> Result<()> {
        let url = format!("{}/v1/agent/service/deregister/{}", self.consul_url, service_id);
        self.http_client
            .put(&url)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn agent_service_health(&self, name: &str, namespace: &str) -> Result<Vec<HealthEntry>> {
        let url = format!("{}/v1/agent/health/service/name/{}", self.consul_url, name);
        let resp = self
            .http_client
            .get(&url)
            .query(&Self::namespace_query(namespace))
            .send()
            .await?;

        // 200/429/503 分别表示 passing/warning/critical，响应体相同
        match resp.status() {
            StatusCode::NOT_FOUND => return Ok(Vec::new()),
            StatusCode::OK | StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {}
            status => {
                return Err(DiscoveryError::Store(format!(
                    "agent health query for {} returned {}",
                    name, status
                )));
            }
        }

        let entries: Vec<AgentServiceEntry> = resp.json().await?;
        Ok(entries
            .into_iter()
            .map(|entry| {
                HealthEntry::new(
                    entry.service.into_service_info(name, ""),
                    CheckStatus::parse(&entry.aggregated_status),
                )
            })
            .collect())
    }

    async fn watch_service_health(
        &self,
        name: &str,
        namespace: &str,
        index: u64,
        wait: Duration,
    ) -> Result<(u64, Vec<HealthEntry>)> {
        let url = format!("{}/v1/health/service/{}", self.consul_url, name);
        let mut query = Self::namespace_query(namespace);
        query.push(("index", index.to_string()));
        query.push(("wait", format!("{}s", wait.as_secs())));

        let resp = self
            .http_client
            .get(&url)
            .query(&query)
            // 阻塞查询本身最长 wait，Consul 还会额外加上最多 wait/16 的抖动
            .timeout(wait + Duration::from_secs(30))
            .send()
            .await?
            .error_for_status()?;

        let new_index = resp
            .headers()
            .get("X-Consul-Index")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| DiscoveryError::decode("X-Consul-Index", "missing or malformed header"))?;

        let entries: Vec<HealthServiceEntry> = resp.json().await?;
        let entries = entries
            .into_iter()
            .map(|entry| {
                let status = CheckStatus::aggregate(
                    entry
                        .checks
                        .iter()
                        .map(|check| (check.check_id.as_str(), check.status.as_str())),
                );
                HealthEntry::new(
                    entry.service.into_service_info(name, &entry.node.address),
                    status,
                )
            })
            .collect();

        Ok((new_index, entries))
    }
}

/// Consul 服务发现
///
/// 丢弃该后端即取消其所有监听，需要等待任务退出时调用
/// [`ServiceDiscovery::shutdown`]。
pub struct ConsulDiscovery<S: HealthStore = ConsulStore> {
    inner: Arc<Inner<S>>,
}

struct Inner<S> {
    store: S,
    settings: InstanceSettings,
    url: String,
    namespace: String,
    health_check: HealthCheckConfig,
    watch: WatchConfig,
    request_timeout: Duration,
    registry: ServiceRegistry,
    state: StateFlags,
    /// 已有存活监听的服务名
    watchers: DashSet<String>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl ConsulDiscovery<ConsulStore> {
    /// 创建 Consul 客户端；服务的加载与监听在首次查询时进行
    pub fn connect(settings: InstanceSettings, config: &DiscoveryConfig) -> Result<Self> {
        let url = config.url_or_default();
        let store = ConsulStore::new(&url, config.dial_timeout())
            .inspect_err(|e| error!(url = %url, error = %e, "failed to create consul client"))?;
        Ok(Self::with_store(store, settings, config))
    }
}

impl<S: HealthStore> ConsulDiscovery<S> {
    pub fn with_store(store: S, settings: InstanceSettings, config: &DiscoveryConfig) -> Self {
        let inner = Inner {
            store,
            settings,
            url: config.url_or_default(),
            namespace: config.namespace_or_default(),
            health_check: config.health_check.clone(),
            watch: config.watch.clone(),
            request_timeout: config.request_timeout(),
            registry: ServiceRegistry::new(),
            state: StateFlags::default(),
            watchers: DashSet::new(),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        };
        inner.state.set_connected(true);

        Self {
            inner: Arc::new(inner),
        }
    }

    /// 本实例提交给 Consul 的注册内容
    pub fn registration(&self) -> ServiceRegistration {
        ServiceRegistration::new(
            &self.inner.settings,
            &self.inner.namespace,
            &self.inner.health_check,
        )
    }

    /// 指定服务是否有存活的监听
    pub fn is_watching(&self, service_name: &str) -> bool {
        self.inner.watchers.contains(service_name)
    }
}

impl<S: HealthStore> Inner<S> {
    /// 加载服务实例并建立监听，返回当前缓存
    async fn seed(self: &Arc<Self>, name: &str) -> Vec<ServiceInfo> {
        if let Err(e) = self.load(name).await {
            error!(service = %name, error = %e, "failed to load service instances from consul");
            return Vec::new();
        }
        // 实例上线后由监听补充
        self.ensure_watch(name);

        self.registry
            .get(name)
            .map(|set| set.list())
            .unwrap_or_default()
    }

    /// 通过本地 agent 一次性加载服务实例
    ///
    /// 优先只保留 passing 实例；没有任何 passing 实例时退回全部实例。
    /// 没有任何实例时不创建缓存。
    async fn load(&self, name: &str) -> Result<()> {
        let entries = with_timeout(
            "service bootstrap",
            self.request_timeout,
            self.store.agent_service_health(name, &self.namespace),
        )
        .await?;

        if entries.is_empty() {
            warn!(service = %name, "no service instances found in consul");
            return Ok(());
        }

        let passing: Vec<ServiceInfo> = entries
            .iter()
            .filter(|entry| entry.status.is_passing())
            .map(|entry| entry.service.clone())
            .collect();
        let instances = if passing.is_empty() {
            warn!(
                service = %name,
                total = entries.len(),
                "no passing instances, falling back to all instances"
            );
            entries.into_iter().map(|entry| entry.service).collect()
        } else {
            passing
        };

        let set = self.registry.get_or_create(name);
        for instance in &instances {
            set.put(instance.clone());
        }
        info!(
            service = %name,
            instances = %serde_json::to_string(&instances).unwrap_or_default(),
            "service instances loaded from consul"
        );
        Ok(())
    }

    /// 为服务名启动阻塞查询循环；同一服务名同时只有一个
    fn ensure_watch(self: &Arc<Self>, name: &str) {
        if self.shutdown.is_cancelled() {
            return;
        }
        if !self.watchers.insert(name.to_string()) {
            return;
        }

        let inner = self.clone();
        let name = name.to_string();
        self.tasks.spawn(async move {
            inner.run_watch(&name).await;
            inner.watchers.remove(&name);
            if inner.watchers.is_empty() {
                inner.state.set_watching(false);
            }
        });
    }

    async fn run_watch(&self, name: &str) {
        let policy = ExponentialBackoffPolicy::new(
            self.watch.max_consecutive_failures.max(1),
            self.watch.backoff_base(),
            self.watch.backoff_max(),
        );
        let wait = self.watch.wait();
        let mut index = 0u64;
        let mut failures = 0usize;

        info!(service = %name, "consul watch started");

        loop {
            let result = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!(service = %name, "consul watch stopped");
                    return;
                }
                result = self.store.watch_service_health(name, &self.namespace, index, wait) => result,
            };

            match result {
                Ok((new_index, entries)) => {
                    if failures > 0 {
                        info!(service = %name, "consul watch recovered");
                    }
                    failures = 0;
                    self.state.set_watching(true);
                    self.state.set_degraded(false);

                    // 等待超时，无变化
                    if new_index == index {
                        continue;
                    }
                    // index 回退（例如 Consul 重启）时从头开始
                    index = if new_index < index { 0 } else { new_index };

                    // 首次见到的服务先通过 agent 加载
                    if !self.registry.contains(name) {
                        if let Err(e) = self.load(name).await {
                            warn!(service = %name, error = %e, "failed to load service instances from consul");
                        }
                    }
                    self.apply_health(name, entries);
                }
                Err(e) => {
                    failures += 1;
                    if !policy.should_retry(failures) {
                        error!(
                            service = %name,
                            failures,
                            error = %e,
                            "consul watch giving up, will be restarted on next query"
                        );
                        self.state.set_degraded(true);
                        return;
                    }
                    let backoff = policy.backoff_duration(failures);
                    warn!(
                        service = %name,
                        failures,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "consul watch failed, retrying"
                    );
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    }

    /// 将一次阻塞查询的结果合并到缓存
    ///
    /// passing 的实例加入，其余状态移除；结果中已不存在的实例视为已注销
    fn apply_health(&self, name: &str, entries: Vec<HealthEntry>) {
        let set = self.registry.get_or_create(name);
        let mut present = HashSet::with_capacity(entries.len());

        for entry in entries {
            let instance = entry.service;
            present.insert(instance.endpoint());
            if entry.status.is_passing() {
                if set.put(instance.clone()) {
                    info!(
                        service = %name,
                        address = %instance.address,
                        port = instance.port,
                        "service instance added"
                    );
                }
            } else if set.remove(&instance) {
                info!(
                    service = %name,
                    address = %instance.address,
                    port = instance.port,
                    status = %entry.status,
                    "service instance removed"
                );
            }
        }

        for instance in set.list() {
            if !present.contains(&instance.endpoint()) && set.remove(&instance) {
                info!(
                    service = %name,
                    address = %instance.address,
                    port = instance.port,
                    "service instance deregistered"
                );
            }
        }
    }
}

#[async_trait]
impl<S: HealthStore> ServiceDiscovery for ConsulDiscovery<S> {
    async fn register(&self) -> Result<()> {
        let inner = &self.inner;
        let registration = self.registration();

        with_timeout(
            "service register",
            inner.request_timeout,
            inner.store.register_service(&registration),
        )
        .await
        .map_err(|e| {
            error!(
                service = %registration.name,
                endpoint = %registration.id,
                error = %e,
                "failed to register service with consul"
            );
            DiscoveryError::registration("service register", e)
        })?;

        inner.state.set_registered(true);
        info!(
            service = %registration.name,
            endpoint = %registration.id,
            url = %inner.url,
            "service registered with consul"
        );
        Ok(())
    }

    async fn deregister(&self) -> Result<()> {
        let inner = &self.inner;
        let service_id = inner.settings.endpoint();
        with_timeout(
            "service deregister",
            inner.request_timeout,
            inner.store.deregister_service(&service_id),
        )
        .await?;
        inner.state.set_registered(false);
        info!(service = %inner.settings.name, endpoint = %service_id, "service deregistered from consul");
        Ok(())
    }

    async fn service_instances(&self, service_name: &str) -> Vec<ServiceInfo> {
        let inner = &self.inner;
        if let Some(set) = inner.registry.get(service_name) {
            // 监听放弃后由查询重新建立
            inner.ensure_watch(service_name);
            return set.list();
        }
        inner.seed(service_name).await
    }

    fn scheme_name(&self) -> &'static str {
        "consul"
    }

    fn url(&self) -> &str {
        &self.inner.url
    }

    fn state(&self) -> DiscoveryState {
        self.inner.state.current()
    }

    async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.state.set_watching(false);
        debug!(service = %self.inner.settings.name, "consul discovery shut down");
    }
}

impl<S: HealthStore> Drop for ConsulDiscovery<S> {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}
