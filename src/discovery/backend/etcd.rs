//! etcd 服务发现后端
//!
//! 租约 + 前缀监听：
//! - 注册时申请短 TTL 租约，写入 `discovery/<namespace>/<name>/<address>:<port>`，
//!   并在后台持续续约
//! - 启动时先全量读取前缀填充缓存，再从快照 revision 之后开始监听
//! - 监听到自身 key 被删除时，延迟一段时间后重新注册

use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, EventType, GetOptions, PutOptions, WatchOptions};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::{InstanceSettings, ServiceDiscovery, with_timeout};
use crate::discovery::config::{DiscoveryConfig, LeaseConfig};
use crate::discovery::instance::ServiceInfo;
use crate::discovery::registry::ServiceRegistry;
use crate::discovery::state::{DiscoveryState, StateFlags};
use crate::error::{DiscoveryError, Result};
use crate::retry::{BackoffPolicy, ExponentialBackoffPolicy};

/// 键值变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvEventKind {
    Put,
    Delete,
}

/// 键值变更事件（删除事件不携带 value）
#[derive(Debug, Clone)]
pub struct KvEvent {
    pub kind: KvEventKind,
    pub key: String,
    pub value: Vec<u8>,
}

impl KvEvent {
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: KvEventKind::Put,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            kind: KvEventKind::Delete,
            key: key.into(),
            value: Vec::new(),
        }
    }
}

/// 前缀读取结果
#[derive(Debug, Clone, Default)]
pub struct KvSnapshot {
    /// 读取时的存储 revision
    pub revision: i64,
    pub kvs: Vec<(String, Vec<u8>)>,
}

/// 租约型键值存储
///
/// [`EtcdStore`] 是基于 etcd 的实现
#[async_trait]
pub trait LeaseStore: Send + Sync + 'static {
    /// 申请租约，返回租约 ID
    async fn grant(&self, ttl: i64) -> Result<i64>;

    /// 写入绑定租约的 key
    async fn put_with_lease(&self, key: String, value: Vec<u8>, lease_id: i64) -> Result<()>;

    /// 开始续约；流中每一项为一次续约结果（剩余 TTL），流结束表示续约终止
    async fn keep_alive(&self, lease_id: i64, ttl: i64) -> Result<BoxStream<'static, Result<i64>>>;

    /// 撤销租约，绑定的 key 随之删除
    async fn revoke(&self, lease_id: i64) -> Result<()>;

    /// 读取前缀下的所有 key
    async fn get_prefix(&self, prefix: &str) -> Result<KvSnapshot>;

    /// 监听前缀；流中每一项为按提交顺序排列的一批事件
    async fn watch_prefix(
        &self,
        prefix: &str,
        start_revision: Option<i64>,
    ) -> Result<BoxStream<'static, Result<Vec<KvEvent>>>>;
}

/// 基于 etcd-client 的 [`LeaseStore`]
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    /// 连接 etcd，`url` 支持逗号分隔的多个 endpoint
    pub async fn connect(url: &str, dial_timeout: Duration) -> Result<Self> {
        let endpoints: Vec<String> = url
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let options = ConnectOptions::new().with_connect_timeout(dial_timeout);

        let client = Client::connect(endpoints, Some(options))
            .await
            .map_err(|e| DiscoveryError::Connect {
                backend: "etcd",
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LeaseStore for EtcdStore {
    async fn grant(&self, ttl: i64) -> Result<i64> {
        let mut client = self.client.clone();
        let lease = client.lease_grant(ttl, None).await?;
        Ok(lease.id())
    }

    async fn put_with_lease(&self, key: String, value: Vec<u8>, lease_id: i64) -> Result<()> {
        let mut client = self.client.clone();
        let opts = PutOptions::new().with_lease(lease_id);
        client.put(key, value, Some(opts)).await?;
        Ok(())
    }

    async fn keep_alive(&self, lease_id: i64, ttl: i64) -> Result<BoxStream<'static, Result<i64>>> {
        let mut client = self.client.clone();
        let (keeper, responses) = client.lease_keep_alive(lease_id).await?;
        // 每个 TTL 内续约三次
        let interval = Duration::from_millis(ttl.max(1) as u64 * 1000 / 3);

        let renewals = stream::unfold(
            Some((keeper, responses, false)),
            move |state| async move {
                let (mut keeper, mut responses, started) = state?;
                if started {
                    tokio::time::sleep(interval).await;
                }
                if let Err(e) = keeper.keep_alive().await {
                    return Some((Err(DiscoveryError::from(e)), None));
                }
                match responses.message().await {
                    Ok(Some(resp)) if resp.ttl() > 0 => {
                        Some((Ok(resp.ttl()), Some((keeper, responses, true))))
                    }
                    Ok(Some(_)) => Some((Err(DiscoveryError::LeaseExpired(lease_id)), None)),
                    Ok(None) => None,
                    Err(e) => Some((Err(DiscoveryError::from(e)), None)),
                }
            },
        );

        Ok(renewals.boxed())
    }

    async fn revoke(&self, lease_id: i64) -> Result<()> {
        let mut client = self.client.clone();
        client.lease_revoke(lease_id).await?;
        Ok(())
    }

    async fn get_prefix(&self, prefix: &str) -> Result<KvSnapshot> {
        let mut client = self.client.clone();
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;

        let revision = resp.header().map(|h| h.revision()).unwrap_or_default();
        let kvs = resp
            .kvs()
            .iter()
            .map(|kv| {
                (
                    String::from_utf8_lossy(kv.key()).into_owned(),
                    kv.value().to_vec(),
                )
            })
            .collect();

        Ok(KvSnapshot { revision, kvs })
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
        start_revision: Option<i64>,
    ) -> Result<BoxStream<'static, Result<Vec<KvEvent>>>> {
        let mut client = self.client.clone();
        let mut opts = WatchOptions::new().with_prefix();
        if let Some(revision) = start_revision {
            opts = opts.with_start_revision(revision);
        }
        let (watcher, responses) = client.watch(prefix, Some(opts)).await?;
        let target = prefix.to_string();

        let events = stream::unfold(Some((watcher, responses)), move |state| {
            let target = target.clone();
            async move {
                let (watcher, mut responses) = state?;
                match responses.message().await {
                    Ok(Some(resp)) if resp.canceled() => Some((
                        Err(DiscoveryError::watch_canceled(target, resp.cancel_reason())),
                        None,
                    )),
                    Ok(Some(resp)) => {
                        let batch: Vec<KvEvent> =
                            resp.events().iter().filter_map(convert_event).collect();
                        Some((Ok(batch), Some((watcher, responses))))
                    }
                    Ok(None) => None,
                    Err(e) => Some((Err(DiscoveryError::from(e)), None)),
                }
            }
        });

        Ok(events.boxed())
    }
}

fn convert_event(event: &etcd_client::Event) -> Option<KvEvent> {
    let kv = event.kv()?;
    let key = String::from_utf8_lossy(kv.key()).into_owned();
    let kind = match event.event_type() {
        EventType::Put => KvEventKind::Put,
        EventType::Delete => KvEventKind::Delete,
    };
    Some(KvEvent {
        kind,
        key,
        value: kv.value().to_vec(),
    })
}

/// etcd 服务发现
///
/// 内部状态由后台任务共享；丢弃该后端即取消其所有后台任务，
/// 需要等待任务退出时调用 [`ServiceDiscovery::shutdown`]。
pub struct EtcdDiscovery<S: LeaseStore = EtcdStore> {
    inner: Arc<Inner<S>>,
}

struct Inner<S> {
    store: S,
    settings: InstanceSettings,
    url: String,
    /// `discovery/<namespace>`
    key_prefix: String,
    /// 本实例的注册 key
    instance_key: String,
    lease: LeaseConfig,
    request_timeout: Duration,
    registry: ServiceRegistry,
    state: StateFlags,
    register_called: AtomicBool,
    lease_id: Mutex<Option<i64>>,
    keepalive: Mutex<Option<CancellationToken>>,
    reregister_pending: AtomicBool,
    /// 续约终止触发的重新注册不因缓存中仍有自身而跳过
    reregister_forced: AtomicBool,
    watch_live: AtomicBool,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl EtcdDiscovery<EtcdStore> {
    /// 连接 etcd，加载现有服务并开始监听
    pub async fn connect(settings: InstanceSettings, config: &DiscoveryConfig) -> Result<Self> {
        let url = config.url_or_default();
        let store = EtcdStore::connect(&url, config.dial_timeout())
            .await
            .inspect_err(|e| error!(url = %url, error = %e, "failed to connect to etcd"))?;

        let discovery = Self::with_store(store, settings, config);
        discovery.start().await?;
        Ok(discovery)
    }
}

impl<S: LeaseStore> EtcdDiscovery<S> {
    /// 基于已连接的存储创建，尚未加载服务也未开始监听
    pub fn with_store(store: S, settings: InstanceSettings, config: &DiscoveryConfig) -> Self {
        let key_prefix = format!("discovery/{}", config.namespace_or_default());
        let instance_key = format!("{}/{}/{}", key_prefix, settings.name, settings.endpoint());

        let inner = Inner {
            store,
            settings,
            url: config.url_or_default(),
            key_prefix,
            instance_key,
            lease: config.lease.clone(),
            request_timeout: config.request_timeout(),
            registry: ServiceRegistry::new(),
            state: StateFlags::default(),
            register_called: AtomicBool::new(false),
            lease_id: Mutex::new(None),
            keepalive: Mutex::new(None),
            reregister_pending: AtomicBool::new(false),
            reregister_forced: AtomicBool::new(false),
            watch_live: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        };
        inner.state.set_connected(true);

        Self {
            inner: Arc::new(inner),
        }
    }

    /// 全量读取前缀填充缓存，然后从快照之后的 revision 开始监听
    ///
    /// 快照失败是致命错误；监听建立失败只记录日志，由后续查询重新建立
    pub async fn start(&self) -> Result<()> {
        let prefix = self.inner.watch_prefix();
        let revision = self
            .inner
            .sync_snapshot(&prefix, false)
            .await
            .map_err(|e| {
                error!(prefix = %prefix, error = %e, "failed to load services from etcd");
                e
            })?;
        self.inner.arm_watch(Some(revision + 1));
        Ok(())
    }

    /// 本实例的注册 key
    pub fn instance_key(&self) -> &str {
        &self.inner.instance_key
    }

    /// 当前持有的租约
    pub fn lease_id(&self) -> Option<i64> {
        *self
            .inner
            .lease_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// 前缀监听是否存活
    pub fn is_watching(&self) -> bool {
        self.inner.watch_live.load(Ordering::Acquire)
    }
}

impl<S: LeaseStore> Inner<S> {
    fn watch_prefix(&self) -> String {
        format!("{}/", self.key_prefix)
    }

    fn service_prefix(&self, service_name: &str) -> String {
        format!("{}/{}/", self.key_prefix, service_name)
    }

    /// 从 `discovery/<ns>/<name>/<address>:<port>` 中解析服务名与端点
    fn parse_key<'a>(&self, key: &'a str) -> Option<(&'a str, &'a str)> {
        let rest = key.strip_prefix(self.key_prefix.as_str())?.strip_prefix('/')?;
        let (name, endpoint) = rest.split_once('/')?;
        if name.is_empty() || endpoint.is_empty() || endpoint.contains('/') {
            return None;
        }
        Some((name, endpoint))
    }

    /// 读取前缀写入缓存，返回快照 revision
    ///
    /// `remove_stale` 为 true 时，移除快照中已不存在的缓存实例；
    /// 若已注册而自身 key 不在快照中，安排重新注册
    async fn sync_snapshot(self: &Arc<Self>, prefix: &str, remove_stale: bool) -> Result<i64> {
        let snapshot = self.store.get_prefix(prefix).await?;
        let mut seen: HashMap<String, HashSet<String>> = HashMap::new();

        for (key, value) in &snapshot.kvs {
            let Some((name, _)) = self.parse_key(key) else {
                warn!(key = %key, "ignoring unrecognized discovery key");
                continue;
            };
            let instance: ServiceInfo = match serde_json::from_slice(value) {
                Ok(instance) => instance,
                Err(e) => {
                    error!(
                        key = %key,
                        value = %String::from_utf8_lossy(value),
                        error = %e,
                        "failed to decode service info"
                    );
                    continue;
                }
            };

            seen.entry(name.to_string())
                .or_default()
                .insert(instance.endpoint());
            if self.registry.get_or_create(name).put(instance.clone()) {
                info!(
                    service = %instance.name,
                    address = %instance.address,
                    port = instance.port,
                    "service instance added"
                );
            }
        }

        if remove_stale {
            for name in self.registry.names() {
                let Some(set) = self.registry.get(&name) else {
                    continue;
                };
                for instance in set.list() {
                    let present = seen
                        .get(&name)
                        .is_some_and(|endpoints| endpoints.contains(&instance.endpoint()));
                    if !present && set.remove(&instance) {
                        info!(
                            service = %name,
                            address = %instance.address,
                            port = instance.port,
                            "stale service instance removed"
                        );
                    }
                }
            }

            let own_present = seen
                .get(&self.settings.name)
                .is_some_and(|endpoints| endpoints.contains(&self.settings.endpoint()));
            if self.state.is_registered() && !own_present {
                warn!(
                    service = %self.settings.name,
                    endpoint = %self.settings.endpoint(),
                    "own registration missing after resync"
                );
                self.schedule_reregister(false);
            }
        }

        Ok(snapshot.revision)
    }

    /// 启动前缀监听；已有存活的监听时直接返回
    ///
    /// `start_revision` 为 None 时先重新同步快照
    fn arm_watch(self: &Arc<Self>, start_revision: Option<i64>) {
        if self.shutdown.is_cancelled() {
            return;
        }
        if self
            .watch_live
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let inner = self.clone();
        self.tasks.spawn(async move {
            inner.run_watch(start_revision).await;
            inner.state.set_watching(false);
            inner.watch_live.store(false, Ordering::Release);
        });
    }

    async fn run_watch(self: &Arc<Self>, start_revision: Option<i64>) {
        let prefix = self.watch_prefix();
        let start_revision = match start_revision {
            Some(revision) => revision,
            None => match self.sync_snapshot(&prefix, true).await {
                Ok(revision) => revision + 1,
                Err(e) => {
                    warn!(
                        prefix = %prefix,
                        error = %e,
                        "failed to resync services, watch will be retried on next query"
                    );
                    return;
                }
            },
        };

        let mut events = match self.store.watch_prefix(&prefix, Some(start_revision)).await {
            Ok(events) => events,
            Err(e) => {
                warn!(
                    prefix = %prefix,
                    error = %e,
                    "failed to start etcd watch, will be retried on next query"
                );
                return;
            }
        };

        self.state.set_watching(true);
        info!(prefix = %prefix, revision = start_revision, "etcd watch started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!(prefix = %prefix, "etcd watch stopped");
                    return;
                }
                next = events.next() => match next {
                    Some(Ok(batch)) => {
                        for event in batch {
                            self.apply_event(event);
                        }
                    }
                    Some(Err(e)) => {
                        warn!(prefix = %prefix, error = %e, "etcd watch failed, live updates paused");
                        return;
                    }
                    None => {
                        warn!(prefix = %prefix, "etcd watch stream closed, live updates paused");
                        return;
                    }
                },
            }
        }
    }

    /// 将一条变更事件合并到缓存
    fn apply_event(self: &Arc<Self>, event: KvEvent) {
        let Some((name, endpoint)) = self.parse_key(&event.key) else {
            warn!(key = %event.key, "ignoring event for unrecognized key");
            return;
        };
        let set = self.registry.get_or_create(name);

        match event.kind {
            KvEventKind::Put => {
                let instance: ServiceInfo = match serde_json::from_slice(&event.value) {
                    Ok(instance) => instance,
                    Err(e) => {
                        error!(
                            key = %event.key,
                            value = %String::from_utf8_lossy(&event.value),
                            error = %e,
                            "failed to decode service info, event skipped"
                        );
                        return;
                    }
                };
                if set.put(instance.clone()) {
                    info!(
                        service = %instance.name,
                        address = %instance.address,
                        port = instance.port,
                        "service instance added"
                    );
                }
            }
            KvEventKind::Delete => {
                let Some(instance) = ServiceInfo::from_endpoint(name, endpoint) else {
                    warn!(key = %event.key, "ignoring delete event with malformed endpoint");
                    return;
                };
                if set.remove(&instance) {
                    info!(
                        service = %instance.name,
                        address = %instance.address,
                        port = instance.port,
                        "service instance removed"
                    );
                }

                // 续约终止（例如 etcd 重启）会导致自身注册被删除
                if self.state.is_registered()
                    && instance.is_at(&self.settings.address, self.settings.port)
                {
                    self.schedule_reregister(false);
                }
            }
        }
    }

    /// 安排一次延迟的重新注册；已有待执行的重新注册时不重复安排
    ///
    /// `forced` 为 true 时延迟结束后不检查缓存中是否已重新出现自身
    fn schedule_reregister(self: &Arc<Self>, forced: bool) {
        self.state.set_degraded(true);
        if forced {
            self.reregister_forced.store(true, Ordering::Release);
        }
        if self.reregister_pending.swap(true, Ordering::AcqRel) {
            debug!(service = %self.settings.name, "re-registration already scheduled");
            return;
        }

        let delay = self.lease.reregister_delay();
        warn!(
            service = %self.settings.name,
            endpoint = %self.settings.endpoint(),
            delay_ms = delay.as_millis() as u64,
            "own registration lost, scheduling re-registration"
        );

        let inner = self.clone();
        self.tasks.spawn(async move {
            inner.reregister(delay).await;
            inner.reregister_pending.store(false, Ordering::Release);
        });
    }

    async fn reregister(self: &Arc<Self>, delay: Duration) {
        // 等待新租约的 PUT 事件先于过期的 DELETE 到达
        if !self.sleep_or_cancelled(delay).await {
            return;
        }

        let own = self.settings.service_info();
        let forced = self.reregister_forced.swap(false, Ordering::AcqRel);
        if !forced
            && self
                .registry
                .get(&own.name)
                .is_some_and(|set| set.contains(&own))
        {
            info!(
                service = %own.name,
                endpoint = %own.endpoint(),
                "own registration observed again, skipping re-registration"
            );
            self.state.set_degraded(false);
            return;
        }

        let policy = ExponentialBackoffPolicy::new(
            self.lease.reregister_max_attempts.max(1),
            self.lease.backoff_base(),
            self.lease.backoff_max(),
        );
        let mut attempt = 0;
        loop {
            if !self.state.is_registered() {
                debug!(service = %own.name, "service deregistered, re-registration abandoned");
                return;
            }
            match self.register_once().await {
                Ok(()) => {
                    info!(service = %own.name, attempt = attempt + 1, "service re-registered");
                    return;
                }
                Err(e) => {
                    attempt += 1;
                    if !policy.should_retry(attempt) {
                        error!(
                            service = %own.name,
                            attempts = attempt,
                            error = %e,
                            "re-registration attempts exhausted, staying degraded"
                        );
                        return;
                    }
                    let backoff = policy.backoff_duration(attempt);
                    warn!(
                        service = %own.name,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "re-registration failed, retrying"
                    );
                    if !self.sleep_or_cancelled(backoff).await {
                        return;
                    }
                }
            }
        }
    }

    async fn sleep_or_cancelled(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// 申请租约、写入 key 并开始续约
    async fn register_once(self: &Arc<Self>) -> Result<()> {
        let ttl = self.lease.ttl_secs;
        let timeout = self.request_timeout;

        let lease_id = with_timeout("lease grant", timeout, self.store.grant(ttl))
            .await
            .map_err(|e| DiscoveryError::registration("lease grant", e))?;

        let value = serde_json::to_vec(&self.settings.service_info())
            .map_err(|e| DiscoveryError::registration("encode", e.into()))?;
        with_timeout(
            "key put",
            timeout,
            self.store
                .put_with_lease(self.instance_key.clone(), value, lease_id),
        )
        .await
        .map_err(|e| DiscoveryError::registration("key put", e))?;

        let renewals = with_timeout("keepalive", timeout, self.store.keep_alive(lease_id, ttl))
            .await
            .map_err(|e| DiscoveryError::registration("keepalive", e))?;

        *self.lease_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(lease_id);
        self.state.set_registered(true);
        self.state.set_degraded(false);
        self.spawn_keepalive(lease_id, renewals);

        info!(
            service = %self.settings.name,
            endpoint = %self.settings.endpoint(),
            url = %self.url,
            lease_id,
            "service registered with etcd"
        );
        Ok(())
    }

    /// 消费续约流；替换掉上一次注册遗留的续约任务
    ///
    /// 续约流结束时租约将过期，若该租约仍是当前注册所用则安排重新注册
    fn spawn_keepalive(self: &Arc<Self>, lease_id: i64, mut renewals: BoxStream<'static, Result<i64>>) {
        let token = self.shutdown.child_token();
        let previous = self
            .keepalive
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let inner = self.clone();
        self.tasks.spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(lease_id, "lease keepalive stopped");
                        return;
                    }
                    next = renewals.next() => match next {
                        Some(Ok(ttl)) => debug!(lease_id, ttl, "lease renewed"),
                        Some(Err(e)) => {
                            error!(lease_id, error = %e, "lease keepalive failed");
                            break;
                        }
                        None => break,
                    },
                }
            }
            let current = *inner.lease_id.lock().unwrap_or_else(PoisonError::into_inner);
            if !inner.state.is_registered() || current != Some(lease_id) {
                debug!(lease_id, "keepalive ended for a lease no longer in use");
                return;
            }
            error!(
                service = %inner.settings.name,
                lease_id,
                "etcd connection lost, lease keepalive terminated"
            );
            inner.schedule_reregister(true);
        });
    }
}

#[async_trait]
impl<S: LeaseStore> ServiceDiscovery for EtcdDiscovery<S> {
    async fn register(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.register_called.swap(true, Ordering::AcqRel) {
            warn!(service = %inner.settings.name, "service already registered, ignoring");
            return Ok(());
        }

        inner.register_once().await.inspect_err(|e| {
            inner.register_called.store(false, Ordering::Release);
            error!(
                service = %inner.settings.name,
                endpoint = %inner.settings.endpoint(),
                error = %e,
                "failed to register service with etcd"
            );
        })
    }

    async fn deregister(&self) -> Result<()> {
        let inner = &self.inner;
        inner.state.set_registered(false);
        inner.register_called.store(false, Ordering::Release);

        let keepalive = inner
            .keepalive
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = keepalive {
            token.cancel();
        }

        let lease_id = inner
            .lease_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(lease_id) = lease_id {
            with_timeout("lease revoke", inner.request_timeout, inner.store.revoke(lease_id))
                .await?;
            info!(service = %inner.settings.name, lease_id, "service deregistered from etcd");
        }
        Ok(())
    }

    async fn service_instances(&self, service_name: &str) -> Vec<ServiceInfo> {
        let inner = &self.inner;
        // 监听中断后由查询重新建立
        inner.arm_watch(None);

        if let Some(set) = inner.registry.get(service_name) {
            return set.list();
        }

        let prefix = inner.service_prefix(service_name);
        if let Err(e) = with_timeout(
            "service bootstrap",
            inner.request_timeout,
            inner.sync_snapshot(&prefix, false),
        )
        .await
        {
            error!(service = %service_name, error = %e, "failed to load service instances from etcd");
            return Vec::new();
        }

        match inner.registry.get(service_name) {
            Some(set) => set.list(),
            None => {
                warn!(service = %service_name, "no service instances found in etcd");
                Vec::new()
            }
        }
    }

    fn scheme_name(&self) -> &'static str {
        "etcd"
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
        debug!(service = %self.inner.settings.name, "etcd discovery shut down");
    }
}

impl<S: LeaseStore> Drop for EtcdDiscovery<S> {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}
