//! 测试用的存储与服务发现替身
#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use flare_discovery::discovery::{
    DiscoveryConfig, DiscoveryState, HealthEntry, HealthStore, InstanceSettings, KvEvent,
    KvSnapshot, LeaseStore, ServiceDiscovery, ServiceInfo, ServiceRegistration,
};
use flare_discovery::error::{DiscoveryError, Result};

pub const NAMESPACE: &str = "test";

/// 让后台任务处理完已就绪的工作（需配合 `start_paused = true`）
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub fn settings(name: &str, address: &str, port: u16) -> InstanceSettings {
    InstanceSettings::new(name, address, port)
}

pub fn test_config() -> DiscoveryConfig {
    let mut config = DiscoveryConfig::default();
    config.namespace = Some(NAMESPACE.to_string());
    config
}

pub fn etcd_key(name: &str, address: &str, port: u16) -> String {
    format!("discovery/{}/{}/{}:{}", NAMESPACE, name, address, port)
}

pub fn encoded(name: &str, address: &str, port: u16) -> Vec<u8> {
    serde_json::to_vec(&ServiceInfo::new(name, address, port)).expect("encode service info")
}

pub fn sorted(mut instances: Vec<ServiceInfo>) -> Vec<ServiceInfo> {
    instances.sort_by(|a, b| (&a.address, a.port).cmp(&(&b.address, b.port)));
    instances
}

type WatchItem = Result<Vec<KvEvent>>;

/// 内存中的 [`LeaseStore`]
#[derive(Clone)]
pub struct MockLeaseStore {
    inner: Arc<MockLeaseInner>,
}

struct MockLeaseInner {
    next_lease: AtomicI64,
    grant_attempts: AtomicUsize,
    grants: AtomicUsize,
    fail_grants: AtomicUsize,
    keepalive_ends: AtomicBool,
    puts: Mutex<Vec<(String, Vec<u8>, i64)>>,
    revoked: Mutex<Vec<i64>>,
    snapshot: Mutex<Vec<(String, Vec<u8>)>>,
    watch_tx: Mutex<Option<mpsc::UnboundedSender<WatchItem>>>,
    watch_rx: Mutex<Option<mpsc::UnboundedReceiver<WatchItem>>>,
    watch_calls: AtomicUsize,
}

impl MockLeaseStore {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(MockLeaseInner {
                next_lease: AtomicI64::new(100),
                grant_attempts: AtomicUsize::new(0),
                grants: AtomicUsize::new(0),
                fail_grants: AtomicUsize::new(0),
                keepalive_ends: AtomicBool::new(false),
                puts: Mutex::new(Vec::new()),
                revoked: Mutex::new(Vec::new()),
                snapshot: Mutex::new(Vec::new()),
                watch_tx: Mutex::new(Some(tx)),
                watch_rx: Mutex::new(Some(rx)),
                watch_calls: AtomicUsize::new(0),
            }),
        }
    }

    pub fn set_snapshot(&self, kvs: Vec<(String, Vec<u8>)>) {
        *self.inner.snapshot.lock().unwrap() = kvs;
    }

    pub fn push_events(&self, events: Vec<KvEvent>) {
        if let Some(tx) = self.inner.watch_tx.lock().unwrap().as_ref() {
            // 监听已结束时丢弃
            let _ = tx.send(Ok(events));
        }
    }

    /// 关闭当前监听流
    pub fn close_watch(&self) {
        self.inner.watch_tx.lock().unwrap().take();
    }

    /// 为下一次监听准备新的事件流
    pub fn reopen_watch(&self) {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.watch_tx.lock().unwrap() = Some(tx);
        *self.inner.watch_rx.lock().unwrap() = Some(rx);
    }

    pub fn fail_next_grants(&self, count: usize) {
        self.inner.fail_grants.store(count, Ordering::SeqCst);
    }

    pub fn end_keepalive_streams(&self) {
        self.inner.keepalive_ends.store(true, Ordering::SeqCst);
    }

    pub fn resume_keepalive_streams(&self) {
        self.inner.keepalive_ends.store(false, Ordering::SeqCst);
    }

    /// 成功的租约申请次数
    pub fn grant_count(&self) -> usize {
        self.inner.grants.load(Ordering::SeqCst)
    }

    /// 租约申请次数（含失败）
    pub fn grant_attempts(&self) -> usize {
        self.inner.grant_attempts.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> Vec<(String, Vec<u8>, i64)> {
        self.inner.puts.lock().unwrap().clone()
    }

    pub fn revoked(&self) -> Vec<i64> {
        self.inner.revoked.lock().unwrap().clone()
    }

    pub fn watch_calls(&self) -> usize {
        self.inner.watch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LeaseStore for MockLeaseStore {
    async fn grant(&self, _ttl: i64) -> Result<i64> {
        self.inner.grant_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.inner.fail_grants.load(Ordering::SeqCst);
        if remaining > 0 {
            self.inner.fail_grants.store(remaining - 1, Ordering::SeqCst);
            return Err(DiscoveryError::Store("etcd unavailable".to_string()));
        }
        self.inner.grants.fetch_add(1, Ordering::SeqCst);
        Ok(self.inner.next_lease.fetch_add(1, Ordering::SeqCst))
    }

    async fn put_with_lease(&self, key: String, value: Vec<u8>, lease_id: i64) -> Result<()> {
        self.inner.puts.lock().unwrap().push((key, value, lease_id));
        Ok(())
    }

    async fn keep_alive(&self, _lease_id: i64, ttl: i64) -> Result<BoxStream<'static, Result<i64>>> {
        if self.inner.keepalive_ends.load(Ordering::SeqCst) {
            return Ok(stream::empty().boxed());
        }
        Ok(stream::once(async move { Ok::<i64, DiscoveryError>(ttl) })
            .chain(stream::pending())
            .boxed())
    }

    async fn revoke(&self, lease_id: i64) -> Result<()> {
        self.inner.revoked.lock().unwrap().push(lease_id);
        Ok(())
    }

    async fn get_prefix(&self, prefix: &str) -> Result<KvSnapshot> {
        let kvs = self
            .inner
            .snapshot
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .cloned()
            .collect();
        Ok(KvSnapshot { revision: 7, kvs })
    }

    async fn watch_prefix(
        &self,
        _prefix: &str,
        _start_revision: Option<i64>,
    ) -> Result<BoxStream<'static, Result<Vec<KvEvent>>>> {
        self.inner.watch_calls.fetch_add(1, Ordering::SeqCst);
        let rx = self
            .inner
            .watch_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| DiscoveryError::watch("mock", "no watch stream prepared"))?;
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

type HealthBatch = Result<(u64, Vec<HealthEntry>)>;

/// 内存中的 [`HealthStore`]
#[derive(Clone)]
pub struct MockHealthStore {
    inner: Arc<MockHealthInner>,
}

struct MockHealthInner {
    registrations: Mutex<Vec<ServiceRegistration>>,
    deregistered: Mutex<Vec<String>>,
    agent: Mutex<HashMap<String, Vec<HealthEntry>>>,
    agent_calls: AtomicUsize,
    watch_tx: mpsc::UnboundedSender<HealthBatch>,
    watch_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<HealthBatch>>,
    watch_calls: AtomicUsize,
}

impl MockHealthStore {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(MockHealthInner {
                registrations: Mutex::new(Vec::new()),
                deregistered: Mutex::new(Vec::new()),
                agent: Mutex::new(HashMap::new()),
                agent_calls: AtomicUsize::new(0),
                watch_tx: tx,
                watch_rx: tokio::sync::Mutex::new(rx),
                watch_calls: AtomicUsize::new(0),
            }),
        }
    }

    pub fn set_agent_health(&self, name: &str, entries: Vec<HealthEntry>) {
        self.inner
            .agent
            .lock()
            .unwrap()
            .insert(name.to_string(), entries);
    }

    pub fn push_batch(&self, index: u64, entries: Vec<HealthEntry>) {
        self.inner
            .watch_tx
            .send(Ok((index, entries)))
            .expect("watch receiver alive");
    }

    pub fn push_failure(&self) {
        self.inner
            .watch_tx
            .send(Err(DiscoveryError::Store("consul unavailable".to_string())))
            .expect("watch receiver alive");
    }

    pub fn registrations(&self) -> Vec<ServiceRegistration> {
        self.inner.registrations.lock().unwrap().clone()
    }

    pub fn deregistered(&self) -> Vec<String> {
        self.inner.deregistered.lock().unwrap().clone()
    }

    pub fn agent_calls(&self) -> usize {
        self.inner.agent_calls.load(Ordering::SeqCst)
    }

    pub fn watch_calls(&self) -> usize {
        self.inner.watch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthStore for MockHealthStore {
    async fn register_service(&self, registration: &ServiceRegistration) -> Result<()> {
        self.inner
            .registrations
            .lock()
            .unwrap()
            .push(registration.clone());
        Ok(())
    }

    async fn deregister_service(&self, service_id: &str) -> Result<()> {
        self.inner
            .deregistered
            .lock()
            .unwrap()
            .push(service_id.to_string());
        Ok(())
    }

    async fn agent_service_health(&self, name: &str, _namespace: &str) -> Result<Vec<HealthEntry>> {
        self.inner.agent_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .inner
            .agent
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    async fn watch_service_health(
        &self,
        _name: &str,
        _namespace: &str,
        _index: u64,
        _wait: Duration,
    ) -> Result<(u64, Vec<HealthEntry>)> {
        self.inner.watch_calls.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.inner.watch_rx.lock().await;
        match rx.recv().await {
            Some(batch) => batch,
            None => std::future::pending().await,
        }
    }
}

/// 实例列表可由测试直接修改的服务发现
pub struct StaticDiscovery {
    instances: Mutex<HashMap<String, Vec<ServiceInfo>>>,
    state: Mutex<DiscoveryState>,
    queries: AtomicUsize,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            state: Mutex::new(DiscoveryState::Watching),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn set_instances(&self, name: &str, instances: Vec<ServiceInfo>) {
        self.instances
            .lock()
            .unwrap()
            .insert(name.to_string(), instances);
    }

    pub fn set_state(&self, state: DiscoveryState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceDiscovery for StaticDiscovery {
    async fn register(&self) -> Result<()> {
        Ok(())
    }

    async fn deregister(&self) -> Result<()> {
        Ok(())
    }

    async fn service_instances(&self, service_name: &str) -> Vec<ServiceInfo> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.instances
            .lock()
            .unwrap()
            .get(service_name)
            .cloned()
            .unwrap_or_default()
    }

    fn scheme_name(&self) -> &'static str {
        "etcd"
    }

    fn url(&self) -> &str {
        "127.0.0.1:2379"
    }

    fn state(&self) -> DiscoveryState {
        *self.state.lock().unwrap()
    }

    async fn shutdown(&self) {}
}
