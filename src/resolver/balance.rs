//! 对接 tonic 负载均衡通道

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tonic::transport::{Channel, Endpoint};
use tonic::transport::channel::Change;
use tracing::debug;

use super::{ClientConn, DiscoveryResolver, ResolverBuilder, ResolverState};
use crate::error::{DiscoveryError, Result};

const BALANCE_CHANNEL_CAPACITY: usize = 1024;

type EndpointConfigurer = Arc<dyn Fn(Endpoint) -> Endpoint + Send + Sync>;

/// 把解析结果转换为 [`Change`] 增量，发送给 `Channel::balance_channel`
pub struct BalanceChannelConn {
    service_name: String,
    sender: mpsc::Sender<Change<String, Endpoint>>,
    current: Mutex<HashSet<String>>,
    configure: EndpointConfigurer,
}

impl BalanceChannelConn {
    pub fn new(service_name: impl Into<String>, sender: mpsc::Sender<Change<String, Endpoint>>) -> Self {
        Self {
            service_name: service_name.into(),
            sender,
            current: Mutex::new(HashSet::new()),
            configure: Arc::new(|endpoint| endpoint),
        }
    }

    /// 定制每个新地址的 [`Endpoint`]（超时、keepalive 等）
    pub fn with_endpoint_config(
        mut self,
        configure: impl Fn(Endpoint) -> Endpoint + Send + Sync + 'static,
    ) -> Self {
        self.configure = Arc::new(configure);
        self
    }

    /// 当前已推送给通道的地址
    pub async fn addresses(&self) -> HashSet<String> {
        self.current.lock().await.clone()
    }

    async fn send(&self, change: Change<String, Endpoint>) -> Result<()> {
        self.sender
            .send(change)
            .await
            .map_err(|_| DiscoveryError::ResolverClosed(self.service_name.clone()))
    }
}

#[async_trait]
impl ClientConn for BalanceChannelConn {
    async fn update_state(&self, state: ResolverState) -> Result<()> {
        let next: HashSet<String> = state.addresses.into_iter().map(|a| a.addr).collect();
        let mut current = self.current.lock().await;

        let added: Vec<String> = next.difference(&*current).cloned().collect();
        let removed: Vec<String> = current.difference(&next).cloned().collect();

        for addr in added {
            let endpoint = Endpoint::from_shared(format!("http://{}", addr))
                .map_err(|e| DiscoveryError::invalid_target(addr.clone(), e.to_string()))?;
            self.send(Change::Insert(addr.clone(), (self.configure)(endpoint)))
                .await?;
            debug!(service = %self.service_name, addr = %addr, "endpoint added to balancer");
            current.insert(addr);
        }
        for addr in removed {
            self.send(Change::Remove(addr.clone())).await?;
            debug!(service = %self.service_name, addr = %addr, "endpoint removed from balancer");
            current.remove(&addr);
        }
        Ok(())
    }
}

/// 为服务创建一个负载均衡通道，并用 resolver 填充其地址
///
/// 返回的 resolver 需要与通道一起持有；丢弃后不再刷新
pub async fn balanced_channel(
    builder: &ResolverBuilder,
    service_name: &str,
) -> Result<(Channel, DiscoveryResolver<BalanceChannelConn>)> {
    let (channel, sender) = Channel::balance_channel::<String>(BALANCE_CHANNEL_CAPACITY);
    let conn = BalanceChannelConn::new(service_name, sender);
    let resolver = builder.build(&builder.target(service_name), conn).await?;
    Ok((channel, resolver))
}
