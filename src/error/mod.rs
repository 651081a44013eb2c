//! 服务注册发现错误处理模块
//!
//! 统一的错误类型，按注册中心连接、注册提交、监听、解码与解析分类

pub mod code;
pub mod grpc;

pub use code::{ErrorCategory, ErrorCode};

use std::time::Duration;
use thiserror::Error;

/// 服务注册发现错误
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// 注册中心连接失败（启动期致命错误）
    #[error("failed to connect to {backend} at {url}: {reason}")]
    Connect {
        backend: &'static str,
        url: String,
        reason: String,
    },

    /// 注册提交失败（租约申请、写入 key、健康检查提交等）
    #[error("registration {stage} failed: {source}")]
    Registration {
        stage: &'static str,
        #[source]
        source: Box<DiscoveryError>,
    },

    /// 监听建立或中途失败
    #[error("watch on {target} failed: {reason}")]
    Watch { target: String, reason: String },

    /// 监听被注册中心取消（例如请求的 revision 已被压缩）
    #[error("watch on {target} canceled: {reason}")]
    WatchCanceled { target: String, reason: String },

    /// 租约已失效
    #[error("lease {0} expired")]
    LeaseExpired(i64),

    /// 单条事件或响应解码失败
    #[error("failed to decode {what}: {reason}")]
    Decode { what: String, reason: String },

    /// 无可用服务实例
    #[error("no available instance for service {0}")]
    NoAvailableInstance(String),

    /// 非法的 resolver target
    #[error("invalid resolver target {target}: {reason}")]
    InvalidTarget { target: String, reason: String },

    /// resolver 对端（负载均衡通道）已关闭
    #[error("resolver for {0} is closed")]
    ResolverClosed(String),

    /// 配置错误
    #[error("configuration error: {0}")]
    Config(String),

    /// 网络操作超时
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// 存储端返回的通用错误
    #[error("store request failed: {0}")]
    Store(String),

    #[error(transparent)]
    Etcd(#[from] etcd_client::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DiscoveryError {
    /// 包装为注册阶段错误
    pub fn registration(stage: &'static str, source: DiscoveryError) -> Self {
        DiscoveryError::Registration {
            stage,
            source: Box::new(source),
        }
    }

    /// 创建监听错误
    pub fn watch(target: impl Into<String>, reason: impl ToString) -> Self {
        DiscoveryError::Watch {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// 创建监听取消错误
    pub fn watch_canceled(target: impl Into<String>, reason: impl ToString) -> Self {
        DiscoveryError::WatchCanceled {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// 创建解码错误
    pub fn decode(what: impl Into<String>, reason: impl ToString) -> Self {
        DiscoveryError::Decode {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    /// 创建非法 target 错误
    pub fn invalid_target(target: impl Into<String>, reason: impl Into<String>) -> Self {
        DiscoveryError::InvalidTarget {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            DiscoveryError::Connect { .. } => ErrorCode::ConnectionFailed,
            DiscoveryError::Registration { .. } => ErrorCode::RegistrationFailed,
            DiscoveryError::Watch { .. } => ErrorCode::WatchFailed,
            DiscoveryError::WatchCanceled { .. } => ErrorCode::WatchCanceled,
            DiscoveryError::LeaseExpired(_) => ErrorCode::LeaseExpired,
            DiscoveryError::Decode { .. } | DiscoveryError::Json(_) => {
                ErrorCode::DeserializationError
            }
            DiscoveryError::NoAvailableInstance(_) => ErrorCode::NoAvailableInstance,
            DiscoveryError::InvalidTarget { .. } => ErrorCode::InvalidTarget,
            DiscoveryError::ResolverClosed(_) => ErrorCode::ResolverClosed,
            DiscoveryError::Config(_) => ErrorCode::ConfigurationError,
            DiscoveryError::Timeout { .. } => ErrorCode::ConnectionTimeout,
            DiscoveryError::Store(_) | DiscoveryError::Etcd(_) | DiscoveryError::Http(_) => {
                ErrorCode::ServiceUnavailable
            }
        }
    }

    /// 判断是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        match self {
            DiscoveryError::Registration { source, .. } => source.is_retryable(),
            other => other.code().is_retryable(),
        }
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, DiscoveryError>;
