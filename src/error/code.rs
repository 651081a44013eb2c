//! 错误代码和错误类别定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 错误代码枚举
///
/// 错误代码按类别分组，每个类别占用1000个代码范围：
/// - 1000-1999: 连接相关错误（注册中心连接）
/// - 2000-2999: 注册相关错误
/// - 3000-3999: 监听相关错误
/// - 4000-4999: 解析相关错误（resolver）
/// - 6000-6999: 系统相关错误
/// - 8000-8999: 序列化相关错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    // ============================================================
    // 连接相关错误 (1000-1999)
    // ============================================================
    ConnectionFailed = 1000,
    ConnectionTimeout = 1001,

    // ============================================================
    // 注册相关错误 (2000-2999)
    // ============================================================
    RegistrationFailed = 2000,
    LeaseExpired = 2001,

    // ============================================================
    // 监听相关错误 (3000-3999)
    // ============================================================
    WatchFailed = 3000,
    WatchCanceled = 3001,

    // ============================================================
    // 解析相关错误 (4000-4999)
    // ============================================================
    NoAvailableInstance = 4000,
    InvalidTarget = 4001,
    ResolverClosed = 4002,

    // ============================================================
    // 系统相关错误 (6000-6999)
    // ============================================================
    ServiceUnavailable = 6001,
    ConfigurationError = 6003,

    // ============================================================
    // 序列化相关错误 (8000-8999)
    // ============================================================
    DeserializationError = 8001,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ErrorCode {
    /// 获取错误代码的数字值
    #[inline]
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// 获取错误代码的英文标识符
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConnectionFailed => "CONNECTION_FAILED",
            ErrorCode::ConnectionTimeout => "CONNECTION_TIMEOUT",
            ErrorCode::RegistrationFailed => "REGISTRATION_FAILED",
            ErrorCode::LeaseExpired => "LEASE_EXPIRED",
            ErrorCode::WatchFailed => "WATCH_FAILED",
            ErrorCode::WatchCanceled => "WATCH_CANCELED",
            ErrorCode::NoAvailableInstance => "NO_AVAILABLE_INSTANCE",
            ErrorCode::InvalidTarget => "INVALID_TARGET",
            ErrorCode::ResolverClosed => "RESOLVER_CLOSED",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorCode::DeserializationError => "DESERIALIZATION_ERROR",
        }
    }

    /// 获取错误代码的类别
    pub fn category(&self) -> ErrorCategory {
        match self.as_u32() {
            1000..=1999 => ErrorCategory::Connection,
            2000..=2999 => ErrorCategory::Registration,
            3000..=3999 => ErrorCategory::Watch,
            4000..=4999 => ErrorCategory::Resolve,
            8000..=8999 => ErrorCategory::Serialization,
            _ => ErrorCategory::System,
        }
    }

    /// 判断是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::ConnectionTimeout
                | ErrorCode::LeaseExpired
                | ErrorCode::WatchFailed
                | ErrorCode::ServiceUnavailable
        )
    }
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Connection,
    Registration,
    Watch,
    Resolve,
    System,
    Serialization,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Connection => write!(f, "CONNECTION"),
            ErrorCategory::Registration => write!(f, "REGISTRATION"),
            ErrorCategory::Watch => write!(f, "WATCH"),
            ErrorCategory::Resolve => write!(f, "RESOLVE"),
            ErrorCategory::System => write!(f, "SYSTEM"),
            ErrorCategory::Serialization => write!(f, "SERIALIZATION"),
        }
    }
}
