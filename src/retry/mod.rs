//! 重试策略模块

pub mod exponential;

pub use exponential::ExponentialBackoffPolicy;

use std::time::Duration;

/// 重试策略 trait
///
/// `attempt` 为已失败的次数（从 1 开始）
pub trait BackoffPolicy: Send + Sync {
    fn should_retry(&self, attempt: usize) -> bool;
    fn backoff_duration(&self, attempt: usize) -> Duration;
    fn max_attempts(&self) -> usize;
}
