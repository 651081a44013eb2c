//! 日志初始化

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{DiscoveryError, Result};

/// 安装全局 tracing subscriber
///
/// `RUST_LOG` 优先于配置中的日志级别。重复调用返回配置错误。
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| DiscoveryError::Config(format!("invalid log level {}: {}", config.level, e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| DiscoveryError::Config(format!("failed to install tracing subscriber: {}", e)))
}
