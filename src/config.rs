use serde::{Deserialize, Serialize};

use crate::discovery::config::DiscoveryConfig;
use crate::error::{DiscoveryError, Result};
use crate::types::AppType;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub application: ApplicationConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApplicationConfig {
    pub name: String,
    pub port: u16,
    #[serde(default)]
    pub app_type: AppType,
    /// 对外公布的地址；未配置时使用探测到的本机 IPv4
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DiscoveryError::Config(format!("failed to read {}: {}", path, e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| DiscoveryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.application.name.trim().is_empty() {
            return Err(DiscoveryError::Config(
                "application.name must not be empty".to_string(),
            ));
        }
        if self.application.name.contains('/') {
            return Err(DiscoveryError::Config(format!(
                "application.name {} must not contain '/'",
                self.application.name
            )));
        }
        if self.discovery.lease.ttl_secs <= 0 {
            return Err(DiscoveryError::Config(
                "discovery.lease.ttl_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
