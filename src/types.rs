use serde::{Deserialize, Serialize};
use std::fmt;

/// 应用类型
///
/// 注册到 Consul 时写入 tags 与 `appType` 元数据
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppType {
    Web,
    #[default]
    Grpc,
    Http,
    Cron,
    Queue,
}

impl AppType {
    /// 数字编码（写入注册元数据）
    pub fn code(&self) -> i32 {
        match self {
            AppType::Web => 1,
            AppType::Grpc => 2,
            AppType::Http => 3,
            AppType::Cron => 4,
            AppType::Queue => 5,
        }
    }

    /// 展示名称（写入注册标签）
    pub fn as_str(&self) -> &'static str {
        match self {
            AppType::Web => "Web",
            AppType::Grpc => "gRPC",
            AppType::Http => "Http",
            AppType::Cron => "Cron",
            AppType::Queue => "Queue",
        }
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AppType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "web" | "1" => Ok(AppType::Web),
            "grpc" | "2" => Ok(AppType::Grpc),
            "http" | "3" => Ok(AppType::Http),
            "cron" | "4" => Ok(AppType::Cron),
            "queue" | "5" => Ok(AppType::Queue),
            _ => Err(format!("Unknown app type: {}", s)),
        }
    }
}
