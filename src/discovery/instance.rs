//! 服务实例定义

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils;

/// 服务实例
///
/// 同名服务可以有多个实例，成员身份以 `address:port` 区分，而不是 `name`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ServiceInfo {
    /// 服务名称
    pub name: String,

    /// 服务地址
    pub address: String,

    /// 服务端口
    pub port: u16,
}

impl ServiceInfo {
    /// 创建新的服务实例
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
        }
    }

    /// 从服务名与 `address:port` 端点重建实例
    pub fn from_endpoint(name: impl Into<String>, endpoint: &str) -> Option<Self> {
        let (address, port) = utils::split_endpoint(endpoint)?;
        Some(Self::new(name, address, port))
    }

    /// 成员身份键 `address:port`
    pub fn endpoint(&self) -> String {
        utils::endpoint(&self.address, self.port)
    }

    /// 是否与给定地址和端口指向同一实例
    pub fn is_at(&self, address: &str, port: u16) -> bool {
        self.address == address && self.port == port
    }
}

impl fmt::Display for ServiceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.name, self.address, self.port)
    }
}
