//! resolver target 解析

use std::fmt;
use std::str::FromStr;

use crate::error::{DiscoveryError, Result};

/// `scheme://authority/path` 形式的 resolver target
///
/// 服务名取路径的最后一个非空段，authority 仅作展示
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverTarget {
    pub scheme: String,
    pub authority: String,
    pub service_name: String,
}

impl ResolverTarget {
    /// 构造 `scheme:///service` 形式的 target
    pub fn new(scheme: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            authority: String::new(),
            service_name: service_name.into(),
        }
    }

    /// 由后端的 `scheme://url` 与服务名拼出 target
    pub fn from_scheme_url(scheme_url: &str, service_name: &str) -> Result<Self> {
        format!("{}/{}", scheme_url.trim_end_matches('/'), service_name).parse()
    }
}

impl FromStr for ResolverTarget {
    type Err = DiscoveryError;

    fn from_str(target: &str) -> Result<Self> {
        let (scheme, rest) = target
            .split_once("://")
            .ok_or_else(|| DiscoveryError::invalid_target(target, "missing scheme"))?;
        if scheme.is_empty() {
            return Err(DiscoveryError::invalid_target(target, "empty scheme"));
        }

        let (authority, path) = match rest.find('/') {
            Some(pos) => (&rest[..pos], &rest[pos..]),
            None => (rest, ""),
        };
        let service_name = path
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .ok_or_else(|| DiscoveryError::invalid_target(target, "missing service name"))?;

        Ok(Self {
            scheme: scheme.to_string(),
            authority: authority.to_string(),
            service_name: service_name.to_string(),
        })
    }
}

impl fmt::Display for ResolverTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.authority, self.service_name)
    }
}
